#![no_main]

use libfuzzer_sys::fuzz_target;
use pg_bootstrap::ConnectionInfo;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(info) = ConnectionInfo::parse(s) {
            let _ = info.to_config().validate();
        }
    }
});
