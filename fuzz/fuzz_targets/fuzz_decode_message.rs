#![no_main]

use libfuzzer_sys::fuzz_target;
use pg_bootstrap::protocol::decode_message;

fuzz_target!(|data: &[u8]| {
    // Several messages may arrive in one read; decode until the input runs
    // out, is incomplete, or is rejected.
    let mut offset = 0;
    while offset < data.len() {
        match decode_message(&data[offset..]) {
            Ok(Some((_, consumed))) => {
                assert!(consumed > 0 && offset + consumed <= data.len());
                offset += consumed;
            }
            Ok(None) | Err(_) => break,
        }
    }
});
