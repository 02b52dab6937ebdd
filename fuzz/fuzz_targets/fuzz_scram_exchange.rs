#![no_main]

use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use pg_bootstrap::auth::ScramSha256;

#[derive(Debug, Arbitrary)]
struct Exchange {
    password: String,
    server_first: Vec<u8>,
    server_final: Vec<u8>,
}

fuzz_target!(|input: Exchange| {
    let mut client = ScramSha256::new(&input.password);
    let _ = client.client_first();

    if client.handle_server_first(&input.server_first).is_ok() {
        let _ = client.verify_server_final(&input.server_final);
    }
});
