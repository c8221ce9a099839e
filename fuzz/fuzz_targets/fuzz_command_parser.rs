//! Fuzz target: `codec::parse`
//!
//! Drives arbitrary byte sequences into the RPC payload parser and asserts
//! that it never panics, never accepts oversize payloads, and that every
//! accepted command re-encodes to the same bytes.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use blepinpad::rpc::codec::{self, MAX_PAYLOAD_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match codec::parse(data) {
        Ok(cmd) => {
            assert!(data.len() <= MAX_PAYLOAD_LEN, "oversize payload accepted");
            assert_eq!(codec::encode(&cmd), data, "parse/encode mismatch");
        }
        Err(_) => {}
    }
});
