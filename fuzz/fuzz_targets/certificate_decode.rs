#![no_main]
//! Fuzz target for certificate decoding.
//!
//! No input may cause a panic, and any input that decodes must be
//! canonical: re-encoding it reproduces the input bytes.

use libfuzzer_sys::fuzz_target;
use mtca_core::cert::Certificate;

fuzz_target!(|data: &[u8]| {
    let Ok(certificate) = Certificate::from_bytes(data) else {
        return; // Expected for most fuzz inputs.
    };

    let reencoded = certificate
        .to_bytes()
        .expect("decoded certificate re-encodes");
    assert_eq!(reencoded, data);
});
