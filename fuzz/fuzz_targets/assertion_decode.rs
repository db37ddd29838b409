#![no_main]
//! Fuzz target for assertion decoding and validation.
//!
//! Feeds arbitrary bytes through `Assertion::from_bytes` and, when decoding
//! succeeds, through `check` and `key`. No input may cause a panic, and any
//! input that decodes must be canonical: re-encoding it reproduces the
//! input bytes.

use libfuzzer_sys::fuzz_target;
use mtca_core::assertion::Assertion;

fuzz_target!(|data: &[u8]| {
    let Ok(assertion) = Assertion::from_bytes(data) else {
        return; // Expected for most fuzz inputs.
    };

    // Validation must never panic.
    let _ = assertion.check();

    // Key computation must never panic.
    let _ = assertion.key();

    // Accepted inputs are canonical by definition.
    let reencoded = assertion.to_bytes().expect("decoded assertion re-encodes");
    assert_eq!(reencoded, data);
});
