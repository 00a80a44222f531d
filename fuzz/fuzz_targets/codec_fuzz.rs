//! Fuzz test for the settings value codec
//!
//! Feeds arbitrary text to `decode` and checks that:
//! - decoding never panics
//! - a decoded non-string value encodes and decodes back to itself
//!
//! Run with: cargo +nightly fuzz run codec_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use strata_settings::codec::{decode, encode_value};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let decoded = decode(input);
    if let Value::String(s) = &decoded {
        // Fallback strings pass through untouched.
        if serde_json::from_str::<Value>(input).is_err() {
            assert_eq!(s, input);
        }
        return;
    }

    // Anything nested past the encoder's limit is refused, not mangled.
    if let Ok(raw) = encode_value(&decoded) {
        assert_eq!(decode(&raw), decoded, "re-encoded value must decode identically");
    }
});
