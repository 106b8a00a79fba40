//! Fuzz target: `ConnectionString::parse` and token generation
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A parsed string always has a non-empty host and device id
//! - `url_decode(url_encode(s)) == s` for every valid UTF-8 input
//! - `url_encode` output decodes with `urlencoding::decode`
//!
//! cargo fuzz run fuzz_connection_string

#![no_main]

use cloudlink::connection_string::ConnectionString;
use cloudlink::sas;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let encoded = sas::url_encode(text);
    assert_eq!(sas::url_decode(&encoded), text);
    assert_eq!(urlencoding::decode(&encoded).ok().as_deref(), Some(text));
    let _ = sas::base64_decode(text);

    if let Ok(cs) = ConnectionString::parse(text) {
        assert!(!cs.host_name().is_empty());
        assert!(!cs.device_id().is_empty());
        let _ = cs.password(3600);
        let _ = cs.c2d_topic_filter();
    }
});
