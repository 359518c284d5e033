#![no_main]

use libfuzzer_sys::fuzz_target;
use preflight_engine::manifest::{decode_manifest, encode_binary};

fuzz_target!(|data: &[u8]| {
    if let Ok(doc) = decode_manifest(data, 64) {
        // Anything that decodes must survive a binary round trip.
        let encoded = encode_binary(&doc).expect("re-encode decoded manifest");
        let again = decode_manifest(&encoded, 64).expect("decode re-encoded manifest");
        assert_eq!(doc.depth(), again.depth());
    }
});
