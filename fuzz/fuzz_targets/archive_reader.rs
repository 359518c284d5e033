#![no_main]

use libfuzzer_sys::fuzz_target;
use preflight_engine::archive::extract_by_suffix;
use preflight_engine::{ArchiveLimits, RequestContext};

fuzz_target!(|data: &[u8]| {
    let limits = ArchiveLimits {
        max_entry_bytes: 1024 * 1024,
        max_decoded_bytes: 8 * 1024 * 1024,
        max_entries: 1_000,
        ..Default::default()
    };
    let _ = extract_by_suffix(data, "Info.plist", limits, &RequestContext::new());
});
