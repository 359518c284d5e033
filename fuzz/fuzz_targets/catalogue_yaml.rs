#![no_main]

use libfuzzer_sys::fuzz_target;
use preflight_engine::catalogue::{try_load_catalogue, CatalogueSource};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = try_load_catalogue(&CatalogueSource::inline("fuzz", s));
    }
});
