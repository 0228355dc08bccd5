#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Declaration files are JSON; validation must never panic on what parses.
    if let Ok(config) = serde_json::from_slice::<divergate_types::ConfigFile>(data) {
        let _ = config.validate();
        let _ = config.test_cases();
    }
});
