#![no_main]

use divergate_domain::OutputFilter;
use divergate_types::OutputFiltersConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let filter = OutputFilter::from_config(&OutputFiltersConfig {
        strip_lines: vec!["banner".to_string()],
        strip_patterns: vec!["^WARNING".to_string()],
    })
    .expect("fixed rules compile");

    let once = filter.apply(data);
    // Normalization must be idempotent and never grow the output.
    assert_eq!(filter.apply(&once), once);
    assert!(once.len() <= data.len());
});
