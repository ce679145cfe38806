#![no_main]

use libfuzzer_sys::fuzz_target;
use poct1_rs::payload::observation::extract_observations;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Extraction never fails and never yields more readings than groups.
    let report = extract_observations(text);
    assert!(report.readings.len() as u32 <= report.groups_seen);
    for reading in &report.readings {
        assert!(reading.inr > 0.0 && reading.inr.is_finite());
        assert!(reading.pt_seconds > 0.0 && reading.pt_seconds.is_finite());
        assert_eq!(reading.id, reading.observed_at.to_rfc3339());
    }

    // The same text wrapped in the observation envelope must be just as
    // safe; the envelope itself adds no groups.
    let wrapped = format!("<OBS.R01>{text}</OBS.R01>");
    let rewrapped = extract_observations(&wrapped);
    assert!(rewrapped.readings.len() as u32 <= rewrapped.groups_seen);
});
