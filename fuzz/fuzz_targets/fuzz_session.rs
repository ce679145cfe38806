#![no_main]

use libfuzzer_sys::fuzz_target;
use poct1_rs::poct1::session::{AckPolicy, DeviceSession};

fuzz_target!(|data: &[u8]| {
    // Drive a whole session with arbitrary transport chunks under both
    // acknowledgment policies. The session must never panic, every
    // response must carry a header, and the outcome must stay coherent.
    for policy in [AckPolicy::Accept, AckPolicy::Reject] {
        let mut session = DeviceSession::new(policy);
        let step_len = (data.len() / 5).max(1);
        for chunk in data.chunks(step_len) {
            let step = session.on_data(chunk);
            for text in &step.outbound {
                assert!(text.contains("<HDR.control_id"));
                assert!(text.ends_with('\n'));
            }
        }
        let outcome = session.finish();
        assert!(outcome.candidates.len() as u32 <= outcome.groups_received);
    }
});
