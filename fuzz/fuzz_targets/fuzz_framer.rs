#![no_main]

use libfuzzer_sys::fuzz_target;
use poct1_rs::poct1::framer::MessageFramer;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes, arbitrary chunking: the framer must never panic,
    // and every message it cuts out must be a well-formed marker span.
    let mut framer = MessageFramer::new();
    let step = (data.len() / 7).max(1);
    let mut extracted = Vec::new();
    for chunk in data.chunks(step) {
        framer.push(chunk);
        extracted.extend(framer.drain_messages());
    }

    for message in &extracted {
        assert!(message.text.starts_with(&message.kind.start_marker()));
        assert!(message.text.ends_with(&message.kind.end_marker()));
    }

    // A drained framer has no complete message left.
    assert!(framer.drain_messages().is_empty());

    // Re-feeding an extracted message must reproduce it exactly.
    if let Some(first) = extracted.first() {
        let mut replay = MessageFramer::new();
        replay.push_str(&first.text);
        let again = replay.drain_messages();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].kind, first.kind);
        assert_eq!(again[0].text, first.text);
    }
});
