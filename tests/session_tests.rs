//! Integration tests for the session state machine: scripted device
//! conversations fed chunk-wise, with assertions on the acknowledgment
//! traffic, collected readings, and emitted events.

use poct1_rs::poct1::message::parse_header;
use poct1_rs::poct1::session::{AckPolicy, DeviceSession, SessionPhase, SessionStep, SyncEvent};

const HELLO: &str = r#"<HEL.R01>
   <DEV>
       <DEV.serial_id V="PT2-00412"/>
       <DEV.model_id V="Coag-Sense PT2"/>
   </DEV>
</HEL.R01>"#;

const STATUS_TWO: &str = r#"<DST.R01>
   <DST>
       <DST.new_observations_qty V="2"/>
   </DST>
</DST.R01>"#;

// Two valid groups and one malformed group (missing both values).
const BATCH: &str = r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <SVC.status_cd V="N"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
   </SVC>
   <SVC>
       <SVC.observation_dttm V="2024-01-16T10:30:00-05:00"/>
   </SVC>
   <SVC>
       <SVC.observation_dttm V="2024-01-17T09:05:00-05:00"/>
       <SVC.status_cd V="L"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="1.6"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="18.9"/>
       </OBS>
   </SVC>
</OBS.R01>"#;

const EOT: &str = "<EOT.R01></EOT.R01>";

const ESCAPE: &str = r#"<ESC.R01>
   <ESC>
       <ESC.annotation V="user paused transfer"/>
   </ESC>
</ESC.R01>"#;

fn play(session: &mut DeviceSession, messages: &[&str]) -> Vec<SessionStep> {
    messages
        .iter()
        .map(|text| session.on_data(text.as_bytes()))
        .collect()
}

fn control_id(outbound: &str) -> u32 {
    parse_header(outbound).control_id.expect("header control id")
}

/// Tests that the hello is acknowledged with accept and the first
/// session control id.
#[test]
fn test_hello_is_acknowledged() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    let step = session.on_data(HELLO.as_bytes());

    assert_eq!(step.outbound.len(), 1);
    assert!(step.outbound[0].starts_with("<ACK.R01>"));
    assert!(step.outbound[0].contains(r#"<ACK.type_cd V="AA"/>"#));
    assert_eq!(control_id(&step.outbound[0]), 20001);
    assert_eq!(session.phase(), SessionPhase::AwaitingStatus);
    assert!(matches!(
        step.events.as_slice(),
        [SyncEvent::DeviceIdentified { device }] if device.serial == "PT2-00412"
    ));
}

/// Tests that the status report triggers exactly one observation request,
/// sent before the status acknowledgment.
#[test]
fn test_status_triggers_request_before_ack_exactly_once() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    session.on_data(HELLO.as_bytes());

    let step = session.on_data(STATUS_TWO.as_bytes());
    assert_eq!(step.outbound.len(), 2);
    assert!(step.outbound[0].starts_with("<REQ.R01>"));
    assert!(step.outbound[0].contains(r#"<REQ.request_cd V="ROBS"/>"#));
    assert!(step.outbound[1].starts_with("<ACK.R01>"));
    assert!(control_id(&step.outbound[0]) < control_id(&step.outbound[1]));
    assert_eq!(session.phase(), SessionPhase::AwaitingData);
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e, SyncEvent::StatusReported { total_available: 2 })));
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e, SyncEvent::ObservationsRequested)));

    // A repeated status report is acknowledged but not re-requested.
    let again = session.on_data(STATUS_TWO.as_bytes());
    assert_eq!(again.outbound.len(), 1);
    assert!(again.outbound[0].starts_with("<ACK.R01>"));
}

/// Tests that an observation batch is captured, extracted, counted and
/// accepted under the default policy.
#[test]
fn test_observations_accumulate_under_accept_policy() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    play(&mut session, &[HELLO, STATUS_TWO]);

    let step = session.on_data(BATCH.as_bytes());
    assert_eq!(step.outbound.len(), 1);
    assert!(step.outbound[0].contains(r#"<ACK.type_cd V="AA"/>"#));
    assert_eq!(step.captures, vec![BATCH.to_string()]);
    assert!(step.events.iter().any(|e| matches!(
        e,
        SyncEvent::ProgressChanged {
            received: 3,
            total_available: 2
        }
    )));

    let outcome = session.finish();
    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.groups_received, 3);
    assert_eq!(outcome.total_available, 2);
    assert_eq!(outcome.device.unwrap().serial, "PT2-00412");
}

/// Tests that the reject policy changes only the acknowledgment type:
/// readings are still extracted, counted and archived.
#[test]
fn test_reject_policy_still_collects_readings() {
    let mut session = DeviceSession::new(AckPolicy::Reject);
    play(&mut session, &[HELLO, STATUS_TWO]);

    let step = session.on_data(BATCH.as_bytes());
    assert_eq!(step.outbound.len(), 1);
    assert!(step.outbound[0].contains(r#"<ACK.type_cd V="AR"/>"#));
    assert_eq!(step.captures.len(), 1);
    assert!(step.events.iter().any(|e| matches!(
        e,
        SyncEvent::ProgressChanged {
            received: 3,
            total_available: 2
        }
    )));

    let outcome = session.finish();
    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.groups_received, 3);
}

/// Tests that the reject policy answers reject even for a clean batch;
/// the type code is configuration, not a verdict on the data.
#[test]
fn test_reject_policy_acks_reject_for_clean_batch() {
    let clean = r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
   </SVC>
</OBS.R01>"#;

    let mut session = DeviceSession::new(AckPolicy::Reject);
    play(&mut session, &[HELLO, STATUS_TWO]);

    let step = session.on_data(clean.as_bytes());
    assert!(step.outbound[0].contains(r#"<ACK.type_cd V="AR"/>"#));
    assert_eq!(session.finish().candidates.len(), 1);
}

/// Tests that hello, status and end-of-topic acknowledgments stay accept
/// under the reject policy; it governs observation batches only.
#[test]
fn test_reject_policy_leaves_handshake_acks_accept() {
    let mut session = DeviceSession::new(AckPolicy::Reject);
    let steps = play(&mut session, &[HELLO, STATUS_TWO, EOT]);

    for step in &steps {
        for outbound in &step.outbound {
            if outbound.starts_with("<ACK.R01>") {
                assert!(outbound.contains(r#"<ACK.type_cd V="AA"/>"#));
            }
        }
    }
}

/// Tests that end of topic is acknowledged and moves to finalizing.
#[test]
fn test_end_of_topic_acknowledged() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    play(&mut session, &[HELLO, STATUS_TWO, BATCH]);

    let step = session.on_data(EOT.as_bytes());
    assert_eq!(step.outbound.len(), 1);
    assert!(step.outbound[0].contains(r#"<ACK.type_cd V="AA"/>"#));
    assert_eq!(session.phase(), SessionPhase::Finalizing);
}

/// Tests that an escape message is advisory: no acknowledgment, session
/// continues.
#[test]
fn test_escape_gets_no_acknowledgment() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    play(&mut session, &[HELLO, STATUS_TWO]);

    let step = session.on_data(ESCAPE.as_bytes());
    assert!(step.outbound.is_empty());
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e, SyncEvent::Error { .. })));

    // Data still flows afterwards.
    let step = session.on_data(BATCH.as_bytes());
    assert_eq!(step.outbound.len(), 1);
}

/// Tests that inbound acknowledgments and requests are absorbed without
/// response.
#[test]
fn test_inbound_ack_and_request_are_absorbed() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    let ack = "<ACK.R01>\n   <ACK>\n       <ACK.type_cd V=\"AA\"/>\n   </ACK>\n</ACK.R01>";
    let req = "<REQ.R01>\n   <REQ>\n       <REQ.request_cd V=\"ROBS\"/>\n   </REQ>\n</REQ.R01>";

    for text in [ack, req] {
        let step = session.on_data(text.as_bytes());
        assert!(step.outbound.is_empty());
        assert!(step.events.is_empty());
    }
}

/// Tests that observations arriving before any hello are still collected;
/// the device is the sequencer and data loss is worse than phase purity.
#[test]
fn test_out_of_phase_observations_still_collected() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    let step = session.on_data(BATCH.as_bytes());
    assert!(step.outbound[0].starts_with("<ACK.R01>"));

    let outcome = session.finish();
    assert_eq!(outcome.candidates.len(), 2);
    assert!(outcome.device.is_none());
}

/// Tests that control ids strictly increase across every outbound message
/// of a session, starting at 20001.
#[test]
fn test_control_ids_strictly_increase() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    let steps = play(&mut session, &[HELLO, STATUS_TWO, BATCH, EOT]);

    let ids: Vec<u32> = steps
        .iter()
        .flat_map(|step| step.outbound.iter())
        .map(|text| control_id(text))
        .collect();
    assert_eq!(ids, vec![20001, 20002, 20003, 20004, 20005]);
}

/// Tests that one chunk carrying several messages produces the same
/// responses as message-at-a-time delivery, in order.
#[test]
fn test_whole_conversation_in_one_chunk() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    let wire = format!("{HELLO}{STATUS_TWO}{BATCH}{EOT}");

    let step = session.on_data(wire.as_bytes());
    // ACK, REQ, ACK, ACK, ACK
    assert_eq!(step.outbound.len(), 5);
    assert!(step.outbound[0].starts_with("<ACK.R01>"));
    assert!(step.outbound[1].starts_with("<REQ.R01>"));
    assert!(step.outbound[2].starts_with("<ACK.R01>"));

    let outcome = session.finish();
    assert_eq!(outcome.candidates.len(), 2);
}

/// Tests that a session cut off before end of topic still yields its
/// partial data on finish.
#[test]
fn test_partial_transfer_survives_finish() {
    let mut session = DeviceSession::new(AckPolicy::Accept);
    play(&mut session, &[HELLO, STATUS_TWO, BATCH]);
    // No EOT, connection just drops.

    let outcome = session.finish();
    assert_eq!(outcome.candidates.len(), 2);
    assert_eq!(outcome.total_available, 2);
    assert!(outcome.device.is_some());
}
