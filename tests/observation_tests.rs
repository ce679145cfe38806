//! Integration tests for observation extraction from real-shaped
//! observation message bodies.

use poct1_rs::payload::observation::{extract_observations, ReadingStatus};

const TWO_VALID_GROUPS: &str = r#"<OBS.R01>
   <HDR>
       <HDR.control_id V="12"/>
   </HDR>
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
       <RGT>
           <RGT.lot_number V="RL-2309"/>
       </RGT>
   </SVC>
   <SVC>
       <SVC.observation_dttm V="2024-01-17T09:05:00-05:00"/>
       <SVC.status_cd V="H"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="3.8"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="41.7"/>
       </OBS>
   </SVC>
</OBS.R01>"#;

/// Tests that every well-formed group is extracted with its fields.
#[test]
fn test_valid_groups_extract_completely() {
    let report = extract_observations(TWO_VALID_GROUPS);
    assert_eq!(report.groups_seen, 2);
    assert_eq!(report.readings.len(), 2);

    let first = &report.readings[0];
    assert_eq!(first.id, "2024-01-15T10:30:00-05:00");
    assert_eq!(first.inr, 2.4);
    assert_eq!(first.pt_seconds, 28.1);
    assert_eq!(first.status, ReadingStatus::Normal);
    assert_eq!(first.reagent_lot.as_deref(), Some("RL-2309"));
    assert_eq!(first.patient_id, None);

    let second = &report.readings[1];
    assert_eq!(second.status, ReadingStatus::High);
    assert_eq!(second.inr, 3.8);
    assert_eq!(second.reagent_lot, None);
}

/// Tests that a group missing the primary INR value is dropped but still
/// counted toward progress.
#[test]
fn test_group_missing_primary_value_is_dropped_but_counted() {
    let body = r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
   </SVC>
</OBS.R01>"#;
    let report = extract_observations(body);
    assert_eq!(report.groups_seen, 1);
    assert!(report.readings.is_empty());
}

/// Tests that zero or negative measured values reject the group.
#[test]
fn test_nonpositive_values_reject_the_group() {
    for bad in ["0", "-1.5", "abc", ""] {
        let body = format!(
            r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="{bad}"/>
       </OBS>
   </SVC>
</OBS.R01>"#
        );
        let report = extract_observations(&body);
        assert_eq!(report.groups_seen, 1, "secondary value {bad:?}");
        assert!(report.readings.is_empty(), "secondary value {bad:?}");
    }
}

/// Tests that a missing or unparseable timestamp rejects the group.
#[test]
fn test_bad_timestamp_rejects_the_group() {
    for dttm in ["", "yesterday", "2024-01-15 10:30:00"] {
        let body = format!(
            r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="{dttm}"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
   </SVC>
</OBS.R01>"#
        );
        let report = extract_observations(&body);
        assert_eq!(report.groups_seen, 1, "timestamp {dttm:?}");
        assert!(report.readings.is_empty(), "timestamp {dttm:?}");
    }
}

/// Tests that one malformed group does not take its neighbors with it.
#[test]
fn test_malformed_group_leaves_neighbors_intact() {
    let body = r#"<OBS.R01>
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
   <SVC>
       <SVC.observation_dttm V="2024-01-16T10:30:00-05:00"/>
   </SVC>
   <SVC>
       <SVC.observation_dttm V="2024-01-17T10:30:00-05:00"/>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.9"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="33.0"/>
       </OBS>
   </SVC>
</OBS.R01>"#;
    let report = extract_observations(body);
    assert_eq!(report.groups_seen, 3);
    assert_eq!(report.readings.len(), 2);
    assert_eq!(report.readings[0].inr, 2.4);
    assert_eq!(report.readings[1].inr, 2.9);
}

/// Tests that unknown observation ids and elements are skipped without
/// disturbing the known pairs.
#[test]
fn test_unknown_elements_and_ids_are_skipped() {
    let body = r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <SVC.role_cd V="OBS"/>
       <OBS>
           <OBS.observation_id V="99999-9"/>
           <OBS.value V="123.0"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
       <FOO.bar V="baz"/>
   </SVC>
</OBS.R01>"#;
    let report = extract_observations(body);
    assert_eq!(report.readings.len(), 1);
    assert_eq!(report.readings[0].inr, 2.4);
    assert_eq!(report.readings[0].pt_seconds, 28.1);
}

/// Tests that patient id and note elements round into the reading.
#[test]
fn test_patient_and_note_fields_are_captured() {
    let body = r#"<OBS.R01>
   <SVC>
       <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
       <PT>
           <PT.patient_id V="SELF"/>
       </PT>
       <OBS>
           <OBS.observation_id V="34714-6"/>
           <OBS.value V="2.4"/>
       </OBS>
       <OBS>
           <OBS.observation_id V="5902-2"/>
           <OBS.value V="28.1"/>
       </OBS>
       <NTE>
           <NTE.text V="after missed dose"/>
       </NTE>
   </SVC>
</OBS.R01>"#;
    let report = extract_observations(body);
    assert_eq!(report.readings.len(), 1);
    assert_eq!(report.readings[0].patient_id.as_deref(), Some("SELF"));
    assert_eq!(report.readings[0].note.as_deref(), Some("after missed dose"));
}

/// Tests that entity references in attribute values are unescaped.
#[test]
fn test_attribute_values_are_unescaped() {
    let body = r#"<OBS.R01>
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
       <NTE>
           <NTE.text V="salt &amp; vinegar"/>
       </NTE>
   </SVC>
</OBS.R01>"#;
    let report = extract_observations(body);
    assert_eq!(report.readings[0].note.as_deref(), Some("salt & vinegar"));
}

/// Tests that an empty body yields an empty report.
#[test]
fn test_empty_body_yields_empty_report() {
    let report = extract_observations("<OBS.R01></OBS.R01>");
    assert_eq!(report.groups_seen, 0);
    assert!(report.readings.is_empty());
}

/// Tests that observation timestamps keep their device-local offset.
#[test]
fn test_timestamp_offset_is_preserved() {
    let report = extract_observations(TWO_VALID_GROUPS);
    let observed = report.readings[0].observed_at;
    assert_eq!(observed.offset().local_minus_utc(), -5 * 3600);
}
