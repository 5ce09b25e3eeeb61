//! Preset round-trip tests against the engine

use serde_json::Value;

use soundflow_core::{Engine, EngineConfig, PresetDocument, TriggerName};

fn engine() -> Engine {
    let (engine, _diag) = Engine::new(EngineConfig::default()).unwrap();
    engine
}

#[test]
fn test_applied_threshold_and_unknown_key_roundtrip() {
    // Scenario: a preset written by a newer release carries keys this
    // version does not know about, at several nesting levels.
    let text = r#"{
        "formatVersion": 4,
        "lowSoloMode": false,
        "futureFeature": {"enabled": true, "depth": 3},
        "dsp": {"gain": 4.0, "futureDspKnob": 0.5},
        "bpm": {"min": 80.0, "max": 160.0, "mute": false},
        "triggers": {
            "bass": {"threshold": 0.73, "future": 42},
            "high": {"threshold": 0.9, "osc": {"on": "/h/on", "futureOsc": "x"}}
        }
    }"#;

    let mut engine = engine();
    let doc = PresetDocument::from_json(text).unwrap();
    engine.from_state(&doc).unwrap();

    assert_eq!(engine.trigger(TriggerName::Bass).threshold(), 0.73);
    assert_eq!(engine.trigger(TriggerName::High).threshold(), 0.9);
    assert_eq!(engine.spectrum().gain(), 4.0);
    assert_eq!(engine.tempo().min_bpm(), 80.0);
    assert_eq!(engine.tempo().max_bpm(), 160.0);

    let out = engine.to_state();
    let json: Value = serde_json::from_str(&out.to_json_pretty()).unwrap();
    assert_eq!(json["triggers"]["bass"]["future"], Value::from(42));
    assert_eq!(json["futureFeature"]["depth"], Value::from(3));
    assert_eq!(json["dsp"]["futureDspKnob"], Value::from(0.5));
    assert_eq!(json["triggers"]["high"]["osc"]["futureOsc"], Value::from("x"));
    assert_eq!(json["triggers"]["high"]["osc"]["on"], Value::from("/h/on"));
}

#[test]
fn test_state_file_roundtrip_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("show.json");

    let mut eng = engine();
    eng.set_low_solo_mode(true);
    eng.spectrum_mut().set_compression(1.5);
    eng.trigger_mut(TriggerName::Envelope)
        .filter_mut()
        .set_max_hold(2.0);
    eng.save_preset(&path).unwrap();

    // A second engine restored from the file serialises identically.
    let mut other = engine();
    other.load_preset(&path).unwrap();
    assert!(other.low_solo_mode());
    assert_eq!(other.spectrum().compression(), 1.5);
    assert_eq!(
        other.trigger(TriggerName::Envelope).filter().max_hold(),
        2.0
    );
    assert_eq!(
        other.to_state().to_json_pretty(),
        eng.to_state().to_json_pretty()
    );
}

#[test]
fn test_rejected_preset_changes_nothing() {
    let mut engine = engine();
    engine.trigger_mut(TriggerName::Bass).set_threshold(0.4);

    let bad = PresetDocument::from_json(
        r#"{
            "formatVersion": 4,
            "triggers": {"bass": {"threshold": 7.0}}
        }"#,
    )
    .unwrap();
    assert!(engine.from_state(&bad).is_err());
    assert_eq!(engine.trigger(TriggerName::Bass).threshold(), 0.4);

    let bad_template = PresetDocument::from_json(
        r#"{
            "formatVersion": 4,
            "triggers": {"bass": {"osc": {"on": "missing-slash"}}}
        }"#,
    )
    .unwrap();
    assert!(engine.from_state(&bad_template).is_err());
}
