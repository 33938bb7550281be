use std::time::Duration;

use subflow_core::{
    device_tag, ControlAction, Engine, EngineConfig, EventFrame, FrameSink, InboundEvent, Mode,
    Recorder, RecordingSettings,
};

const FRAME: Duration = Duration::from_micros(16_667);

fn seeded_config(seed: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.layout.jitter_seed = Some(seed);
    config
}

fn tap(engine: &mut Engine, at: f64) {
    engine.apply(InboundEvent::Control(ControlAction::Tap), at);
}

#[test]
fn sequenced_tempo_advances_on_pulse() {
    let (mut engine, sender) = Engine::new(seeded_config(1), 0.0);
    sender
        .send(InboundEvent::Program("subflow24379;BPM:100:4".to_string()))
        .expect("inbox accepts program");
    sender
        .send(InboundEvent::Control(ControlAction::Tap))
        .expect("inbox accepts tap");

    engine.tick(0.0, FRAME);
    assert!(engine.sequencer().is_ready());
    assert_eq!(engine.sequencer().countdown(), 4);

    engine.tick(0.59, FRAME);
    assert_eq!(engine.sequencer().countdown(), 4);

    engine.tick(0.61, FRAME);
    assert_eq!(engine.sequencer().countdown(), 3);
    assert_eq!(engine.pulse().remote_bpm(), 100.0);
    assert!((engine.pulse().period() - 0.6).abs() < 1e-9);
    assert!(engine.animation().scale > 1.05);
}

#[test]
fn taps_set_period_and_speed() {
    let (mut engine, _sender) = Engine::new(seeded_config(2), 0.0);
    tap(&mut engine, 0.0);
    assert_eq!(engine.pulse().period(), 0.0);

    tap(&mut engine, 0.5);
    tap(&mut engine, 1.0);
    tap(&mut engine, 1.5);
    assert_eq!(engine.pulse().accumulated_beats(), 3.0);
    assert!((engine.pulse().period() - 0.5).abs() < 1e-9);
    assert!((engine.animation().speed_command - 1.0).abs() < 1e-6);

    engine.tick(2.01, FRAME);
    assert!((engine.pulse().last_pulse() - 2.0).abs() < 1e-9);
}

#[test]
fn pause_then_tap_resumes_saved_period() {
    let (mut engine, _sender) = Engine::new(seeded_config(3), 0.0);
    for i in 0..4 {
        tap(&mut engine, i as f64 * 0.5);
    }
    engine.apply(InboundEvent::Control(ControlAction::Pause), 2.0);
    assert!(!engine.pulse().is_running());
    assert!((engine.pulse().saved_period() - 0.5).abs() < 1e-9);

    tap(&mut engine, 3.0);
    assert!((engine.pulse().period() - 0.5).abs() < 1e-9);
    assert_eq!(engine.pulse().accumulated_beats(), 0.0);
    assert_eq!(engine.pulse().last_pulse(), 3.0);
}

#[test]
fn replayed_mode_command_settles_on_grid() {
    let (mut engine, sender) = Engine::new(seeded_config(4), 0.0);
    let event: InboundEvent =
        serde_json::from_str(r#"{"type":"frame","value":{"evt":"cmd","id":23,"param":6}}"#)
            .expect("event decodes");
    sender.send(event).expect("inbox accepts frame");

    let mut frame = engine.tick(0.0, FRAME);
    for i in 1..600 {
        frame = engine.tick(i as f64 / 60.0, FRAME);
    }
    assert_eq!(frame.mode, Mode::Shimmer);

    let layout = &engine.config().layout;
    let first = frame.instances[0];
    assert!((first.position.x - layout.column_offset).abs() < 1e-3);
    assert!((first.position.y - layout.row_offset).abs() < 1e-3);
    assert!((first.position.z - layout.grid_depth).abs() < 1e-3);

    let last = frame.instances[59];
    let expected_x = 14.0 * layout.column_spacing + layout.column_offset;
    let expected_y = 3.0 * layout.row_spacing + layout.row_offset;
    assert!((last.position.x - expected_x).abs() < 1e-3);
    assert!((last.position.y - expected_y).abs() < 1e-3);
    assert!(frame
        .brightness()
        .all(|b| (b - engine.animation().shade.value).abs() < 1e-6));
}

#[test]
fn beat_frames_drive_sequence_in_direct_mode() {
    let (mut engine, sender) = Engine::new(seeded_config(5), 0.0);
    sender
        .send(InboundEvent::Program(
            "subflow24379;MOD:2:1;MOD:3:1;LOP:1:0".to_string(),
        ))
        .expect("inbox accepts program");
    sender
        .send(InboundEvent::Frame(EventFrame::command(17, 100)))
        .expect("inbox accepts start");
    engine.tick(0.0, FRAME);
    assert_eq!(engine.animation().mode, Mode::Linear);

    let modes: Vec<Mode> = (1..=6)
        .map(|i| {
            sender
                .send(InboundEvent::Frame(EventFrame::beat(0.0, 1.0)))
                .expect("inbox accepts beat");
            engine.tick(i as f64 / 60.0, FRAME).mode
        })
        .collect();
    assert_eq!(
        modes,
        vec![
            Mode::Linear,
            Mode::Full,
            Mode::Full,
            Mode::Linear,
            Mode::Linear,
            Mode::Full
        ]
    );
}

#[test]
fn recorder_captures_engine_frames() {
    let (mut engine, _sender) = Engine::new(seeded_config(6), 0.0);
    let mut recorder = Recorder::new(Vec::new(), RecordingSettings { every_nth: 5 });
    recorder.start().expect("recording starts");
    for i in 0..10 {
        let frame = engine.tick(i as f64 / 60.0, FRAME);
        recorder.submit(&frame).expect("frame recorded");
    }
    recorder.stop().expect("recording stops");

    let output = String::from_utf8(recorder.into_inner()).expect("utf8 output");
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).expect("frame is json"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["instances"].as_array().map(Vec::len), Some(60));
    assert_eq!(lines[1]["mode"], "spread");
}

#[test]
fn seeded_engines_produce_identical_frames() {
    let run = || {
        let (mut engine, _sender) = Engine::new(seeded_config(42), 0.0);
        engine.apply(InboundEvent::Control(ControlAction::Pause), 0.0);
        (0..30)
            .map(|i| engine.tick(i as f64 / 60.0, FRAME))
            .collect::<Vec<_>>()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert!(first[0].pose.scale > 1.0);
}

#[test]
fn device_tag_regression() {
    assert_eq!(device_tag("ABC31337-A123-B456-789E-DEADBEEFCAFE"), 199);
}
