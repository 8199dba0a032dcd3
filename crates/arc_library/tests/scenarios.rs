use std::thread;
use std::time::{Duration, Instant};

use arc_library::midi::ControlMessage;
use arc_library::mode::ModeMachine;
use arc_library::model::{RingAddress, Writer};
use arc_library::services::{
    ControlSender, LedUpdate, ModulationEngine, OscControl, Renderer, Service,
};
use arc_library::sink::Recorder;
use arc_library::{InputEvent, Mode, Model, Runtime, Settings, SharedModel, Sinks};

const TICK: Duration = Duration::from_millis(16);

struct Rig {
    model: SharedModel,
    fsm: ModeMachine,
    modulation: ModulationEngine,
    renderer: Renderer,
    sender: ControlSender,
    leds: Recorder<Vec<LedUpdate>>,
    midi: Recorder<ControlMessage>,
}

impl Rig {
    fn new(settings: Settings) -> Self {
        let model = SharedModel::new(Model::from_settings(&settings).unwrap());
        let leds = Recorder::new();
        let midi = Recorder::new();
        Self {
            fsm: ModeMachine::new(model.clone(), &settings),
            modulation: ModulationEngine::new(model.clone()),
            renderer: Renderer::new(model.clone(), Box::new(leds.clone())),
            sender: ControlSender::new(model.clone(), &settings, Some(Box::new(midi.clone())), None)
                .unwrap(),
            model,
            leds,
            midi,
        }
    }

    // one pass of every service, modulation first
    fn tick(&mut self) -> (usize, usize, usize) {
        (
            self.modulation.tick(TICK),
            self.renderer.tick(TICK),
            self.sender.tick(TICK),
        )
    }
}

fn with_presets(names: [&str; 4]) -> Settings {
    Settings {
        ring_presets: names.map(String::from).to_vec(),
        ..Settings::default()
    }
}

#[test]
fn first_turn_sends_one_cc() {
    let mut rig = Rig::new(Settings::default());
    rig.tick();

    assert_eq!(rig.fsm.handle(InputEvent::DeviceConnected), Mode::Ready);
    assert_eq!(rig.fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 5 }), Mode::ValueSend);

    let value = rig.model.read(|m| m.ring(RingAddress { layer: 0, ring: 0 }).unwrap().value);
    assert!((value - 5.0 * 0.001).abs() < 1e-12);

    rig.tick();
    let sent = rig.midi.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cc(), 1);
}

#[test]
fn long_hold_then_release() {
    let mut rig = Rig::new(Settings::default());
    let t0 = Instant::now();
    rig.fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 1 });
    assert_eq!(rig.fsm.handle(InputEvent::ButtonPress { at: t0 }), Mode::LayerSelect);
    assert_eq!(rig.fsm.check_hold(t0 + Duration::from_millis(250)), Mode::PresetSelect);
    assert_eq!(
        rig.fsm.handle(InputEvent::ButtonRelease { at: t0 + Duration::from_millis(300) }),
        Mode::ValueSend
    );
}

#[test]
fn disconnect_freezes_output_until_reconnect() {
    let mut rig = Rig::new(with_presets(["linear", "sine", "perlin", "drift"]));
    rig.fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 10 });
    rig.tick();

    assert_eq!(rig.fsm.handle(InputEvent::DeviceDisconnected), Mode::Disconnected);
    let frozen = rig.model.read(|m| m.layers().to_vec());
    let led_frames = rig.leds.len();
    let ccs = rig.midi.len();

    for _ in 0..10 {
        assert_eq!(rig.tick(), (0, 0, 0));
    }
    assert_eq!(rig.model.read(|m| m.layers().to_vec()), frozen);
    assert_eq!(rig.leds.len(), led_frames);
    assert_eq!(rig.midi.len(), ccs);

    assert_eq!(rig.fsm.handle(InputEvent::DeviceConnected), Mode::Ready);
    let (modulated, leds, _) = rig.tick();
    assert_eq!(modulated, 12);
    // the reconnect forces a full redraw
    assert_eq!(leds, 4 * 64);
}

#[test]
fn rendering_an_unchanged_layer_twice_writes_nothing() {
    let mut rig = Rig::new(with_presets(["linear", "endless", "bipolar", "midi_14bit"]));
    let (_, first, _) = rig.tick();
    assert!(first > 0);
    let (_, second, _) = rig.tick();
    assert_eq!(second, 0);
}

#[test]
fn no_ring_is_ever_open_to_both_writers() {
    let mut rig = Rig::new(Settings::default());
    let presets = rig.model.read(|m| m.presets().len());
    for step in 0..presets {
        rig.model.update(|m| {
            let addresses: Vec<RingAddress> = m
                .layers()
                .iter()
                .flat_map(|l| l.rings.iter().map(|r| r.address))
                .collect();
            for address in addresses {
                m.cycle_preset(address, 1);
                let ring = m.ring_mut(address).unwrap();
                let mut as_input = *ring;
                let mut as_lfo = *ring;
                let lfo = ring.lfo;
                let input_ok = as_input.apply_input_delta(1, 0.001).is_ok();
                let lfo_ok = as_lfo.apply_modulation(0.5, lfo).is_ok();
                assert!(input_ok != lfo_ok, "step {step}: {address:?} open to both or neither");
                assert_eq!(input_ok, ring.writer() == Writer::Input);
            }
        });
        rig.tick();
    }
}

fn recording_runtime(settings: &Settings) -> (Runtime, SharedModel) {
    let model = SharedModel::new(Model::from_settings(settings).unwrap());
    let sinks = Sinks {
        leds: Box::new(Recorder::<Vec<LedUpdate>>::new()),
        midi: Some(Box::new(Recorder::<ControlMessage>::new())),
        osc: None,
    };
    (Runtime::start(settings, model.clone(), sinks).unwrap(), model)
}

// Feeds `events` with the sender left open, then quits after `quit_after`.
fn run_for(runtime: &mut Runtime, events: Vec<InputEvent>, quit_after: Duration) {
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    for event in events {
        events_tx.send(event).unwrap();
    }
    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    let quitter = thread::spawn(move || {
        thread::sleep(quit_after);
        quit_tx.send(()).unwrap();
    });
    runtime.run_input(&events_rx, &quit_rx);
    quitter.join().unwrap();
    drop(events_tx);
}

#[test]
fn holding_without_release_reaches_preset_select_on_its_own() {
    let (mut runtime, model) = recording_runtime(&Settings::default());
    let pressed = Instant::now();
    run_for(
        &mut runtime,
        vec![
            InputEvent::EncoderDelta { ring: 0, delta: 1 },
            InputEvent::ButtonPress { at: pressed },
        ],
        Duration::from_millis(400),
    );
    assert_eq!(runtime.mode(), Mode::PresetSelect);
    assert_eq!(model.read(|m| m.active_layer()), 0);
    runtime.shutdown();
}

#[test]
fn release_before_the_hold_time_is_a_short_press() {
    let (mut runtime, model) = recording_runtime(&Settings::default());
    let pressed = Instant::now();
    run_for(
        &mut runtime,
        vec![
            InputEvent::EncoderDelta { ring: 0, delta: 1 },
            InputEvent::ButtonPress { at: pressed },
            InputEvent::ButtonRelease { at: pressed + Duration::from_millis(50) },
        ],
        Duration::from_millis(400),
    );
    assert_eq!(runtime.mode(), Mode::ValueSend);
    assert_eq!(model.read(|m| m.active_layer()), 1);
    runtime.shutdown();
}

#[test]
fn runtime_processes_events_and_blanks_on_shutdown() {
    let settings = Settings::default();
    let model = SharedModel::new(Model::from_settings(&settings).unwrap());
    let leds = Recorder::<Vec<LedUpdate>>::new();
    let midi = Recorder::<ControlMessage>::new();
    let osc = Recorder::<OscControl>::new();
    let sinks = Sinks {
        leds: Box::new(leds.clone()),
        midi: Some(Box::new(midi.clone())),
        osc: Some(Box::new(osc.clone())),
    };
    let mut runtime = Runtime::start(&settings, model, sinks).unwrap();

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let (_quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(0);
    events_tx.send(InputEvent::DeviceConnected).unwrap();
    events_tx.send(InputEvent::EncoderDelta { ring: 2, delta: 500 }).unwrap();
    drop(events_tx);
    runtime.run_input(&events_rx, &quit_rx);
    assert_eq!(runtime.mode(), Mode::ValueSend);

    thread::sleep(Duration::from_millis(200));
    runtime.shutdown();

    assert!(midi.messages().iter().any(|m| m.cc() == 3));
    assert!(osc.messages().iter().any(|m| m.address == "/arc/layer/0/ring/2/value"));
    let last = leds.messages().pop().unwrap();
    assert_eq!(last.len(), 4 * 64);
    assert!(last.iter().all(|u| u.brightness == 0));
}
