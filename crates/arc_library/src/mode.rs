use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::event::{InputEvent, Trigger};
use crate::model::Indicator;
use crate::settings::Settings;
use crate::shared::SharedModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Ready,
    ValueSend,
    LayerSelect,
    PresetSelect,
    Disconnected,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Ready => "READY",
            Mode::ValueSend => "VALUE_SEND",
            Mode::LayerSelect => "LAYER_SELECT",
            Mode::PresetSelect => "PRESET_SELECT",
            Mode::Disconnected => "DISCONNECTED",
        })
    }
}

/// The transition table. `None` marks a pair with no effect; self loops are
/// returned as `Some(mode)` so the event is still handled in that mode.
pub fn transition(mode: Mode, trigger: Trigger) -> Option<Mode> {
    use Mode::*;
    match (mode, trigger) {
        (_, Trigger::Disconnect) => Some(Disconnected),
        (Disconnected, Trigger::Connect) => Some(Ready),
        (Disconnected, _) => None,
        (Ready, Trigger::Delta | Trigger::Press | Trigger::Release) => Some(ValueSend),
        (ValueSend, Trigger::Press) => Some(LayerSelect),
        (LayerSelect, Trigger::LongPress) => Some(PresetSelect),
        (ValueSend | LayerSelect | PresetSelect, Trigger::Release) => Some(ValueSend),
        (ValueSend | LayerSelect | PresetSelect, Trigger::Delta) => Some(mode),
        _ => None,
    }
}

/// Interprets the ordered input stream and applies each mode's effects to
/// the shared model.
pub struct ModeMachine {
    mode: Mode,
    model: SharedModel,
    long_press: Duration,
    threshold: i64,
    pressed_at: Option<Instant>,
    layer_acc: i64,
    preset_acc: Vec<i64>,
    preset_indicator_up: bool,
    redraw: Option<Sender<()>>,
}

impl ModeMachine {
    pub fn new(model: SharedModel, settings: &Settings) -> Self {
        let rings = model.read(|m| m.rings_per_layer());
        Self {
            mode: Mode::Ready,
            model,
            long_press: settings.long_press(),
            threshold: i64::from(settings.preset_select_threshold.max(1)),
            pressed_at: None,
            layer_acc: 0,
            preset_acc: vec![0; rings],
            preset_indicator_up: false,
            redraw: None,
        }
    }

    /// Indicator changes are pushed to `redraw` so they show up without
    /// waiting for the next render tick.
    pub fn with_redraw(mut self, redraw: Sender<()>) -> Self {
        self.redraw = Some(redraw);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Processes one event to completion and returns the resulting mode.
    pub fn handle(&mut self, event: InputEvent) -> Mode {
        // a release settles any hold that outlived the threshold first
        if let InputEvent::ButtonRelease { at } = event {
            self.check_hold(at);
        }

        let from = self.mode;
        if !self.fire(event.trigger()) {
            debug!(mode = %from, ?event, "event ignored");
            return self.mode;
        }

        match event {
            InputEvent::EncoderDelta { ring, delta } => self.on_delta(ring, delta),
            // the input that woke us up is handled again in the new mode
            InputEvent::ButtonPress { .. } if from == Mode::Ready => return self.handle(event),
            InputEvent::ButtonPress { .. } | InputEvent::ButtonRelease { .. } => {
                self.on_button(event)
            }
            InputEvent::DeviceConnected | InputEvent::DeviceDisconnected => {}
        }
        self.mode
    }

    /// Raises a long press once the button has been held for the hold time.
    pub fn check_hold(&mut self, now: Instant) -> Mode {
        let held = self
            .pressed_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.long_press);
        if held && self.mode == Mode::LayerSelect {
            self.fire(Trigger::LongPress);
        }
        self.mode
    }

    /// When [`ModeMachine::check_hold`] should next be called, if at all.
    pub fn hold_deadline(&self) -> Option<Instant> {
        match self.mode {
            Mode::LayerSelect => self.pressed_at.map(|at| at + self.long_press),
            _ => None,
        }
    }

    fn fire(&mut self, trigger: Trigger) -> bool {
        let Some(next) = transition(self.mode, trigger) else {
            return false;
        };
        if next != self.mode {
            let from = self.mode;
            self.exit(from);
            info!(from = %from, to = %next, ?trigger, "mode");
            self.mode = next;
            self.enter(next);
        }
        true
    }

    fn enter(&mut self, mode: Mode) {
        match mode {
            Mode::Ready => {
                self.model.set_online(true);
                self.model.update(|m| m.request_redraw());
            }
            Mode::ValueSend => {}
            Mode::LayerSelect => {
                // every short press steps to the next layer
                self.model.update(|m| {
                    let layer = m.cycle_layer(1);
                    m.set_indicator(Some(Indicator::Layer(layer)));
                });
                self.redraw_now();
            }
            Mode::PresetSelect => {
                // the press that got us here stepped a layer; go back to it
                self.model.update(|m| {
                    let layer = m.cycle_layer(-1);
                    m.set_indicator(Some(Indicator::Layer(layer)));
                });
                self.preset_indicator_up = true;
                self.redraw_now();
            }
            Mode::Disconnected => {
                self.model.set_online(false);
                self.pressed_at = None;
            }
        }
    }

    fn exit(&mut self, mode: Mode) {
        match mode {
            Mode::LayerSelect => {
                self.layer_acc = 0;
                self.clear_indicator();
            }
            Mode::PresetSelect => {
                self.preset_acc.iter_mut().for_each(|acc| *acc = 0);
                self.preset_indicator_up = false;
                self.clear_indicator();
            }
            Mode::Ready | Mode::ValueSend | Mode::Disconnected => {}
        }
    }

    fn clear_indicator(&self) {
        self.model.update(|m| {
            m.set_indicator(None);
            m.request_redraw();
        });
        self.redraw_now();
    }

    fn redraw_now(&self) {
        // a full queue already has a redraw pending
        if let Some(redraw) = &self.redraw {
            let _ = redraw.try_send(());
        }
    }

    fn on_delta(&mut self, ring: usize, delta: i32) {
        match self.mode {
            Mode::ValueSend => {
                if let Err(e) = self.model.update(|m| m.on_delta(ring, delta)) {
                    warn!(ring, delta, "delta rejected: {e}");
                }
            }
            Mode::LayerSelect => {
                let steps = accumulate(&mut self.layer_acc, delta, self.threshold);
                if steps != 0 {
                    self.model.update(|m| {
                        let layer = m.cycle_layer(steps);
                        m.set_indicator(Some(Indicator::Layer(layer)));
                    });
                    self.redraw_now();
                }
            }
            Mode::PresetSelect => {
                if self.preset_indicator_up {
                    // the layer highlight holds until the first turn
                    self.preset_indicator_up = false;
                    self.clear_indicator();
                }
                let Some(acc) = self.preset_acc.get_mut(ring) else {
                    debug!(ring, "delta for unknown ring ignored");
                    return;
                };
                let steps = accumulate(acc, delta, self.threshold);
                if steps != 0 {
                    self.model.update(|m| {
                        let address = m.active_ring(ring);
                        m.cycle_preset(address, steps);
                        m.request_redraw();
                    });
                }
            }
            Mode::Ready | Mode::Disconnected => {}
        }
    }

    fn on_button(&mut self, event: InputEvent) {
        match event {
            InputEvent::ButtonPress { at } => self.pressed_at = Some(at),
            InputEvent::ButtonRelease { .. } => self.pressed_at = None,
            _ => {}
        }
    }
}

// Adds `delta` and returns the whole thresholds crossed, keeping the remainder.
fn accumulate(acc: &mut i64, delta: i32, threshold: i64) -> i64 {
    *acc += i64::from(delta);
    let steps = *acc / threshold;
    *acc -= steps * threshold;
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::styles::ValueStyle;
    use test_case::test_case;

    use Mode::*;

    #[test_case(Ready, Trigger::Delta => Some(ValueSend))]
    #[test_case(Ready, Trigger::Press => Some(ValueSend))]
    #[test_case(Ready, Trigger::Release => Some(ValueSend))]
    #[test_case(Ready, Trigger::LongPress => None)]
    #[test_case(Ready, Trigger::Connect => None)]
    #[test_case(Ready, Trigger::Disconnect => Some(Disconnected))]
    #[test_case(ValueSend, Trigger::Delta => Some(ValueSend))]
    #[test_case(ValueSend, Trigger::Press => Some(LayerSelect))]
    #[test_case(ValueSend, Trigger::Release => Some(ValueSend))]
    #[test_case(ValueSend, Trigger::LongPress => None)]
    #[test_case(ValueSend, Trigger::Connect => None)]
    #[test_case(ValueSend, Trigger::Disconnect => Some(Disconnected))]
    #[test_case(LayerSelect, Trigger::Delta => Some(LayerSelect))]
    #[test_case(LayerSelect, Trigger::Press => None)]
    #[test_case(LayerSelect, Trigger::Release => Some(ValueSend))]
    #[test_case(LayerSelect, Trigger::LongPress => Some(PresetSelect))]
    #[test_case(LayerSelect, Trigger::Connect => None)]
    #[test_case(LayerSelect, Trigger::Disconnect => Some(Disconnected))]
    #[test_case(PresetSelect, Trigger::Delta => Some(PresetSelect))]
    #[test_case(PresetSelect, Trigger::Press => None)]
    #[test_case(PresetSelect, Trigger::Release => Some(ValueSend))]
    #[test_case(PresetSelect, Trigger::LongPress => None)]
    #[test_case(PresetSelect, Trigger::Connect => None)]
    #[test_case(PresetSelect, Trigger::Disconnect => Some(Disconnected))]
    #[test_case(Disconnected, Trigger::Delta => None)]
    #[test_case(Disconnected, Trigger::Press => None)]
    #[test_case(Disconnected, Trigger::Release => None)]
    #[test_case(Disconnected, Trigger::LongPress => None)]
    #[test_case(Disconnected, Trigger::Connect => Some(Ready))]
    #[test_case(Disconnected, Trigger::Disconnect => Some(Disconnected))]
    fn transition_table(mode: Mode, trigger: Trigger) -> Option<Mode> {
        transition(mode, trigger)
    }

    fn machine() -> (ModeMachine, SharedModel) {
        let settings = Settings::default();
        let shared = SharedModel::new(Model::from_settings(&settings).unwrap());
        (ModeMachine::new(shared.clone(), &settings), shared)
    }

    #[test]
    fn first_delta_is_applied_after_leaving_ready() {
        let (mut fsm, shared) = machine();
        assert_eq!(fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 5 }), ValueSend);
        let value = shared.read(|m| m.ring(m.active_ring(0)).unwrap().value);
        assert!((value - 0.005).abs() < 1e-12);
    }

    #[test]
    fn short_press_steps_one_layer() {
        let (mut fsm, shared) = machine();
        let t0 = Instant::now();
        fsm.handle(InputEvent::DeviceConnected);
        assert_eq!(fsm.handle(InputEvent::ButtonPress { at: t0 }), LayerSelect);
        assert_eq!(shared.read(|m| m.indicator()), Some(Indicator::Layer(1)));
        let release = t0 + Duration::from_millis(100);
        assert_eq!(fsm.handle(InputEvent::ButtonRelease { at: release }), ValueSend);
        assert_eq!(shared.read(|m| (m.active_layer(), m.indicator())), (1, None));
    }

    #[test]
    fn hold_reaches_preset_select_on_the_original_layer() {
        let (mut fsm, shared) = machine();
        let t0 = Instant::now();
        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 0 });
        fsm.handle(InputEvent::ButtonPress { at: t0 });
        assert_eq!(fsm.hold_deadline(), Some(t0 + Duration::from_millis(200)));
        assert_eq!(fsm.check_hold(t0 + Duration::from_millis(150)), LayerSelect);
        assert_eq!(fsm.check_hold(t0 + Duration::from_millis(250)), PresetSelect);
        assert_eq!(shared.read(|m| m.active_layer()), 0);
        assert_eq!(fsm.hold_deadline(), None);
    }

    #[test]
    fn layer_select_turns_in_whole_thresholds() {
        let (mut fsm, shared) = machine();
        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 0 });
        fsm.handle(InputEvent::ButtonPress { at: Instant::now() });
        assert_eq!(shared.read(|m| m.active_layer()), 1);

        fsm.handle(InputEvent::EncoderDelta { ring: 3, delta: 15 });
        assert_eq!(shared.read(|m| m.active_layer()), 1);
        fsm.handle(InputEvent::EncoderDelta { ring: 3, delta: 30 });
        assert_eq!(shared.read(|m| m.active_layer()), 3);
        fsm.handle(InputEvent::EncoderDelta { ring: 3, delta: -65 });
        assert_eq!(shared.read(|m| m.active_layer()), 0);
    }

    #[test]
    fn preset_select_keeps_remainders_per_ring() {
        let (mut fsm, shared) = machine();
        let t0 = Instant::now();
        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 0 });
        fsm.handle(InputEvent::ButtonPress { at: t0 });
        fsm.check_hold(t0 + Duration::from_millis(300));
        assert_eq!(fsm.mode(), PresetSelect);

        fsm.handle(InputEvent::EncoderDelta { ring: 2, delta: 12 });
        assert_eq!(shared.read(|m| m.indicator()), None);
        fsm.handle(InputEvent::EncoderDelta { ring: 1, delta: 12 });
        let presets = |shared: &SharedModel| {
            shared.read(|m| m.layers()[0].rings.iter().map(|r| r.preset_index).collect::<Vec<_>>())
        };
        assert_eq!(presets(&shared), vec![0, 0, 0, 0]);

        fsm.handle(InputEvent::EncoderDelta { ring: 2, delta: 30 });
        assert_eq!(presets(&shared), vec![0, 0, 2, 0]);
        let style = shared.read(|m| m.layers()[0].rings[2].styles.value);
        assert_eq!(style, ValueStyle::Bipolar);

        // release forgets the partial turn on ring 1
        fsm.handle(InputEvent::ButtonRelease { at: t0 + Duration::from_millis(900) });
        fsm.handle(InputEvent::ButtonPress { at: t0 + Duration::from_secs(1) });
        fsm.check_hold(t0 + Duration::from_secs(2));
        fsm.handle(InputEvent::EncoderDelta { ring: 1, delta: 12 });
        assert_eq!(presets(&shared), vec![0, 0, 2, 0]);
    }

    #[test]
    fn release_after_a_long_hold_passes_through_preset_select() {
        let (mut fsm, _shared) = machine();
        let t0 = Instant::now();
        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 0 });
        fsm.handle(InputEvent::ButtonPress { at: t0 });
        let release = InputEvent::ButtonRelease { at: t0 + Duration::from_millis(250) };
        assert_eq!(fsm.handle(release), ValueSend);
    }

    #[test]
    fn disconnect_suspends_and_reconnect_resumes() {
        let (mut fsm, shared) = machine();
        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 1 });
        let epoch = shared.read(|m| m.render_epoch());

        assert_eq!(fsm.handle(InputEvent::DeviceDisconnected), Disconnected);
        assert!(!shared.is_online());
        assert_eq!(fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 50 }), Disconnected);
        assert_eq!(fsm.handle(InputEvent::ButtonPress { at: Instant::now() }), Disconnected);

        assert_eq!(fsm.handle(InputEvent::DeviceConnected), Ready);
        assert!(shared.is_online());
        assert!(shared.read(|m| m.render_epoch()) > epoch);
        let value = shared.read(|m| m.ring(m.active_ring(0)).unwrap().value);
        assert!((value - 0.001).abs() < 1e-12);
    }

    #[test]
    fn press_from_ready_goes_straight_to_layer_select() {
        let (mut fsm, _shared) = machine();
        assert_eq!(fsm.handle(InputEvent::ButtonPress { at: Instant::now() }), LayerSelect);
    }

    #[test]
    fn indicator_changes_request_an_immediate_redraw() {
        let (fsm, _shared) = machine();
        let (redraw_tx, redraw_rx) = crossbeam_channel::bounded::<()>(1);
        let mut fsm = fsm.with_redraw(redraw_tx);
        let t0 = Instant::now();

        fsm.handle(InputEvent::EncoderDelta { ring: 0, delta: 3 });
        assert!(redraw_rx.try_recv().is_err());

        fsm.handle(InputEvent::ButtonPress { at: t0 });
        assert!(redraw_rx.try_recv().is_ok());

        fsm.handle(InputEvent::ButtonRelease { at: t0 + Duration::from_millis(50) });
        assert!(redraw_rx.try_recv().is_ok());
    }

    #[test]
    fn accumulate_truncates_toward_zero() {
        let mut acc = 0;
        assert_eq!(accumulate(&mut acc, 45, 20), 2);
        assert_eq!(acc, 5);
        assert_eq!(accumulate(&mut acc, -30, 20), -1);
        assert_eq!(acc, -5);
    }
}
