use std::time::Instant;

/// Input from the device, consumed strictly in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    EncoderDelta { ring: usize, delta: i32 },
    ButtonPress { at: Instant },
    ButtonRelease { at: Instant },
    DeviceConnected,
    DeviceDisconnected,
}

/// Event kinds as seen by the mode transition table. `LongPress` is never
/// received from the device; it is raised once a press outlives the hold time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Delta,
    Press,
    Release,
    LongPress,
    Connect,
    Disconnect,
}

impl InputEvent {
    pub fn trigger(&self) -> Trigger {
        match self {
            InputEvent::EncoderDelta { .. } => Trigger::Delta,
            InputEvent::ButtonPress { .. } => Trigger::Press,
            InputEvent::ButtonRelease { .. } => Trigger::Release,
            InputEvent::DeviceConnected => Trigger::Connect,
            InputEvent::DeviceDisconnected => Trigger::Disconnect,
        }
    }
}
