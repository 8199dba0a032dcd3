use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::Service;
use crate::error::Result;
use crate::midi::{self, ControlMessage, Resolution};
use crate::model::{RingAddress, RingState};
use crate::settings::Settings;
use crate::shared::{LayerSnapshot, SharedModel};
use crate::sink::{BoxSink, Sink};

/// Fraction of a step a value must pass the last sent step's rounding edge by
/// before the CC is sent again.
const HYSTERESIS: f64 = 0.1;

/// A float value for one OSC address.
#[derive(Debug, Clone, PartialEq)]
pub struct OscControl {
    pub address: String,
    pub value: f32,
}

/// Turns ring values into MIDI and OSC messages, skipping anything that has
/// not moved past the resolution of the last message sent for it.
pub struct ControlSender {
    model: SharedModel,
    midi: Option<BoxSink<ControlMessage>>,
    osc: Option<BoxSink<OscControl>>,
    channel: u8,
    resolution: Resolution,
    global_numbering: bool,
    osc_prefix: String,
    quantum: f64,
    sent_midi: HashMap<u8, ControlMessage>,
    sent_osc: HashMap<RingAddress, f64>,
}

impl ControlSender {
    pub fn new(
        model: SharedModel,
        settings: &Settings,
        midi: Option<BoxSink<ControlMessage>>,
        osc: Option<BoxSink<OscControl>>,
    ) -> Result<Self> {
        let mut sender = Self {
            model,
            midi,
            osc,
            channel: settings.midi.channel,
            resolution: settings.midi.resolution()?,
            global_numbering: settings.midi.global_numbering,
            osc_prefix: settings.osc.prefix.trim_end_matches('/').to_string(),
            quantum: settings.osc.quantum,
            sent_midi: HashMap::new(),
            sent_osc: HashMap::new(),
        };
        sender.prime();
        Ok(sender)
    }

    /// Marks the current values as already sent.
    pub fn prime(&mut self) {
        for snapshot in self.model.layers_snapshot() {
            for ring in &snapshot.rings {
                self.sent_osc.insert(ring.address, ring.value);
            }
        }
        let sent = if self.global_numbering {
            self.model.layers_snapshot()
        } else {
            vec![self.model.active_snapshot()]
        };
        for snapshot in sent {
            for ring in &snapshot.rings {
                let msg = self.encode(ring);
                self.sent_midi.insert(ring.cc_number, msg);
            }
        }
    }

    pub fn osc_address(&self, address: RingAddress) -> String {
        format!("{}/layer/{}/ring/{}/value", self.osc_prefix, address.layer, address.ring)
    }

    fn encode(&self, ring: &RingState) -> ControlMessage {
        midi::encode(self.channel, ring.cc_number, ring.value, ring.styles.value, self.resolution)
    }

    // The layers whose rings are sent, or `None` while offline.
    fn snapshots(&self) -> Option<Vec<LayerSnapshot>> {
        let global = self.global_numbering;
        self.model.read_online(|m| {
            if global {
                LayerSnapshot::all(m)
            } else {
                vec![LayerSnapshot::active(m)]
            }
        })
    }

    // A value hovering on a rounding edge must not flip the CC back and forth.
    fn midi_due(&self, ring: &RingState) -> bool {
        let Some(last) = self.sent_midi.get(&ring.cc_number) else {
            return true;
        };
        let (resolution, units) = midi::scale(ring.value, ring.styles.value, self.resolution);
        resolution != last.resolution()
            || (units - f64::from(last.value())).abs() >= 0.5 + HYSTERESIS
    }

    fn send_midi(&mut self, ring: &RingState) -> usize {
        if self.midi.is_none() || !self.midi_due(ring) {
            return 0;
        }
        let msg = self.encode(ring);
        let Some(sink) = self.midi.as_mut() else {
            return 0;
        };
        match sink.send(msg) {
            Ok(()) => {
                debug!(cc = ring.cc_number, ?msg, "midi");
                self.sent_midi.insert(ring.cc_number, msg);
                1
            }
            Err(e) => {
                warn!(cc = ring.cc_number, "{e}");
                0
            }
        }
    }

    fn send_osc(&mut self, ring: &RingState) -> usize {
        if self.osc.is_none() {
            return 0;
        }
        if let Some(last) = self.sent_osc.get(&ring.address) {
            if (ring.value - last).abs() <= self.quantum {
                return 0;
            }
        }
        let msg = OscControl {
            address: self.osc_address(ring.address),
            value: ring.value as f32,
        };
        let Some(sink) = self.osc.as_mut() else {
            return 0;
        };
        match sink.send(msg) {
            Ok(()) => {
                debug!(
                    layer = ring.address.layer,
                    ring = ring.address.ring,
                    value = ring.value,
                    "osc"
                );
                self.sent_osc.insert(ring.address, ring.value);
                1
            }
            Err(e) => {
                warn!(layer = ring.address.layer, ring = ring.address.ring, "{e}");
                0
            }
        }
    }
}

impl Service for ControlSender {
    const NAME: &'static str = "sender";

    fn tick(&mut self, _elapsed: Duration) -> usize {
        let Some(snapshots) = self.snapshots() else {
            return 0;
        };
        let mut sent = 0;
        for snapshot in snapshots {
            for ring in &snapshot.rings {
                sent += self.send_midi(ring);
                sent += self.send_osc(ring);
            }
        }
        sent
    }
}
