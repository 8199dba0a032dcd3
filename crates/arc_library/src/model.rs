use std::sync::Arc;

use num::Integer;
use tracing::{debug, info};

use crate::error::{ArcError, Result};
use crate::settings::Settings;
use crate::styles::lfo::PHASE_LIMIT;
use crate::styles::{Easing, LedRing, LfoState, Preset, StyleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAddress {
    pub layer: usize,
    pub ring: usize,
}

/// Which side is allowed to write a ring's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    /// Encoder input in value send mode.
    Input,
    /// The modulation engine.
    Modulation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingState {
    pub address: RingAddress,
    pub value: f64,
    pub cc_number: u8,
    pub preset_index: usize,
    pub styles: StyleSet,
    /// Oscillation speed in 0.0..=1.0 cycles per second.
    pub lfo_frequency: f64,
    pub lfo: LfoState,
}

impl RingState {
    /// Ownership follows the LFO style: a static ring belongs to the input
    /// side, anything else to the modulation engine. There is no third state.
    pub fn writer(&self) -> Writer {
        if self.styles.lfo.is_active() {
            Writer::Modulation
        } else {
            Writer::Input
        }
    }

    pub fn normalized(&self) -> f64 {
        self.styles.value.normalize(self.value)
    }

    /// Moves the value by one encoder delta. A perlin LED pattern scrolls
    /// with the value, since no LFO advances its phase.
    pub fn apply_input_delta(&mut self, delta: i32, gain: f64) -> Result<f64> {
        self.check_writer(Writer::Input)?;
        let before = self.normalized();
        self.value = self.styles.value.apply(self.value, delta, gain);
        let travel = self.styles.led.scroll(before, self.normalized());
        if travel > 0.0 {
            self.lfo.phase = (self.lfo.phase + travel).rem_euclid(PHASE_LIMIT);
        }
        Ok(self.value)
    }

    /// Writes an LFO output given in normalised units.
    pub fn apply_modulation(&mut self, norm: f64, state: LfoState) -> Result<f64> {
        self.check_writer(Writer::Modulation)?;
        self.value = self.styles.value.denormalize(norm);
        self.lfo = state;
        Ok(self.value)
    }

    pub fn adjust_frequency(&mut self, delta: i32, gain: f64) -> f64 {
        self.lfo_frequency = num::clamp(self.lfo_frequency + f64::from(delta) * gain, 0.0, 1.0);
        self.lfo_frequency
    }

    /// Switches the ring to another preset. The value is carried over in
    /// normalised units, except that bipolar presets start on their centre.
    pub fn set_preset(&mut self, index: usize, preset: &Preset) {
        let norm = self.normalized();
        let value = preset.styles.value;
        self.value = if value == crate::styles::ValueStyle::Bipolar {
            value.rest_value()
        } else {
            value.denormalize(norm)
        };
        self.preset_index = index;
        self.styles = preset.styles;
        self.lfo = LfoState::new(self.lfo.seed, self.lfo.noise_seed, value.normalize(self.value));
    }

    fn check_writer(&self, writer: Writer) -> Result<()> {
        if self.writer() == writer {
            Ok(())
        } else {
            Err(ArcError::ExclusiveWrite {
                layer: self.address.layer,
                ring: self.address.ring,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    pub rings: Vec<RingState>,
}

/// Transient mode feedback drawn instead of the ring values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Light the ring whose position matches the layer index.
    Layer(usize),
}

/// Tuning shared by every ring, fixed at start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub value_gain: f64,
    pub lfo_frequency_gain: f64,
    pub easing: Easing,
    pub led_ring: LedRing,
}

#[derive(Debug, Clone)]
pub struct Model {
    layers: Vec<LayerState>,
    active_layer: usize,
    presets: Arc<[Preset]>,
    indicator: Option<Indicator>,
    render_epoch: u64,
    tuning: Tuning,
}

impl Model {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let presets = settings.resolve_presets()?;
        let starting = settings.ring_preset_indices(&presets)?;
        let rings = settings.rings_per_layer;

        let layers = (0..settings.num_layers)
            .map(|layer| {
                (0..rings)
                    .map(|ring| -> Result<RingState> {
                        let flat = layer * rings + ring;
                        let cc = if settings.midi.global_numbering {
                            usize::from(settings.midi.cc_base) + flat
                        } else {
                            usize::from(settings.midi.cc_base) + ring
                        };
                        let cc_number = u8::try_from(cc).map_err(|_| {
                            ArcError::config(format!("CC number {cc} is out of range"))
                        })?;
                        let preset_index = starting[ring];
                        let styles = presets[preset_index].styles;
                        let value = styles.value.rest_value();
                        Ok(RingState {
                            address: RingAddress { layer, ring },
                            value,
                            cc_number,
                            preset_index,
                            styles,
                            lfo_frequency: settings.default_lfo_frequency,
                            lfo: LfoState::new(
                                settings.lfo_seed.wrapping_add(flat as u64),
                                u32::from(cc_number) * 10,
                                styles.value.normalize(value),
                            ),
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|rings| LayerState { rings })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layers,
            active_layer: 0,
            presets: presets.into(),
            indicator: None,
            render_epoch: 0,
            tuning: Tuning {
                value_gain: settings.value_gain,
                lfo_frequency_gain: settings.lfo_frequency_gain,
                easing: settings.easing()?,
                led_ring: settings.led_ring(),
            },
        })
    }

    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn rings_per_layer(&self) -> usize {
        self.layers.first().map_or(0, |l| l.rings.len())
    }

    pub fn active_layer(&self) -> usize {
        self.active_layer
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn ring(&self, address: RingAddress) -> Option<&RingState> {
        self.layers.get(address.layer)?.rings.get(address.ring)
    }

    pub fn ring_mut(&mut self, address: RingAddress) -> Option<&mut RingState> {
        self.layers.get_mut(address.layer)?.rings.get_mut(address.ring)
    }

    pub fn rings_mut(&mut self) -> impl Iterator<Item = &mut RingState> {
        self.layers.iter_mut().flat_map(|l| l.rings.iter_mut())
    }

    pub fn active_ring(&self, ring: usize) -> RingAddress {
        RingAddress {
            layer: self.active_layer,
            ring,
        }
    }

    pub fn indicator(&self) -> Option<Indicator> {
        self.indicator
    }

    pub fn set_indicator(&mut self, indicator: Option<Indicator>) {
        self.indicator = indicator;
    }

    /// Bumped whenever the renderer must forget what it last drew.
    pub fn render_epoch(&self) -> u64 {
        self.render_epoch
    }

    pub fn request_redraw(&mut self) {
        self.render_epoch = self.render_epoch.wrapping_add(1);
    }

    /// Routes an encoder delta on the active layer: the value of an input
    /// owned ring, or the LFO frequency of a modulated one.
    pub fn on_delta(&mut self, ring: usize, delta: i32) -> Result<()> {
        let tuning = self.tuning;
        let address = self.active_ring(ring);
        let Some(state) = self.ring_mut(address) else {
            debug!(ring, "delta for unknown ring ignored");
            return Ok(());
        };
        match state.writer() {
            Writer::Input => {
                let value = state.apply_input_delta(delta, tuning.value_gain)?;
                debug!(layer = address.layer, ring, value, "value");
            }
            Writer::Modulation => {
                let frequency = state.adjust_frequency(delta, tuning.lfo_frequency_gain);
                debug!(layer = address.layer, ring, frequency, "lfo frequency");
            }
        }
        Ok(())
    }

    pub fn cycle_layer(&mut self, steps: i64) -> usize {
        let count = self.layers.len() as i64;
        if count == 0 {
            return 0;
        }
        let next = (self.active_layer as i64 + steps).mod_floor(&count) as usize;
        info!(from = self.active_layer, to = next, "layer");
        self.active_layer = next;
        next
    }

    pub fn cycle_preset(&mut self, address: RingAddress, steps: i64) -> Option<usize> {
        let count = self.presets.len() as i64;
        let presets = Arc::clone(&self.presets);
        let state = self.ring_mut(address)?;
        if count == 0 {
            return None;
        }
        let next = (state.preset_index as i64 + steps).mod_floor(&count) as usize;
        state.set_preset(next, &presets[next]);
        info!(
            layer = address.layer,
            ring = address.ring,
            preset = %presets[next].name,
            "preset"
        );
        Some(next)
    }
}
