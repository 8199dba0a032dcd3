use std::time::Duration;

use serde::Deserialize;

use crate::error::{ArcError, Result};
use crate::midi::Resolution;
use crate::styles::{Easing, LedRing, Preset, StyleSet};

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    pub num_layers: usize,
    pub rings_per_layer: usize,
    pub leds_per_ring: usize,
    /// Rate of the modulation, render and send loops.
    pub ticks_per_second: u32,
    /// Brightness ceiling on the hardware's 0-15 scale.
    pub max_brightness: u8,
    /// Seconds the button must stay down in layer select to reach preset select.
    pub long_press_duration: f64,
    /// Accumulated encoder delta needed for one layer or preset step.
    pub preset_select_threshold: u32,
    /// Value change per encoder delta unit for the float value styles.
    pub value_gain: f64,
    /// LFO frequency change per encoder delta unit while a ring is modulated.
    pub lfo_frequency_gain: f64,
    pub default_lfo_frequency: f64,
    /// Base seed for `random_ease`; every ring derives its own from it.
    pub lfo_seed: u64,
    /// Valid values: "linear", "in_out_quad", "in_out_cubic", "in_out_sine".
    pub easing: String,
    pub presets: Vec<PresetSettings>,
    /// Preset name per ring position, applied to every layer at start.
    /// Empty means the first preset everywhere.
    pub ring_presets: Vec<String>,
    /// Run the LED chase when the device first shows up.
    pub self_test: bool,
    pub midi: MidiSettings,
    pub osc: OscSettings,
    pub device: DeviceSettings,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PresetSettings {
    pub name: String,
    pub value_style: String,
    pub led_style: String,
    pub lfo_style: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MidiSettings {
    pub enabled: bool,
    pub client_name: String,
    pub port_name: String,
    /// 0-based MIDI channel.
    pub channel: u8,
    pub cc_base: u8,
    /// If true, every layer gets its own CC block and all layers are sent.
    /// Otherwise CC numbers repeat per layer and only the active layer is sent.
    pub global_numbering: bool,
    /// Encoding for the float value styles. Valid values: "7bit", "14bit".
    pub float_resolution: String,
    /// Extra attempts for a failed write before it is dropped.
    pub retries: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OscSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub prefix: String,
    /// Changes smaller than this are not re-sent.
    pub quantum: f64,
    pub retries: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DeviceSettings {
    /// Local UDP port the device and serialosc talk back to.
    pub listen_port: u16,
    pub serialosc_port: u16,
    /// Fixed device port. 0 waits for serialosc to announce one.
    pub device_port: u16,
    pub prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_layers: 4,
            rings_per_layer: 4,
            leds_per_ring: 64,
            ticks_per_second: 60,
            max_brightness: 10,
            long_press_duration: 0.2,
            preset_select_threshold: 20,
            value_gain: 0.001,
            lfo_frequency_gain: 0.0005,
            default_lfo_frequency: 0.5,
            lfo_seed: 0,
            easing: "in_out_sine".to_string(),
            presets: vec![
                PresetSettings::new("linear", "linear", "potentiometer", "static"),
                PresetSettings::new("endless", "infinite", "dot", "static"),
                PresetSettings::new("bipolar", "bipolar", "bipolar", "static"),
                PresetSettings::new("midi_7bit", "midi_7bit", "potentiometer", "static"),
                PresetSettings::new("midi_14bit", "midi_14bit", "potentiometer", "static"),
                PresetSettings::new("perlin", "linear", "perlin", "perlin"),
                PresetSettings::new("drift", "linear", "dot", "random_ease"),
                PresetSettings::new("sine", "linear", "potentiometer", "sine"),
            ],
            ring_presets: Vec::new(),
            self_test: true,
            midi: MidiSettings::default(),
            osc: OscSettings::default(),
            device: DeviceSettings::default(),
        }
    }
}

impl PresetSettings {
    pub fn new(name: &str, value_style: &str, led_style: &str, lfo_style: &str) -> Self {
        Self {
            name: name.to_string(),
            value_style: value_style.to_string(),
            led_style: led_style.to_string(),
            lfo_style: lfo_style.to_string(),
        }
    }

    fn resolve(&self) -> Result<Preset> {
        if self.name.trim().is_empty() {
            return Err(ArcError::config("preset name must not be empty"));
        }
        Ok(Preset {
            name: self.name.clone(),
            styles: StyleSet {
                value: self.value_style.parse()?,
                led: self.led_style.parse()?,
                lfo: self.lfo_style.parse()?,
            },
        })
    }
}

impl Default for PresetSettings {
    fn default() -> Self {
        Self::new("linear", "linear", "potentiometer", "static")
    }
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_name: "Arc Controller".to_string(),
            port_name: "Arc Controller MIDI Out".to_string(),
            channel: 0,
            cc_base: 1,
            global_numbering: false,
            float_resolution: "7bit".to_string(),
            retries: 2,
        }
    }
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 9000,
            prefix: "/arc".to_string(),
            quantum: 0.001,
            retries: 0,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            listen_port: 17_842,
            serialosc_port: 12_002,
            device_port: 0,
            prefix: "/monome".to_string(),
        }
    }
}

pub(crate) fn parse_resolution(s: &str) -> Result<Resolution> {
    match s.trim().to_ascii_lowercase().as_str() {
        "7bit" | "7" => Ok(Resolution::SevenBit),
        "14bit" | "14" => Ok(Resolution::FourteenBit),
        other => Err(ArcError::config(format!(
            "invalid float_resolution={other:?} (expected: \"7bit\", \"14bit\")"
        ))),
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.num_layers == 0 {
            return Err(ArcError::config("num_layers must be at least 1"));
        }

        if self.rings_per_layer == 0 {
            return Err(ArcError::config("rings_per_layer must be at least 1"));
        }

        if self.leds_per_ring == 0 {
            return Err(ArcError::config("leds_per_ring must be at least 1"));
        }

        if !(1..=1000).contains(&self.ticks_per_second) {
            return Err(ArcError::config(format!(
                "ticks_per_second must be 1 to 1000 (found {})",
                self.ticks_per_second
            )));
        }

        if self.max_brightness > 15 {
            return Err(ArcError::config(format!(
                "max_brightness must be 0 to 15 (found {})",
                self.max_brightness
            )));
        }

        if !(self.long_press_duration.is_finite() && self.long_press_duration > 0.0) {
            return Err(ArcError::config("long_press_duration must be positive"));
        }

        if self.preset_select_threshold == 0 {
            return Err(ArcError::config("preset_select_threshold must be at least 1"));
        }

        for (name, gain) in [
            ("value_gain", self.value_gain),
            ("lfo_frequency_gain", self.lfo_frequency_gain),
        ] {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(ArcError::config(format!("{name} must be positive")));
            }
        }

        if !(0.0..=1.0).contains(&self.default_lfo_frequency) {
            return Err(ArcError::config("default_lfo_frequency must be 0.0 to 1.0"));
        }

        self.easing()?;
        let presets = self.resolve_presets()?;
        self.ring_preset_indices(&presets)?;

        self.midi.validate(self.cc_span())?;
        self.osc.validate()?;

        if self.device.prefix.is_empty() || !self.device.prefix.starts_with('/') {
            return Err(ArcError::config("device prefix must start with '/'"));
        }

        Ok(())
    }

    pub fn easing(&self) -> Result<Easing> {
        self.easing.parse()
    }

    pub fn resolve_presets(&self) -> Result<Vec<Preset>> {
        if self.presets.is_empty() {
            return Err(ArcError::config("at least one preset is required"));
        }
        let presets = self
            .presets
            .iter()
            .map(PresetSettings::resolve)
            .collect::<Result<Vec<_>>>()?;
        for (i, preset) in presets.iter().enumerate() {
            if presets[..i].iter().any(|p| p.name == preset.name) {
                return Err(ArcError::config(format!("duplicate preset name {:?}", preset.name)));
            }
        }
        Ok(presets)
    }

    /// Starting preset index for each ring position.
    pub fn ring_preset_indices(&self, presets: &[Preset]) -> Result<Vec<usize>> {
        if self.ring_presets.is_empty() {
            return Ok(vec![0; self.rings_per_layer]);
        }
        let found = self.ring_presets.len();
        if found != self.rings_per_layer {
            return Err(ArcError::config(format!(
                "ring_presets must name one preset per ring ({} expected, found {found})",
                self.rings_per_layer
            )));
        }
        self.ring_presets
            .iter()
            .map(|name| {
                presets
                    .iter()
                    .position(|p| p.name == name.trim())
                    .ok_or_else(|| {
                        ArcError::config(format!("ring_presets names unknown preset {name:?}"))
                    })
            })
            .collect()
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.ticks_per_second.max(1)))
    }

    pub fn long_press(&self) -> Duration {
        Duration::from_secs_f64(self.long_press_duration)
    }

    pub fn led_ring(&self) -> LedRing {
        LedRing {
            leds: self.leds_per_ring,
            max_brightness: self.max_brightness,
        }
    }

    // Number of consecutive CC numbers the configured layout occupies.
    fn cc_span(&self) -> usize {
        if self.midi.global_numbering {
            self.num_layers * self.rings_per_layer
        } else {
            self.rings_per_layer
        }
    }
}

impl MidiSettings {
    pub fn resolution(&self) -> Result<Resolution> {
        parse_resolution(&self.float_resolution)
    }

    fn validate(&self, cc_span: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.client_name.is_empty() {
            return Err(ArcError::config("MIDI client name must not be empty"));
        }

        if self.port_name.is_empty() {
            return Err(ArcError::config("MIDI port name must not be empty"));
        }

        if self.channel > 15 {
            return Err(ArcError::config(format!(
                "MIDI channel must be 0 to 15 (found {})",
                self.channel
            )));
        }

        self.resolution()?;

        // 14-bit pairs put the LSB 32 numbers above the MSB
        let last = usize::from(self.cc_base) + cc_span - 1;
        if last + 32 > 127 {
            return Err(ArcError::config(format!(
                "CC numbers {}..={last} leave no room for 14-bit LSB partners (+32) below 128",
                self.cc_base
            )));
        }

        Ok(())
    }
}

impl OscSettings {
    fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(ArcError::config("OSC host must not be empty"));
        }

        if self.port == 0 {
            return Err(ArcError::config("OSC port must not be 0"));
        }

        if !self.prefix.starts_with('/') {
            return Err(ArcError::config(format!(
                "OSC prefix must start with '/' (found {:?})",
                self.prefix
            )));
        }

        if !self.quantum.is_finite() || self.quantum < 0.0 {
            return Err(ArcError::config("OSC quantum must not be negative"));
        }

        Ok(())
    }
}
