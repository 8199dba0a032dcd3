//! Per-ring behaviours picked by name from the configuration.

pub mod easing;
pub mod led;
pub mod lfo;
pub mod noise;
pub mod value;

pub use easing::Easing;
pub use led::{LedRing, LedStyle};
pub use lfo::{LfoState, LfoStyle};
pub use value::ValueStyle;

/// The three strategies that together define how one ring behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleSet {
    pub value: ValueStyle,
    pub led: LedStyle,
    pub lfo: LfoStyle,
}

impl Default for StyleSet {
    fn default() -> Self {
        Self {
            value: ValueStyle::Linear,
            led: LedStyle::Potentiometer,
            lfo: LfoStyle::Static,
        }
    }
}

/// A named [`StyleSet`], resolved once when settings are loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub styles: StyleSet,
}
