use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::ArcError;

/// Curve used by the `random_ease` LFO to glide between targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Easing {
    Linear,
    InOutQuad,
    InOutCubic,
    #[default]
    InOutSine,
}

impl Easing {
    /// Maps progress `t` in 0.0..=1.0 to eased progress in 0.0..=1.0.
    pub fn apply(self, t: f64) -> f64 {
        let t = num::clamp(t, 0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::InOutQuad => "in_out_quad",
            Easing::InOutCubic => "in_out_cubic",
            Easing::InOutSine => "in_out_sine",
        }
    }
}

impl FromStr for Easing {
    type Err = ArcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Easing::Linear),
            "in_out_quad" => Ok(Easing::InOutQuad),
            "in_out_cubic" => Ok(Easing::InOutCubic),
            "in_out_sine" => Ok(Easing::InOutSine),
            other => Err(ArcError::config(format!(
                "invalid easing={other:?} (expected: \"linear\", \"in_out_quad\", \"in_out_cubic\", \"in_out_sine\")"
            ))),
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
