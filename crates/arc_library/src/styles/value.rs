use std::fmt;
use std::str::FromStr;

use crate::error::ArcError;

pub const MIDI_7BIT_MAX: f64 = 127.0;
pub const MIDI_14BIT_MAX: f64 = 16383.0;

/// How encoder deltas turn into a ring value, and which range that value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueStyle {
    /// 0.0 to 1.0, clamped.
    Linear,
    /// 0.0 to 1.0, wraps around in both directions.
    Infinite,
    /// -0.5 to 0.5 with a detent at 0.0.
    Bipolar,
    /// Integer steps 0 to 127.
    Midi7Bit,
    /// Integer steps 0 to 16383.
    Midi14Bit,
}

impl ValueStyle {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            ValueStyle::Linear | ValueStyle::Infinite => (0.0, 1.0),
            ValueStyle::Bipolar => (-0.5, 0.5),
            ValueStyle::Midi7Bit => (0.0, MIDI_7BIT_MAX),
            ValueStyle::Midi14Bit => (0.0, MIDI_14BIT_MAX),
        }
    }

    pub fn is_circular(self) -> bool {
        self == ValueStyle::Infinite
    }

    /// Value a ring takes when this style is first applied to it.
    pub fn rest_value(self) -> f64 {
        match self {
            ValueStyle::Bipolar => 0.0,
            _ => self.bounds().0,
        }
    }

    /// Forces `value` into this style's range: wraps for `Infinite`, rounds and
    /// clamps for the MIDI styles, clamps otherwise.
    pub fn constrain(self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        match self {
            ValueStyle::Infinite => {
                let wrapped = lo + (value - lo).rem_euclid(hi - lo);
                // rem_euclid rounds tiny negatives up to the modulus
                if wrapped >= hi { lo } else { wrapped }
            }
            ValueStyle::Midi7Bit | ValueStyle::Midi14Bit => num::clamp(value.round(), lo, hi),
            ValueStyle::Linear | ValueStyle::Bipolar => num::clamp(value, lo, hi),
        }
    }

    /// Applies one encoder delta. Float styles scale the delta by `gain`, MIDI
    /// styles move one step per delta unit.
    pub fn apply(self, current: f64, delta: i32, gain: f64) -> f64 {
        let delta = f64::from(delta);
        match self {
            ValueStyle::Linear | ValueStyle::Infinite => self.constrain(current + delta * gain),
            ValueStyle::Bipolar => {
                let next = self.constrain(current + delta * gain);
                // crossing the centre stops on it
                if (current > 0.0 && next < 0.0) || (current < 0.0 && next > 0.0) {
                    0.0
                } else {
                    next
                }
            }
            ValueStyle::Midi7Bit | ValueStyle::Midi14Bit => self.constrain(current + delta),
        }
    }

    /// Maps a value of this style onto 0.0..=1.0.
    pub fn normalize(self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        if self.is_circular() {
            return (self.constrain(value) - lo) / (hi - lo);
        }
        num::clamp((value - lo) / (hi - lo), 0.0, 1.0)
    }

    /// Inverse of [`ValueStyle::normalize`].
    pub fn denormalize(self, norm: f64) -> f64 {
        let (lo, hi) = self.bounds();
        let norm = if self.is_circular() {
            norm.rem_euclid(1.0)
        } else {
            num::clamp(norm, 0.0, 1.0)
        };
        self.constrain(lo + norm * (hi - lo))
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueStyle::Linear => "linear",
            ValueStyle::Infinite => "infinite",
            ValueStyle::Bipolar => "bipolar",
            ValueStyle::Midi7Bit => "midi_7bit",
            ValueStyle::Midi14Bit => "midi_14bit",
        }
    }
}

impl FromStr for ValueStyle {
    type Err = ArcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ValueStyle::Linear),
            "infinite" => Ok(ValueStyle::Infinite),
            "bipolar" => Ok(ValueStyle::Bipolar),
            "midi_7bit" | "midi_7_bit" => Ok(ValueStyle::Midi7Bit),
            "midi_14bit" | "midi_14_bit" => Ok(ValueStyle::Midi14Bit),
            other => Err(ArcError::config(format!(
                "invalid value_style={other:?} (expected: \"linear\", \"infinite\", \"bipolar\", \"midi_7bit\", \"midi_14bit\")"
            ))),
        }
    }
}

impl fmt::Display for ValueStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    const STYLES: [ValueStyle; 5] = [
        ValueStyle::Linear,
        ValueStyle::Infinite,
        ValueStyle::Bipolar,
        ValueStyle::Midi7Bit,
        ValueStyle::Midi14Bit,
    ];

    #[test]
    fn apply_never_leaves_bounds() {
        let deltas = [-100_000, -1000, -64, -5, -1, 0, 1, 5, 64, 1000, 100_000];
        for style in STYLES {
            let (lo, hi) = style.bounds();
            let mut value = style.rest_value();
            for delta in deltas {
                for gain in [0.001, 0.1, 3.0] {
                    value = style.apply(value, delta, gain);
                    assert!(value >= lo && value <= hi, "{style}: {value} outside [{lo}, {hi}]");
                    if style.is_circular() {
                        assert!(value < hi, "{style}: wrapped value must stay below {hi}");
                    }
                }
            }
        }
    }

    #[test]
    fn linear_clamps_instead_of_wrapping() {
        assert_relative_eq!(ValueStyle::Linear.apply(0.999, 10, 0.001), 1.0);
        assert_relative_eq!(ValueStyle::Linear.apply(0.001, -10, 0.001), 0.0);
    }

    #[test]
    fn infinite_wraps_both_ways() {
        assert_relative_eq!(ValueStyle::Infinite.apply(0.995, 10, 0.001), 0.005, epsilon = 1e-9);
        assert_relative_eq!(ValueStyle::Infinite.apply(0.002, -5, 0.001), 0.997, epsilon = 1e-9);
    }

    #[test]
    fn bipolar_stops_on_centre_detent() {
        assert_eq!(ValueStyle::Bipolar.apply(0.003, -10, 0.001), 0.0);
        assert_eq!(ValueStyle::Bipolar.apply(-0.003, 10, 0.001), 0.0);
        assert_relative_eq!(ValueStyle::Bipolar.apply(0.0, -10, 0.001), -0.01, epsilon = 1e-12);
    }

    #[test_case(ValueStyle::Midi7Bit, 126.0, 5 => 127.0 ; "7 bit clamps high")]
    #[test_case(ValueStyle::Midi7Bit, 3.0, -5 => 0.0 ; "7 bit clamps low")]
    #[test_case(ValueStyle::Midi14Bit, 8192.0, 1 => 8193.0 ; "14 bit steps by one")]
    #[test_case(ValueStyle::Midi14Bit, 16380.0, 10 => 16383.0 ; "14 bit clamps high")]
    fn midi_styles_step_in_integers(style: ValueStyle, current: f64, delta: i32) -> f64 {
        style.apply(current, delta, 0.001)
    }

    #[test]
    fn normalize_round_trips_through_denormalize() {
        for style in STYLES {
            for norm in [0.0, 0.25, 0.5, 0.75] {
                let value = style.denormalize(norm);
                let back = style.normalize(value);
                let step = 1.0 / (style.bounds().1 - style.bounds().0);
                assert!(
                    (back - norm).abs() <= step.max(1e-9),
                    "{style}: {norm} -> {value} -> {back}"
                );
            }
        }
    }

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("Linear".parse::<ValueStyle>().unwrap(), ValueStyle::Linear);
        assert_eq!(" midi_7_bit ".parse::<ValueStyle>().unwrap(), ValueStyle::Midi7Bit);
        assert_eq!("midi_14bit".parse::<ValueStyle>().unwrap(), ValueStyle::Midi14Bit);
        assert!(matches!("log".parse::<ValueStyle>(), Err(ArcError::Configuration(_))));
    }
}
