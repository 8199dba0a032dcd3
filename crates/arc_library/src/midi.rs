//! Mapping of ring values onto MIDI control change numbers.

use crate::styles::ValueStyle;
use crate::styles::value::{MIDI_7BIT_MAX, MIDI_14BIT_MAX};

/// Offset of the LSB controller in a 14-bit CC pair.
pub const LSB_OFFSET: u8 = 32;

/// Encoding used for values of the float styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    SevenBit,
    FourteenBit,
}

/// One logical control change. A 14-bit value goes out as two CC messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Cc7 { channel: u8, cc: u8, value: u8 },
    Cc14 { channel: u8, cc: u8, value: u16 },
}

impl ControlMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            ControlMessage::Cc7 { channel, .. } | ControlMessage::Cc14 { channel, .. } => channel,
        }
    }

    pub fn cc(&self) -> u8 {
        match *self {
            ControlMessage::Cc7 { cc, .. } | ControlMessage::Cc14 { cc, .. } => cc,
        }
    }

    pub fn value(&self) -> u16 {
        match *self {
            ControlMessage::Cc7 { value, .. } => u16::from(value),
            ControlMessage::Cc14 { value, .. } => value,
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            ControlMessage::Cc7 { .. } => Resolution::SevenBit,
            ControlMessage::Cc14 { .. } => Resolution::FourteenBit,
        }
    }

    /// `(controller, value)` pairs in wire order: MSB first, then LSB on `cc + 32`.
    pub fn controller_values(&self) -> Vec<(u8, u8)> {
        match *self {
            ControlMessage::Cc7 { cc, value, .. } => vec![(cc, value.min(0x7F))],
            ControlMessage::Cc14 { cc, value, .. } => {
                let (msb, lsb) = split_14bit(value);
                vec![(cc, msb), (cc.saturating_add(LSB_OFFSET), lsb)]
            }
        }
    }
}

pub fn split_14bit(value: u16) -> (u8, u8) {
    let value = value.min(0x3FFF);
    (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
}

pub fn join_14bit(msb: u8, lsb: u8) -> u16 {
    (u16::from(msb & 0x7F) << 7) | u16::from(lsb & 0x7F)
}

impl Resolution {
    pub fn max(self) -> f64 {
        match self {
            Resolution::SevenBit => MIDI_7BIT_MAX,
            Resolution::FourteenBit => MIDI_14BIT_MAX,
        }
    }
}

/// Unrounded position of a ring value on the controller scale it is sent
/// with. The MIDI styles carry their own resolution; the float styles use
/// `float_resolution`.
pub fn scale(value: f64, style: ValueStyle, float_resolution: Resolution) -> (Resolution, f64) {
    let resolution = match style {
        ValueStyle::Midi7Bit => Resolution::SevenBit,
        ValueStyle::Midi14Bit => Resolution::FourteenBit,
        _ => float_resolution,
    };
    let max = resolution.max();
    (resolution, num::clamp(style.normalize(value) * max, 0.0, max))
}

/// Encodes a ring value for its style, rounded to the nearest step.
pub fn encode(
    channel: u8,
    cc: u8,
    value: f64,
    style: ValueStyle,
    float_resolution: Resolution,
) -> ControlMessage {
    match scale(value, style, float_resolution) {
        (Resolution::SevenBit, units) => ControlMessage::Cc7 {
            channel,
            cc,
            value: units.round() as u8,
        },
        (Resolution::FourteenBit, units) => ControlMessage::Cc14 {
            channel,
            cc,
            value: units.round() as u16,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0 ; "bottom")]
    #[test_case(8192 ; "midpoint")]
    #[test_case(16383 ; "top")]
    fn fourteen_bit_round_trip(value: u16) {
        let (msb, lsb) = split_14bit(value);
        assert!(msb <= 0x7F && lsb <= 0x7F);
        assert_eq!(join_14bit(msb, lsb), value);
    }

    #[test]
    fn midpoint_splits_into_64_and_0() {
        assert_eq!(split_14bit(8192), (64, 0));
    }

    #[test]
    fn fourteen_bit_style_passes_its_integer_through() {
        let msg = encode(0, 5, 8192.0, ValueStyle::Midi14Bit, Resolution::SevenBit);
        assert_eq!(msg, ControlMessage::Cc14 { channel: 0, cc: 5, value: 8192 });
        assert_eq!(msg.controller_values(), vec![(5, 64), (37, 0)]);
    }

    #[test]
    fn seven_bit_style_passes_its_integer_through() {
        let msg = encode(2, 1, 100.0, ValueStyle::Midi7Bit, Resolution::FourteenBit);
        assert_eq!(msg, ControlMessage::Cc7 { channel: 2, cc: 1, value: 100 });
    }

    #[test_case(ValueStyle::Linear, 1.0 => 127 ; "linear top")]
    #[test_case(ValueStyle::Linear, 0.5 => 64 ; "linear half")]
    #[test_case(ValueStyle::Bipolar, 0.0 => 64 ; "bipolar centre")]
    #[test_case(ValueStyle::Bipolar, -0.5 => 0 ; "bipolar bottom")]
    fn float_styles_scale_to_seven_bit(style: ValueStyle, value: f64) -> u8 {
        match encode(0, 1, value, style, Resolution::SevenBit) {
            ControlMessage::Cc7 { value, .. } => value,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scale_keeps_the_fraction() {
        let (resolution, units) = scale(0.5, ValueStyle::Linear, Resolution::SevenBit);
        assert_eq!(resolution, Resolution::SevenBit);
        assert!((units - 63.5).abs() < 1e-9);
        assert_eq!(scale(2.0, ValueStyle::Linear, Resolution::SevenBit).1, 127.0);
    }

    #[test]
    fn float_styles_can_use_fourteen_bit() {
        let msg = encode(0, 1, 1.0, ValueStyle::Linear, Resolution::FourteenBit);
        assert_eq!(msg, ControlMessage::Cc14 { channel: 0, cc: 1, value: 16383 });
    }
}
