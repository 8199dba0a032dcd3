use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use super::easing::Easing;
use super::noise::perlin1;
use crate::error::ArcError;

/// Swing of every waveform around the centre of the value range.
pub const AMPLITUDE: f64 = 0.5;

/// Lowest frequency used when timing `random_ease` segments.
const MIN_SEGMENT_FREQUENCY: f64 = 0.01;

/// Perlin phase is folded back once it grows this large.
pub(crate) const PHASE_LIMIT: f64 = 1e4;

/// Waveform that modulates a ring's value over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LfoStyle {
    /// No modulation; the ring is driven by the encoder.
    Static,
    Sine,
    Saw,
    Square,
    Triangle,
    /// Coherent noise of the phase.
    Perlin,
    /// Random targets reached through an easing curve.
    RandomEase,
}

/// Per-ring oscillator state. Plain data, threaded through
/// [`LfoStyle::advance`] explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoState {
    pub phase: f64,
    /// Seed for the next `random_ease` roll.
    pub seed: u64,
    /// Seed of the perlin noise field.
    pub noise_seed: u32,
    pub segment: Segment,
}

/// One `random_ease` glide, in normalised value units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: f64,
    pub to: f64,
    pub elapsed: f64,
    pub duration: f64,
}

impl LfoState {
    pub fn new(seed: u64, noise_seed: u32, start: f64) -> Self {
        Self {
            phase: 0.0,
            seed,
            noise_seed,
            segment: Segment {
                from: start,
                to: start,
                elapsed: 0.0,
                duration: 0.0,
            },
        }
    }
}

impl LfoStyle {
    pub fn is_active(self) -> bool {
        self != LfoStyle::Static
    }

    /// Advances `state` by `elapsed` seconds at `frequency` cycles per second and
    /// returns the new state with a normalised output in 0.0..=1.0.
    ///
    /// `Static` returns `None`: it never writes a value.
    pub fn advance(
        self,
        state: LfoState,
        elapsed: f64,
        frequency: f64,
        easing: Easing,
    ) -> Option<(LfoState, f64)> {
        let mut next = state;
        let wave = match self {
            LfoStyle::Static => return None,
            LfoStyle::Sine | LfoStyle::Saw | LfoStyle::Square | LfoStyle::Triangle => {
                next.phase = (state.phase + frequency * elapsed).rem_euclid(1.0);
                periodic(self, next.phase)
            }
            LfoStyle::Perlin => {
                next.phase = state.phase + frequency * elapsed;
                if next.phase > PHASE_LIMIT {
                    next.phase -= PHASE_LIMIT;
                }
                perlin1(next.phase, state.noise_seed)
            }
            LfoStyle::RandomEase => {
                next.phase = (state.phase + frequency * elapsed).rem_euclid(1.0);
                let (segment, seed, norm) =
                    ease(state.segment, state.seed, elapsed, frequency, easing);
                next.segment = segment;
                next.seed = seed;
                return Some((next, norm));
            }
        };
        Some((next, 0.5 + AMPLITUDE * wave))
    }

    pub fn name(self) -> &'static str {
        match self {
            LfoStyle::Static => "static",
            LfoStyle::Sine => "sine",
            LfoStyle::Saw => "saw",
            LfoStyle::Square => "square",
            LfoStyle::Triangle => "triangle",
            LfoStyle::Perlin => "perlin",
            LfoStyle::RandomEase => "random_ease",
        }
    }
}

fn periodic(style: LfoStyle, phase: f64) -> f64 {
    match style {
        LfoStyle::Sine => (TAU * phase).sin(),
        LfoStyle::Saw => 2.0 * phase - 1.0,
        LfoStyle::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        LfoStyle::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        _ => 0.0,
    }
}

fn ease(
    segment: Segment,
    seed: u64,
    elapsed: f64,
    frequency: f64,
    easing: Easing,
) -> (Segment, u64, f64) {
    let mut segment = Segment {
        elapsed: segment.elapsed + elapsed,
        ..segment
    };
    let mut seed = seed;

    if segment.duration <= 0.0 || segment.elapsed >= segment.duration {
        let mut rng = StdRng::seed_from_u64(seed);
        let cycles = rng.gen_range(0.5..=2.0);
        segment = Segment {
            from: segment.to,
            to: rng.gen_range(0.0..=1.0),
            elapsed: 0.0,
            duration: cycles / frequency.max(MIN_SEGMENT_FREQUENCY),
        };
        seed = rng.next_u64();
    }

    let t = segment.elapsed / segment.duration;
    let norm = segment.from + (segment.to - segment.from) * easing.apply(t);
    (segment, seed, norm)
}

impl FromStr for LfoStyle {
    type Err = ArcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(LfoStyle::Static),
            "sine" => Ok(LfoStyle::Sine),
            "saw" => Ok(LfoStyle::Saw),
            "square" => Ok(LfoStyle::Square),
            "triangle" => Ok(LfoStyle::Triangle),
            "perlin" => Ok(LfoStyle::Perlin),
            "random_ease" => Ok(LfoStyle::RandomEase),
            other => Err(ArcError::config(format!(
                "invalid lfo_style={other:?} (expected: \"static\", \"sine\", \"saw\", \"square\", \"triangle\", \"perlin\", \"random_ease\")"
            ))),
        }
    }
}

impl fmt::Display for LfoStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
