use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use super::noise::perlin2;
use crate::error::ArcError;

/// Physical shape of one LED ring: number of positions and brightness ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedRing {
    pub leds: usize,
    pub max_brightness: u8,
}

impl LedRing {
    fn blank(self) -> Vec<u8> {
        vec![0; self.leds]
    }

    fn level(self, brightness: f64) -> u8 {
        num::clamp(brightness.round(), 0.0, f64::from(self.max_brightness)) as u8
    }

    // Positions on a 64-LED ring scaled to this ring's size.
    fn scaled(self, position_on_64: usize) -> usize {
        position_on_64 * self.leds / 64
    }
}

/// How a normalised ring value is drawn onto the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedStyle {
    /// Filled arc from lower left, clockwise to lower right.
    Potentiometer,
    /// A single point, split across the two nearest LEDs.
    Dot,
    /// Band growing from the top, direction given by the sign.
    Bipolar,
    /// Noise field sampled around the ring, animated by the LFO phase.
    Perlin,
}

const PHI: f64 = 1.618_033_988_749_895;

impl LedStyle {
    /// Brightness per position for `norm` in 0.0..=1.0. `phase` and `seed` only
    /// matter to [`LedStyle::Perlin`].
    pub fn render(self, ring: LedRing, norm: f64, phase: f64, seed: u32) -> Vec<u8> {
        if ring.leds == 0 {
            return Vec::new();
        }
        let norm = if norm.is_finite() { num::clamp(norm, 0.0, 1.0) } else { 0.0 };
        match self {
            LedStyle::Potentiometer => potentiometer(ring, norm),
            LedStyle::Dot => dot(ring, norm),
            LedStyle::Bipolar => bipolar(ring, norm),
            LedStyle::Perlin => perlin(ring, norm, phase, seed),
        }
    }

    /// How far the noise field travels when the value moves from `before` to
    /// `after`. Only [`LedStyle::Perlin`] travels, faster at higher values.
    pub fn scroll(self, before: f64, after: f64) -> f64 {
        const SPEED: f64 = 0.1;
        const STEP: f64 = 0.01;
        if self != LedStyle::Perlin || before == after {
            return 0.0;
        }
        after * SPEED + STEP
    }

    pub fn name(self) -> &'static str {
        match self {
            LedStyle::Potentiometer => "potentiometer",
            LedStyle::Dot => "dot",
            LedStyle::Bipolar => "bipolar",
            LedStyle::Perlin => "perlin",
        }
    }
}

fn potentiometer(ring: LedRing, norm: f64) -> Vec<u8> {
    let mut levels = ring.blank();
    let start = ring.scaled(40);
    let end = ring.scaled(24);
    let arc: Vec<usize> = (0..ring.leds)
        .map(|i| (start + i) % ring.leds)
        .take_while(|&i| i != (end + 1) % ring.leds)
        .collect();
    if arc.is_empty() {
        return levels;
    }

    let pos = norm * (arc.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let lead = if pos > lower as f64 { lower + 1 } else { lower };

    if lead == 0 {
        levels[arc[0]] = ring.level(1.0);
        return levels;
    }

    // graded from 1 at the origin to full at the tip
    let max = f64::from(ring.max_brightness);
    for (step, &led) in arc.iter().take(lead + 1).enumerate() {
        let brightness = 1.0 + (max - 1.0) * step as f64 / lead as f64;
        levels[led] = ring.level(brightness);
    }
    levels
}

fn dot(ring: LedRing, norm: f64) -> Vec<u8> {
    let mut levels = ring.blank();
    let n = ring.leds as f64;
    let pos = (norm * n).rem_euclid(n);
    let lower = (pos.floor() as usize) % ring.leds;
    let upper = (lower + 1) % ring.leds;
    let frac = pos - pos.floor();

    let max = f64::from(ring.max_brightness);
    levels[lower] = ring.level((1.0 - frac) * max);
    levels[upper] = levels[upper].max(ring.level(frac * max));
    levels
}

fn bipolar(ring: LedRing, norm: f64) -> Vec<u8> {
    let mut levels = ring.blank();
    let dim = (ring.max_brightness / 4).max(1).min(ring.max_brightness);
    let span = ring.scaled(21);

    levels[0] = ring.max_brightness;
    levels[span % ring.leds] = dim;
    levels[ring.scaled(43) % ring.leds] = dim;

    let centred = norm - 0.5;
    let steps = (centred.abs() * span as f64 * 2.0).round() as usize;
    for step in 1..=steps.min(span) {
        let led = if centred > 0.0 {
            step % ring.leds
        } else {
            (ring.leds - step % ring.leds) % ring.leds
        };
        levels[led] = dim;
    }
    levels
}

fn perlin(ring: LedRing, norm: f64, phase: f64, seed: u32) -> Vec<u8> {
    const RADIUS_MIN: f64 = PHI / 2.0;
    const RADIUS_SCALE: f64 = 5.0;
    const Y_DRIFT: f64 = 0.3;
    const GAIN: f64 = 2.0;
    const OFFSET: f64 = 0.5;

    let radius = RADIUS_MIN + norm * RADIUS_SCALE;
    let phase = if phase.is_finite() { phase } else { 0.0 };
    let max = f64::from(ring.max_brightness);

    (0..ring.leds)
        .map(|i| {
            let angle = TAU * i as f64 / ring.leds as f64;
            let nx = radius * angle.cos() + phase;
            let ny = radius * angle.sin() + Y_DRIFT * phase;
            let n = perlin2(nx, ny, seed);
            ring.level(((n * GAIN + OFFSET) * max).floor())
        })
        .collect()
}

impl FromStr for LedStyle {
    type Err = ArcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "potentiometer" => Ok(LedStyle::Potentiometer),
            "dot" => Ok(LedStyle::Dot),
            "bipolar" => Ok(LedStyle::Bipolar),
            "perlin" => Ok(LedStyle::Perlin),
            other => Err(ArcError::config(format!(
                "invalid led_style={other:?} (expected: \"potentiometer\", \"dot\", \"bipolar\", \"perlin\")"
            ))),
        }
    }
}

impl fmt::Display for LedStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
