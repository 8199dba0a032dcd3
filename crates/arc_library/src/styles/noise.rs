//! Seeded gradient noise used by the `perlin` LED and LFO styles.
//!
//! Lattice gradients come from an integer hash of the cell coordinates and the
//! seed, so the same `(x, seed)` always yields the same output with no shared
//! table or global generator.

use std::f64::consts::FRAC_PI_4;

fn hash(x: i64, y: i64, seed: u32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x27d4_eb2d)
        ^ (y as u32).wrapping_mul(0x1656_67b1)
        ^ seed.wrapping_mul(0x9e37_79b9);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn gradient1(h: u32) -> f64 {
    f64::from(h) / f64::from(u32::MAX) * 2.0 - 1.0
}

fn gradient2(h: u32) -> (f64, f64) {
    let angle = f64::from(h & 7) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// One-dimensional noise in -1.0..=1.0. Zero on every integer `x`.
pub fn perlin1(x: f64, seed: u32) -> f64 {
    let x0 = x.floor();
    let t = x - x0;
    let i = x0 as i64;

    let n0 = gradient1(hash(i, 0, seed)) * t;
    let n1 = gradient1(hash(i + 1, 0, seed)) * (t - 1.0);

    num::clamp(lerp(n0, n1, fade(t)) * 2.0, -1.0, 1.0)
}

/// Two-dimensional noise in -1.0..=1.0.
pub fn perlin2(x: f64, y: f64, seed: u32) -> f64 {
    let (x0, y0) = (x.floor(), y.floor());
    let (tx, ty) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);

    let corner = |cx: i64, cy: i64, dx: f64, dy: f64| {
        let (gx, gy) = gradient2(hash(ix + cx, iy + cy, seed));
        gx * dx + gy * dy
    };

    let (u, v) = (fade(tx), fade(ty));
    let bottom = lerp(corner(0, 0, tx, ty), corner(1, 0, tx - 1.0, ty), u);
    let top = lerp(corner(0, 1, tx, ty - 1.0), corner(1, 1, tx - 1.0, ty - 1.0), u);

    num::clamp(lerp(bottom, top, v) * std::f64::consts::SQRT_2, -1.0, 1.0)
}
