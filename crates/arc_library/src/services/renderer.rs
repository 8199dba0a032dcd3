use std::time::Duration;

use tracing::{debug, warn};

use super::Service;
use crate::model::Indicator;
use crate::shared::{LayerSnapshot, SharedModel};
use crate::sink::{BoxSink, Sink};
use crate::styles::LedRing;

/// One LED position that changed since the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedUpdate {
    pub ring: usize,
    pub position: usize,
    pub brightness: u8,
}

/// Draws the active layer and sends only the positions that changed.
pub struct Renderer {
    model: SharedModel,
    sink: BoxSink<Vec<LedUpdate>>,
    led_ring: LedRing,
    // last brightness sent per ring and position; None forces a write
    cache: Vec<Vec<Option<u8>>>,
    // layer and render epoch the cache belongs to
    drawn: Option<(usize, u64)>,
}

impl Renderer {
    pub fn new(model: SharedModel, sink: BoxSink<Vec<LedUpdate>>) -> Self {
        let led_ring = model.read(|m| m.tuning().led_ring);
        Self {
            model,
            sink,
            led_ring,
            cache: Vec::new(),
            drawn: None,
        }
    }

    fn reset_cache(&mut self, rings: usize) {
        self.cache = vec![vec![None; self.led_ring.leds]; rings];
    }

    fn frame(&self, snapshot: &LayerSnapshot) -> Vec<Vec<u8>> {
        let ring = self.led_ring;
        match snapshot.indicator {
            Some(Indicator::Layer(layer)) => {
                let lit = layer % snapshot.rings.len().max(1);
                (0..snapshot.rings.len())
                    .map(|i| vec![if i == lit { ring.max_brightness } else { 0 }; ring.leds])
                    .collect()
            }
            None => snapshot
                .rings
                .iter()
                .map(|r| r.styles.led.render(ring, r.normalized(), r.lfo.phase, r.lfo.noise_seed))
                .collect(),
        }
    }

    /// Turns every LED off regardless of the cache.
    pub fn blank(&mut self) -> usize {
        let rings = self.model.read(|m| m.rings_per_layer());
        let leds = self.led_ring.leds;
        let updates: Vec<LedUpdate> = (0..rings)
            .flat_map(|ring| {
                (0..leds).map(move |position| LedUpdate {
                    ring,
                    position,
                    brightness: 0,
                })
            })
            .collect();
        let count = updates.len();
        match self.sink.send(updates) {
            Ok(()) => {
                self.cache = vec![vec![Some(0); leds]; rings];
                count
            }
            Err(e) => {
                warn!("blanking LEDs failed: {e}");
                self.drawn = None;
                0
            }
        }
    }
}

impl Service for Renderer {
    const NAME: &'static str = "renderer";

    fn tick(&mut self, _elapsed: Duration) -> usize {
        let Some(snapshot) = self.model.read_online(LayerSnapshot::active) else {
            return 0;
        };
        let key = (snapshot.layer, snapshot.render_epoch);
        if self.drawn != Some(key) || self.cache.len() != snapshot.rings.len() {
            debug!(layer = snapshot.layer, epoch = snapshot.render_epoch, "full redraw");
            self.reset_cache(snapshot.rings.len());
            self.drawn = Some(key);
        }

        let max = self.led_ring.max_brightness;
        let mut updates = Vec::new();
        for (ring, levels) in self.frame(&snapshot).into_iter().enumerate() {
            for (position, level) in levels.into_iter().enumerate() {
                let brightness = level.min(max);
                let Some(cached) = self.cache.get_mut(ring).and_then(|c| c.get_mut(position)) else {
                    continue;
                };
                if *cached != Some(brightness) {
                    *cached = Some(brightness);
                    updates.push(LedUpdate {
                        ring,
                        position,
                        brightness,
                    });
                }
            }
        }

        if updates.is_empty() {
            return 0;
        }
        let count = updates.len();
        match self.sink.send(updates) {
            Ok(()) => count,
            Err(e) => {
                // nothing is known about what the device shows now
                warn!("LED frame dropped: {e}");
                self.drawn = None;
                0
            }
        }
    }
}
