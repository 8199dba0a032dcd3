use std::time::Duration;

use tracing::warn;

use super::Service;
use crate::error::{ArcError, Result};
use crate::model::RingState;
use crate::shared::SharedModel;
use crate::styles::Easing;

/// Advances the LFO of every modulated ring on every layer.
pub struct ModulationEngine {
    model: SharedModel,
}

impl ModulationEngine {
    pub fn new(model: SharedModel) -> Self {
        Self { model }
    }
}

impl Service for ModulationEngine {
    const NAME: &'static str = "modulation";

    fn tick(&mut self, elapsed: Duration) -> usize {
        let dt = elapsed.as_secs_f64();

        // one lock for the whole pass: readers never see a half-advanced layer
        let writes = self.model.update_online(|model| {
            let easing = model.tuning().easing;
            let mut writes = 0;
            for ring in model.rings_mut() {
                match advance(ring, dt, easing) {
                    Ok(true) => writes += 1,
                    Ok(false) => {}
                    Err(e) => warn!(layer = ring.address.layer, ring = ring.address.ring, "{e}"),
                }
            }
            writes
        });
        writes.unwrap_or(0)
    }
}

// Ok(false) for rings that are not modulated. On error the ring is untouched.
fn advance(ring: &mut RingState, dt: f64, easing: Easing) -> Result<bool> {
    let advanced = ring.styles.lfo.advance(ring.lfo, dt, ring.lfo_frequency, easing);
    let Some((state, norm)) = advanced else {
        return Ok(false);
    };
    if !norm.is_finite() || !state.phase.is_finite() {
        return Err(ArcError::StrategyComputation {
            layer: ring.address.layer,
            ring: ring.address.ring,
            reason: format!("{} produced {norm}", ring.styles.lfo),
        });
    }
    ring.apply_modulation(norm, state)?;
    Ok(true)
}
