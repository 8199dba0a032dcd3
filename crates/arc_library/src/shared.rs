use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::model::{Indicator, Model, RingState};

/// Consistent copy of one layer taken under a single lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub layer: usize,
    pub rings: Vec<RingState>,
    pub indicator: Option<Indicator>,
    pub render_epoch: u64,
}

/// Handle to the one model every thread works on.
///
/// All reads and writes go through a closure run under the lock, so a reader
/// never sees a value apart from the styles that give it meaning.
#[derive(Debug, Clone)]
pub struct SharedModel {
    model: Arc<Mutex<Model>>,
    online: Arc<AtomicBool>,
}

impl SharedModel {
    pub fn new(model: Model) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(|poisoned| {
            warn!("model lock poisoned by a panicked writer, continuing");
            poisoned.into_inner()
        })
    }

    pub fn read<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        f(&self.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Model) -> R) -> R {
        f(&mut self.lock())
    }

    /// Like [`SharedModel::read`], but `None` while offline. The flag is
    /// checked under the same lock `f` runs under.
    pub fn read_online<R>(&self, f: impl FnOnce(&Model) -> R) -> Option<R> {
        let model = self.lock();
        self.is_online().then(|| f(&model))
    }

    pub fn update_online<R>(&self, f: impl FnOnce(&mut Model) -> R) -> Option<R> {
        let mut model = self.lock();
        self.is_online().then(|| f(&mut model))
    }

    /// False while the device is away. Services skip their writes.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Waits for any critical section in progress, so once this returns no
    /// `*_online` access sees the old state.
    pub fn set_online(&self, online: bool) {
        let _model = self.lock();
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn active_snapshot(&self) -> LayerSnapshot {
        self.read(LayerSnapshot::active)
    }

    pub fn layers_snapshot(&self) -> Vec<LayerSnapshot> {
        self.read(LayerSnapshot::all)
    }
}

impl LayerSnapshot {
    pub fn of(model: &Model, layer: usize) -> Self {
        Self {
            layer,
            rings: model.layers().get(layer).map(|l| l.rings.clone()).unwrap_or_default(),
            indicator: model.indicator(),
            render_epoch: model.render_epoch(),
        }
    }

    pub fn active(model: &Model) -> Self {
        Self::of(model, model.active_layer())
    }

    pub fn all(model: &Model) -> Vec<Self> {
        (0..model.num_layers()).map(|layer| Self::of(model, layer)).collect()
    }
}
