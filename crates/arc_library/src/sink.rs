//! Output channels for LED frames and control messages.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::{ArcError, Result};

/// Somewhere messages of type `M` can be written to.
pub trait Sink<M>: Send {
    fn send(&mut self, msg: M) -> Result<()>;
}

pub type BoxSink<M> = Box<dyn Sink<M>>;

impl<M, S: Sink<M> + ?Sized> Sink<M> for Box<S> {
    fn send(&mut self, msg: M) -> Result<()> {
        (**self).send(msg)
    }
}

/// In-memory sink that keeps every message. Clones share the same buffer.
#[derive(Debug)]
pub struct Recorder<M> {
    messages: Arc<Mutex<Vec<M>>>,
}

impl<M> Clone for Recorder<M> {
    fn clone(&self) -> Self {
        Self {
            messages: Arc::clone(&self.messages),
        }
    }
}

impl<M> Default for Recorder<M> {
    fn default() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<M: Clone> Recorder<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<M> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl<M: Send> Sink<M> for Recorder<M> {
    fn send(&mut self, msg: M) -> Result<()> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).push(msg);
        Ok(())
    }
}

/// Moves a blocking sink onto its own thread behind a bounded queue.
///
/// `send` never blocks: a full queue rejects the message. The worker retries a
/// failed write `retries` more times and then drops it.
pub struct QueuedSink<M> {
    name: &'static str,
    tx: Option<Sender<M>>,
    worker: Option<JoinHandle<()>>,
}

impl<M: Clone + Send + 'static> QueuedSink<M> {
    pub fn spawn<S>(name: &'static str, mut inner: S, capacity: usize, retries: u32) -> Result<Self>
    where
        S: Sink<M> + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded::<M>(capacity.max(1));
        let worker = thread::Builder::new()
            .name(format!("{name}-sink"))
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    deliver(name, &mut inner, msg, retries);
                }
                debug!(sink = name, "sink worker stopped");
            })?;
        Ok(Self {
            name,
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

fn deliver<M: Clone, S: Sink<M>>(name: &'static str, inner: &mut S, msg: M, retries: u32) {
    let mut attempt = 0;
    loop {
        match inner.send(msg.clone()) {
            Ok(()) => return,
            Err(e) if attempt < retries => {
                attempt += 1;
                debug!(sink = name, attempt, "retrying write: {e}");
            }
            Err(e) => {
                warn!(sink = name, "dropping message after {} attempts: {e}", attempt + 1);
                return;
            }
        }
    }
}

impl<M: Send> Sink<M> for QueuedSink<M> {
    fn send(&mut self, msg: M) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(ArcError::sink(self.name, "closed"));
        };
        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ArcError::sink(self.name, "queue full")),
            Err(TrySendError::Disconnected(_)) => Err(ArcError::sink(self.name, "worker gone")),
        }
    }
}

impl<M> Drop for QueuedSink<M> {
    fn drop(&mut self) {
        // closing the queue lets the worker drain what is left and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(sink = self.name, "sink worker panicked");
            }
        }
    }
}
