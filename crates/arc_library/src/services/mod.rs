//! Fixed-rate workers that share the model with the input consumer.

mod modulation;
mod renderer;
mod sender;

pub use modulation::ModulationEngine;
pub use renderer::{LedUpdate, Renderer};
pub use sender::{ControlSender, OscControl};

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use tracing::debug;

use crate::error::Result;

/// One periodic job. `tick` does a full unit of work and returns how many
/// writes it made.
pub trait Service: Send + 'static {
    const NAME: &'static str;

    fn tick(&mut self, elapsed: Duration) -> usize;
}

/// Runs `service` on its own thread every `period` until `stop` is closed.
/// A message on `wake` runs an extra tick straight away. Stops only between
/// ticks; the service is handed back on join.
pub fn spawn_periodic<S: Service>(
    mut service: S,
    period: Duration,
    stop: Receiver<()>,
    wake: Receiver<()>,
) -> Result<JoinHandle<S>> {
    let ticker = crossbeam_channel::tick(period);
    let handle = thread::Builder::new().name(S::NAME.to_string()).spawn(move || {
        let mut last = Instant::now();
        let mut wake = Some(wake);
        loop {
            let woken = wake.clone().unwrap_or_else(crossbeam_channel::never);
            select! {
                recv(ticker) -> now => {
                    let now = now.unwrap_or_else(|_| Instant::now());
                    service.tick(now.saturating_duration_since(last));
                    last = now;
                }
                recv(woken) -> msg => match msg {
                    Ok(()) => {
                        let now = Instant::now();
                        service.tick(now.saturating_duration_since(last));
                        last = now;
                    }
                    Err(_) => wake = None,
                },
                recv(stop) -> _ => break,
            }
        }
        debug!(service = S::NAME, "stopped");
        service
    })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    impl Service for Counter {
        const NAME: &'static str = "counter";

        fn tick(&mut self, _elapsed: Duration) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    #[test]
    fn runs_until_stop_is_dropped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let counter = Counter(Arc::clone(&ticks));
        let period = Duration::from_millis(2);
        let handle = spawn_periodic(counter, period, stop_rx, crossbeam_channel::never()).unwrap();
        thread::sleep(Duration::from_millis(50));
        drop(stop_tx);
        let service = handle.join().unwrap();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(service.0.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn wake_ticks_ahead_of_the_period() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let counter = Counter(Arc::clone(&ticks));
        let handle = spawn_periodic(counter, Duration::from_secs(60), stop_rx, wake_rx).unwrap();

        wake_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        // a closed wake channel is not mistaken for a stream of wake ups
        drop(wake_tx);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        drop(stop_tx);
        handle.join().unwrap();
    }
}
