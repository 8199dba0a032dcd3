use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, never, select};
use tracing::{info, warn};

use crate::error::Result;
use crate::event::InputEvent;
use crate::midi::ControlMessage;
use crate::mode::{Mode, ModeMachine};
use crate::services::{
    ControlSender, LedUpdate, ModulationEngine, OscControl, Renderer, spawn_periodic,
};
use crate::settings::Settings;
use crate::shared::SharedModel;
use crate::sink::BoxSink;

/// Where the runtime's output goes.
pub struct Sinks {
    pub leds: BoxSink<Vec<LedUpdate>>,
    pub midi: Option<BoxSink<ControlMessage>>,
    pub osc: Option<BoxSink<OscControl>>,
}

/// The input consumer plus the three periodic services.
pub struct Runtime {
    model: SharedModel,
    machine: ModeMachine,
    stop: Option<Sender<()>>,
    modulation: Option<JoinHandle<ModulationEngine>>,
    renderer: Option<JoinHandle<Renderer>>,
    sender: Option<JoinHandle<ControlSender>>,
}

impl Runtime {
    pub fn start(settings: &Settings, model: SharedModel, sinks: Sinks) -> Result<Self> {
        let period = settings.tick_period();
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let (redraw, redraws) = crossbeam_channel::bounded::<()>(1);

        let sender = ControlSender::new(model.clone(), settings, sinks.midi, sinks.osc)?;
        let modulation = ModulationEngine::new(model.clone());
        let renderer = Renderer::new(model.clone(), sinks.leds);
        let modulation = spawn_periodic(modulation, period, stopped.clone(), never())?;
        let renderer = spawn_periodic(renderer, period, stopped.clone(), redraws)?;
        let sender = spawn_periodic(sender, period, stopped, never())?;
        info!(ticks_per_second = settings.ticks_per_second, "services started");

        Ok(Self {
            machine: ModeMachine::new(model.clone(), settings).with_redraw(redraw),
            model,
            stop: Some(stop),
            modulation: Some(modulation),
            renderer: Some(renderer),
            sender: Some(sender),
        })
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn dispatch(&mut self, event: InputEvent) -> Mode {
        self.machine.handle(event)
    }

    /// Consumes input events in order until the event channel closes or
    /// `quit` fires. Long presses are detected at their deadline without polling.
    pub fn run_input(&mut self, events: &Receiver<InputEvent>, quit: &Receiver<()>) {
        loop {
            let hold = match self.machine.hold_deadline() {
                Some(deadline) => crossbeam_channel::at(deadline),
                None => never(),
            };
            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        self.dispatch(event);
                    }
                    Err(_) => {
                        info!("input closed");
                        break;
                    }
                },
                recv(quit) -> _ => {
                    info!("quit requested");
                    break;
                }
                recv(hold) -> now => {
                    self.machine.check_hold(now.unwrap_or_else(|_| Instant::now()));
                }
            }
        }
    }

    /// Stops the services between ticks, then turns the LEDs off.
    pub fn shutdown(mut self) {
        self.stop.take();

        if let Some(handle) = self.modulation.take() {
            join("modulation", handle);
        }
        if let Some(handle) = self.sender.take() {
            join("sender", handle);
        }
        if let Some(handle) = self.renderer.take() {
            if let Some(mut renderer) = join("renderer", handle) {
                renderer.blank();
            }
        }
        info!("services stopped");
    }
}

fn join<S>(name: &str, handle: JoinHandle<S>) -> Option<S> {
    match handle.join() {
        Ok(service) => Some(service),
        Err(_) => {
            warn!(service = name, "service thread panicked");
            None
        }
    }
}
