mod device;
mod sinks;

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use arc_library::midi::ControlMessage;
use arc_library::runtime::{Runtime, Sinks};
use arc_library::services::{LedUpdate, OscControl};
use arc_library::sink::{BoxSink, QueuedSink};
use arc_library::{ArcError, InputEvent, Model, Result, Settings, SharedModel};
use clap::Parser;
use config::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::device::Device;
use crate::self_test::self_test;
use crate::sinks::{MidiPort, OscPort};

const DISCOVERY_WAIT: Duration = Duration::from_secs(1);
const LED_QUEUE: usize = 64;
const CONTROL_QUEUE: usize = 1024;

#[derive(Parser, Debug)]
#[clap(
    name = "Arc encoder controller",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Args {
    #[clap(short, long, help = "Config file (see example_config.toml)")]
    config: Option<String>,

    #[clap(long, conflicts_with = "no_midi", help = "Enable MIDI output regardless of the config")]
    midi: bool,

    #[clap(long, help = "Disable MIDI output")]
    no_midi: bool,

    #[clap(long, conflicts_with = "no_osc", help = "Enable OSC output regardless of the config")]
    osc: bool,

    #[clap(long, help = "Disable OSC output")]
    no_osc: bool,

    #[clap(long, help = "Skip the LED chase at start")]
    skip_self_test: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut cfg = Config::builder();

    if let Some(config_fn) = &args.config {
        cfg = cfg.add_source(config::File::with_name(config_fn.as_str()));
    }

    let cfg = cfg
        .build()
        .map_err(|e| ArcError::config(format!("can't read settings: {e}")))?;
    let mut settings: Settings = cfg
        .try_deserialize()
        .map_err(|e| ArcError::config(format!("can't parse settings: {e}")))?;

    if args.midi {
        settings.midi.enabled = true;
    } else if args.no_midi {
        settings.midi.enabled = false;
    }
    if args.osc {
        settings.osc.enabled = true;
    } else if args.no_osc {
        settings.osc.enabled = false;
    }
    if args.skip_self_test {
        settings.self_test = false;
    }

    settings.validate()?;
    Ok(settings)
}

fn open_outputs(settings: &Settings, leds: device::LedWriter) -> Result<Sinks> {
    let leds: BoxSink<Vec<LedUpdate>> =
        Box::new(QueuedSink::spawn("leds", leds, LED_QUEUE, 0)?);

    let midi: Option<BoxSink<ControlMessage>> = if settings.midi.enabled {
        let port = MidiPort::open(&settings.midi)?;
        let queued = QueuedSink::spawn("midi", port, CONTROL_QUEUE, settings.midi.retries)?;
        Some(Box::new(queued))
    } else {
        None
    };

    let osc: Option<BoxSink<OscControl>> = if settings.osc.enabled {
        let port = OscPort::open(&settings.osc)?;
        let queued = QueuedSink::spawn("osc", port, CONTROL_QUEUE, settings.osc.retries)?;
        Some(Box::new(queued))
    } else {
        None
    };

    Ok(Sinks { leds, midi, osc })
}

// Typing `q` (or `quit`) and enter stops the controller.
fn spawn_quit_listener(quit: crossbeam_channel::Sender<()>) -> Result<()> {
    thread::Builder::new().name("quit".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if matches!(line.trim(), "q" | "quit") {
                let _ = quit.send(());
                break;
            }
        }
    })?;
    Ok(())
}

fn run(settings: Settings) -> Result<()> {
    let model = SharedModel::new(Model::from_settings(&settings)?);

    let device = Device::open(&settings.device, DISCOVERY_WAIT)?;
    let connected = device.is_connected();

    if settings.self_test && connected {
        let mut leds = device.led_writer()?;
        if let Err(e) = self_test(&mut leds, settings.rings_per_layer, settings.led_ring()) {
            warn!("self test failed: {e}");
        }
    }

    let sinks = open_outputs(&settings, device.led_writer()?)?;
    let mut runtime = Runtime::start(&settings, model, sinks)?;
    if !connected {
        runtime.dispatch(InputEvent::DeviceDisconnected);
    }

    let running = Arc::new(AtomicBool::new(true));
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let reader = device.spawn_reader(events_tx, Arc::clone(&running))?;

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    spawn_quit_listener(quit_tx.clone())?;

    info!(mode = %runtime.mode(), "controller running, type q to quit");
    runtime.run_input(&events_rx, &quit_rx);
    drop(quit_tx);

    running.store(false, Ordering::SeqCst);
    if reader.join().is_err() {
        warn!("input thread panicked");
    }
    runtime.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };

    info!(?settings, "running with settings");

    if let Err(e) = run(settings) {
        error!("{e}");
        return Err(e);
    }
    Ok(())
}
