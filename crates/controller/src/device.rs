//! UDP bridge to an arc through serialosc.
//!
//! serialosc announces devices on its own port; each device then gets a port of
//! its own that accepts `/sys/*` configuration and `{prefix}/ring/*` LED
//! messages, and reports `{prefix}/enc/*` input back to our listen port.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_library::services::LedUpdate;
use arc_library::settings::DeviceSettings;
use arc_library::sink::Sink;
use arc_library::{ArcError, InputEvent, Result};
use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};
use tracing::{debug, info, warn};

const HOST: &str = "127.0.0.1";
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// What a single packet from serialosc or the device means to us.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Input(InputEvent),
    /// serialosc reported a device listening on this port.
    Found(u16),
    /// serialosc reported a device going away.
    Removed(u16),
}

pub struct Device {
    socket: UdpSocket,
    serialosc: SocketAddr,
    device_port: Arc<AtomicU16>,
    prefix: String,
    listen_port: u16,
}

impl Device {
    /// Binds the listen port and looks for a device for up to `wait`.
    pub fn open(settings: &DeviceSettings, wait: Duration) -> Result<Self> {
        let socket = UdpSocket::bind((HOST, settings.listen_port))?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let listen_port = socket.local_addr()?.port();
        let device = Self {
            socket,
            serialosc: SocketAddr::from(([127, 0, 0, 1], settings.serialosc_port)),
            device_port: Arc::new(AtomicU16::new(0)),
            prefix: settings.prefix.trim_end_matches('/').to_string(),
            listen_port,
        };

        if settings.device_port != 0 {
            device.attach(settings.device_port)?;
            return Ok(device);
        }

        device.ask_serialosc("/serialosc/list")?;
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; rosc::decoder::MTU];
        while Instant::now() < deadline {
            let Some(packet) = device.receive(&mut buf)? else {
                continue;
            };
            for notice in decode(&packet, &device.prefix, Instant::now()) {
                if let Notice::Found(port) = notice {
                    device.attach(port)?;
                    return Ok(device);
                }
            }
        }
        warn!(serialosc = %device.serialosc, "no arc found yet, waiting for serialosc");
        Ok(device)
    }

    pub fn is_connected(&self) -> bool {
        self.device_port.load(Ordering::SeqCst) != 0
    }

    /// A writer for LED updates sharing this device's socket and port.
    pub fn led_writer(&self) -> Result<LedWriter> {
        Ok(LedWriter {
            socket: self.socket.try_clone()?,
            device_port: Arc::clone(&self.device_port),
            prefix: self.prefix.clone(),
        })
    }

    /// Reads packets until `running` is cleared or the event receiver is gone.
    pub fn spawn_reader(
        self,
        events: Sender<InputEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new().name("arc-input".to_string()).spawn(move || {
            if let Err(e) = self.ask_serialosc("/serialosc/notify") {
                warn!("serialosc notify failed: {e}");
            }
            let mut buf = [0u8; rosc::decoder::MTU];
            while running.load(Ordering::SeqCst) {
                let packet = match self.receive(&mut buf) {
                    Ok(Some(packet)) => packet,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("device read failed: {e}");
                        continue;
                    }
                };
                for notice in decode(&packet, &self.prefix, Instant::now()) {
                    let event = match self.apply(notice) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("{e}");
                            continue;
                        }
                    };
                    if events.send(event).is_err() {
                        debug!("input receiver gone");
                        return;
                    }
                }
            }
        })?;
        Ok(handle)
    }

    fn apply(&self, notice: Notice) -> Result<Option<InputEvent>> {
        match notice {
            Notice::Input(event) => Ok(Some(event)),
            Notice::Found(port) => {
                // serialosc notifications are one-shot
                self.ask_serialosc("/serialosc/notify")?;
                if self.device_port.load(Ordering::SeqCst) == port {
                    return Ok(None);
                }
                self.attach(port)?;
                Ok(Some(InputEvent::DeviceConnected))
            }
            Notice::Removed(port) => {
                self.ask_serialosc("/serialosc/notify")?;
                if self.device_port.load(Ordering::SeqCst) != port {
                    return Ok(None);
                }
                self.device_port.store(0, Ordering::SeqCst);
                info!(port, "arc removed");
                Ok(Some(InputEvent::DeviceDisconnected))
            }
        }
    }

    /// Points the device at our listen port and prefix.
    fn attach(&self, port: u16) -> Result<()> {
        let target = SocketAddr::from(([127, 0, 0, 1], port));
        send(&self.socket, target, "/sys/port", vec![OscType::Int(i32::from(self.listen_port))])?;
        send(&self.socket, target, "/sys/host", vec![OscType::String(HOST.to_string())])?;
        send(&self.socket, target, "/sys/prefix", vec![OscType::String(self.prefix.clone())])?;
        self.device_port.store(port, Ordering::SeqCst);
        info!(port, prefix = %self.prefix, "arc attached");
        Ok(())
    }

    fn ask_serialosc(&self, addr: &str) -> Result<()> {
        let args = vec![
            OscType::String(HOST.to_string()),
            OscType::Int(i32::from(self.listen_port)),
        ];
        send(&self.socket, self.serialosc, addr, args)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<OscPacket>> {
        match self.socket.recv(buf) {
            Ok(n) => match rosc::decoder::decode_udp(&buf[..n]) {
                Ok((_, packet)) => Ok(Some(packet)),
                Err(e) => {
                    debug!("undecodable packet: {e}");
                    Ok(None)
                }
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Sends ring levels to the attached device.
///
/// A complete ring goes out as one `/ring/map`; partial updates as `/ring/set`.
pub struct LedWriter {
    socket: UdpSocket,
    device_port: Arc<AtomicU16>,
    prefix: String,
}

impl Sink<Vec<LedUpdate>> for LedWriter {
    fn send(&mut self, updates: Vec<LedUpdate>) -> Result<()> {
        let port = self.device_port.load(Ordering::SeqCst);
        if port == 0 {
            return Err(ArcError::sink("leds", "no device attached"));
        }
        let target = SocketAddr::from(([127, 0, 0, 1], port));
        for (addr, args) in led_messages(&self.prefix, &updates) {
            send(&self.socket, target, &addr, args).map_err(|e| ArcError::sink("leds", e))?;
        }
        Ok(())
    }
}

/// Groups updates per ring, using `/ring/map` when all 64 positions are present.
fn led_messages(prefix: &str, updates: &[LedUpdate]) -> Vec<(String, Vec<OscType>)> {
    const MAP_SIZE: usize = 64;
    let rings = updates.iter().map(|u| u.ring + 1).max().unwrap_or(0);
    let mut messages = Vec::new();
    for ring in 0..rings {
        let mut levels: [Option<u8>; MAP_SIZE] = [None; MAP_SIZE];
        let mut partial = Vec::new();
        for u in updates.iter().filter(|u| u.ring == ring) {
            match levels.get_mut(u.position) {
                Some(slot) => *slot = Some(u.brightness),
                None => partial.push(*u),
            }
        }
        if levels.iter().all(Option::is_some) {
            let mut args = vec![OscType::Int(ring as i32)];
            args.extend(levels.iter().map(|l| OscType::Int(i32::from(l.unwrap_or(0)))));
            messages.push((format!("{prefix}/ring/map"), args));
        } else {
            partial.extend(levels.iter().enumerate().filter_map(|(position, l)| {
                l.map(|brightness| LedUpdate {
                    ring,
                    position,
                    brightness,
                })
            }));
        }
        for u in partial {
            messages.push((
                format!("{prefix}/ring/set"),
                vec![
                    OscType::Int(u.ring as i32),
                    OscType::Int(u.position as i32),
                    OscType::Int(i32::from(u.brightness)),
                ],
            ));
        }
    }
    messages
}

fn send(socket: &UdpSocket, target: SocketAddr, addr: &str, args: Vec<OscType>) -> Result<()> {
    let msg = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let buf = rosc::encoder::encode(&msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    socket.send_to(&buf, target)?;
    Ok(())
}

/// Interprets one packet. Unknown addresses are ignored.
pub fn decode(packet: &OscPacket, prefix: &str, now: Instant) -> Vec<Notice> {
    match packet {
        OscPacket::Bundle(bundle) => {
            bundle.content.iter().flat_map(|p| decode(p, prefix, now)).collect()
        }
        OscPacket::Message(msg) => decode_message(msg, prefix, now).into_iter().collect(),
    }
}

fn decode_message(msg: &OscMessage, prefix: &str, now: Instant) -> Option<Notice> {
    match msg.addr.as_str() {
        "/serialosc/device" | "/serialosc/add" => port_arg(&msg.args).map(Notice::Found),
        "/serialosc/remove" => port_arg(&msg.args).map(Notice::Removed),
        addr => {
            let tail = addr.strip_prefix(prefix)?;
            let (n, value) = match msg.args.as_slice() {
                [n, value, ..] => (int(n)?, int(value)?),
                _ => return None,
            };
            let ring = usize::try_from(n).ok()?;
            let event = match tail {
                "/enc/delta" => InputEvent::EncoderDelta { ring, delta: value },
                "/enc/key" if value != 0 => InputEvent::ButtonPress { at: now },
                "/enc/key" => InputEvent::ButtonRelease { at: now },
                _ => return None,
            };
            Some(Notice::Input(event))
        }
    }
}

// `/serialosc/device id type port`
fn port_arg(args: &[OscType]) -> Option<u16> {
    let port = int(args.get(2)?)?;
    u16::try_from(port).ok().filter(|p| *p != 0)
}

fn int(arg: &OscType) -> Option<i32> {
    match arg {
        OscType::Int(v) => Some(*v),
        OscType::Long(v) => i32::try_from(*v).ok(),
        OscType::Float(v) => Some(*v as i32),
        _ => None,
    }
}
