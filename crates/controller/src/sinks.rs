use std::io;
use std::net::UdpSocket;

use arc_library::midi::ControlMessage;
use arc_library::services::OscControl;
use arc_library::settings::{MidiSettings, OscSettings};
use arc_library::sink::Sink;
use arc_library::{ArcError, Result};
use midir::os::unix::VirtualOutput;
use midir::{MidiOutput, MidiOutputConnection};
use midly::live::LiveEvent;
use midly::num::{u4, u7};
use midly::MidiMessage;
use rosc::{OscMessage, OscPacket, OscType};
use tracing::info;

/// Virtual MIDI output port that control changes are written to.
pub struct MidiPort {
    conn: MidiOutputConnection,
}

impl MidiPort {
    pub fn open(settings: &MidiSettings) -> Result<Self> {
        let output = MidiOutput::new(&settings.client_name).map_err(|e| ArcError::sink("midi", e))?;
        let conn = output
            .create_virtual(&settings.port_name)
            .map_err(|e| ArcError::sink("midi", e))?;
        info!(port = %settings.port_name, "virtual MIDI output created");
        Ok(Self { conn })
    }
}

impl Sink<ControlMessage> for MidiPort {
    fn send(&mut self, msg: ControlMessage) -> Result<()> {
        for (cc, value) in msg.controller_values() {
            let bytes = cc_bytes(msg.channel(), cc, value)?;
            self.conn.send(&bytes).map_err(|e| ArcError::sink("midi", e))?;
        }
        Ok(())
    }
}

fn cc_bytes(channel: u8, controller: u8, value: u8) -> Result<Vec<u8>> {
    let event = LiveEvent::Midi {
        channel: u4::new(channel & 0x0f),
        message: MidiMessage::Controller {
            controller: u7::new(controller & 0x7f),
            value: u7::new(value & 0x7f),
        },
    };
    let mut buf = Vec::with_capacity(3);
    event.write_std(&mut buf).map_err(|e| ArcError::sink("midi", e))?;
    Ok(buf)
}

/// Sends ring values as single-float OSC messages to one host.
pub struct OscPort {
    socket: UdpSocket,
    target: String,
}

impl OscPort {
    pub fn open(settings: &OscSettings) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let target = format!("{}:{}", settings.host, settings.port);
        info!(%target, prefix = %settings.prefix, "OSC output ready");
        Ok(Self { socket, target })
    }
}

impl Sink<OscControl> for OscPort {
    fn send(&mut self, msg: OscControl) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: msg.address,
            args: vec![OscType::Float(msg.value)],
        });
        let buf = rosc::encoder::encode(&packet)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket
            .send_to(&buf, self.target.as_str())
            .map_err(|e| ArcError::sink("osc", e))?;
        Ok(())
    }
}
