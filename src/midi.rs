use crossbeam_channel::{unbounded, Receiver};
use midir::{Ignore, MidiInput, MidiInputConnection};
use thiserror::Error;

use crate::core::keyboard::MidiEvent;
use crate::core::session::Clock;

#[derive(Error, Debug)]
pub enum MidiError {
    #[error("failed to initialize MIDI input: {0}")]
    Init(#[from] midir::InitError),
    #[error("no MIDI input device found")]
    NoDevice,
    #[error("failed to connect to MIDI port '{0}'")]
    Connect(String),
}

/// Non-blocking source of decoded MIDI events for the poll loop.
pub trait MidiSource {
    /// Drain whatever arrived since the last poll, in delivery order.
    fn poll(&mut self) -> Vec<MidiEvent>;
}

/// Live MIDI input: a midir callback pushes decoded events onto a channel
/// the poll loop drains. Dropping the source releases the port.
pub struct MidirSource {
    receiver: Receiver<MidiEvent>,
    port_name: String,
    _connection: MidiInputConnection<()>,
}

impl MidirSource {
    /// Connect to the first available MIDI input port. Events are stamped
    /// with their arrival time on `clock`; the driver's own stamp has a
    /// platform-dependent origin and is not comparable to the session clock.
    pub fn connect_default(clock: Clock) -> Result<Self, MidiError> {
        let mut midi_in = MidiInput::new("keytone input")?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        let port = ports.first().ok_or(MidiError::NoDevice)?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "unknown".to_string());

        let (sender, receiver) = unbounded();
        let connection = midi_in
            .connect(
                port,
                "keytone-read-input",
                move |_stamp, message, _| {
                    if let Some(event) = decode(clock.now_ms(), message) {
                        sender.send(event).ok();
                    }
                },
                (),
            )
            .map_err(|_| MidiError::Connect(port_name.clone()))?;

        log::info!("listening on MIDI port '{}'", port_name);

        Ok(Self {
            receiver,
            port_name,
            _connection: connection,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSource for MidirSource {
    fn poll(&mut self) -> Vec<MidiEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Shape raw bytes into the `[[status, key, velocity, reserved], timestamp]`
/// event the keyboard consumes. Frames too short to carry the tuple are
/// dropped here; status interpretation stays with the keyboard.
fn decode(timestamp_ms: u64, message: &[u8]) -> Option<MidiEvent> {
    if message.len() < 3 {
        return None;
    }
    Some(MidiEvent {
        status: message[0],
        key: message[1],
        velocity: message[2],
        reserved: message.get(3).copied().unwrap_or(0),
        timestamp_ms,
    })
}
