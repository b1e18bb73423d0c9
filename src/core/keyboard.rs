use std::collections::HashMap;
use thiserror::Error;

/// Status byte for a key press.
pub const NOTE_ON: u8 = 144;
/// Status byte for a key release.
pub const NOTE_OFF: u8 = 128;
/// Controller-change status bytes carrying the sustain pedal.
pub const CONTROLLER: u8 = 176;
pub const CONTROLLER_ALT: u8 = 177;

// Hardware key numbers start at 21 (A0 on an 88-key board).
const KEY_OFFSET: i32 = 21;
const PEDAL_DOWN: u8 = 127;

/// One decoded message from the MIDI input, as the device delivers it:
/// `[[status, key, velocity, reserved], timestamp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub status: u8,
    pub key: u8,
    pub velocity: u8,
    pub reserved: u8,
    pub timestamp_ms: u64,
}

impl MidiEvent {
    pub fn note_on(key: u8, velocity: u8, timestamp_ms: u64) -> Self {
        Self {
            status: NOTE_ON,
            key,
            velocity,
            reserved: 0,
            timestamp_ms,
        }
    }

    pub fn note_off(key: u8, timestamp_ms: u64) -> Self {
        Self {
            status: NOTE_OFF,
            key,
            velocity: 0,
            reserved: 0,
            timestamp_ms,
        }
    }

    pub fn sustain(down: bool, timestamp_ms: u64) -> Self {
        Self {
            status: CONTROLLER,
            key: 64,
            velocity: if down { PEDAL_DOWN } else { 0 },
            reserved: 0,
            timestamp_ms,
        }
    }
}

/// A status byte outside the device protocol. Not recoverable: it means the
/// input is not the kind of device this state machine understands.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown MIDI status byte {0}")]
pub struct UnknownStatus(pub u8);

/// Press/release/sustain state of the physical keyboard.
///
/// Each key holds an ordered list of (velocity, press-time) pairs rather than
/// a single slot: under sustain a key can be re-pressed while it is still
/// logically down, and every press keeps sounding until the pedal lets it go.
#[derive(Debug, Default)]
pub struct Keyboard {
    keys: HashMap<i32, Vec<(u8, u64)>>,
    sustain: Option<HashMap<i32, bool>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one device event, translating hardware key numbers to 0-based
    /// logical keys.
    pub fn apply(&mut self, event: &MidiEvent) -> Result<(), UnknownStatus> {
        match event.status {
            NOTE_ON => {
                self.press(event.key as i32 - KEY_OFFSET, event.velocity, event.timestamp_ms);
                Ok(())
            }
            NOTE_OFF => {
                self.release(event.key as i32 - KEY_OFFSET);
                Ok(())
            }
            CONTROLLER | CONTROLLER_ALT => {
                if event.velocity == PEDAL_DOWN {
                    self.press_sustain();
                } else {
                    self.release_sustain();
                }
                Ok(())
            }
            other => Err(UnknownStatus(other)),
        }
    }

    pub fn press(&mut self, key: i32, velocity: u8, timestamp_ms: u64) {
        if let Some(pending) = &mut self.sustain {
            // A fresh press cancels any release deferred for this key.
            pending.insert(key, false);
        }
        self.keys.entry(key).or_default().push((velocity, timestamp_ms));
    }

    pub fn release(&mut self, key: i32) {
        if let Some(pending) = &mut self.sustain {
            pending.insert(key, true);
        } else if let Some(presses) = self.keys.get_mut(&key) {
            presses.clear();
        }
    }

    pub fn press_sustain(&mut self) {
        if self.sustain.is_none() {
            self.sustain = Some(HashMap::new());
        }
    }

    pub fn release_sustain(&mut self) {
        if let Some(pending) = self.sustain.take() {
            for (key, release) in pending {
                if release {
                    if let Some(presses) = self.keys.get_mut(&key) {
                        presses.clear();
                    }
                }
            }
        }
    }

    pub fn is_pressed(&self, key: i32) -> bool {
        self.keys.get(&key).is_some_and(|presses| !presses.is_empty())
    }

    pub fn is_sustained(&self) -> bool {
        self.sustain.is_some()
    }

    /// Every (key, velocity, press-time) triple currently sounding.
    pub fn held(&self) -> impl Iterator<Item = (i32, u8, u64)> + '_ {
        self.keys.iter().flat_map(|(&key, presses)| {
            presses
                .iter()
                .map(move |&(velocity, timestamp_ms)| (key, velocity, timestamp_ms))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release() {
        let mut keyboard = Keyboard::new();
        keyboard.press(10, 64, 100);
        assert!(keyboard.is_pressed(10));
        assert_eq!(keyboard.held().collect::<Vec<_>>(), vec![(10, 64, 100)]);

        keyboard.release(10);
        assert!(!keyboard.is_pressed(10));
        assert_eq!(keyboard.held().count(), 0);
    }

    #[test]
    fn test_sustain_defers_release() {
        let mut keyboard = Keyboard::new();
        keyboard.press(10, 64, 100);
        keyboard.press_sustain();
        keyboard.release(10);

        // Still sounding: the pedal is holding the key open
        assert!(keyboard.is_pressed(10));

        keyboard.release_sustain();
        assert!(!keyboard.is_pressed(10));
    }

    #[test]
    fn test_press_during_sustain_survives_pedal_up() {
        let mut keyboard = Keyboard::new();
        keyboard.press(10, 64, 100);
        keyboard.press_sustain();
        keyboard.release(10);
        keyboard.press(10, 80, 200);

        keyboard.release_sustain();
        // The re-press cleared the pending release, so both entries survive
        assert!(keyboard.is_pressed(10));
        let mut held = keyboard.held().collect::<Vec<_>>();
        held.sort();
        assert_eq!(held, vec![(10, 64, 100), (10, 80, 200)]);
    }

    #[test]
    fn test_release_without_sustain_only_clears_that_key() {
        let mut keyboard = Keyboard::new();
        keyboard.press(10, 64, 100);
        keyboard.press(11, 70, 110);
        keyboard.release(10);
        assert!(!keyboard.is_pressed(10));
        assert!(keyboard.is_pressed(11));
    }

    #[test]
    fn test_redundant_pedal_events_are_harmless() {
        let mut keyboard = Keyboard::new();
        keyboard.press_sustain();
        keyboard.press(10, 64, 100);
        keyboard.release(10);
        // A second pedal-down must not discard the pending map
        keyboard.press_sustain();
        keyboard.release_sustain();
        assert!(!keyboard.is_pressed(10));

        // Pedal-up with the pedal already up is a no-op
        keyboard.release_sustain();
    }

    #[test]
    fn test_apply_translates_hardware_keys() {
        let mut keyboard = Keyboard::new();
        keyboard.apply(&MidiEvent::note_on(21, 64, 5)).unwrap();
        assert!(keyboard.is_pressed(0));
        keyboard.apply(&MidiEvent::note_off(21, 6)).unwrap();
        assert!(!keyboard.is_pressed(0));
    }

    #[test]
    fn test_apply_sustain_scenario() {
        let mut keyboard = Keyboard::new();
        keyboard.apply(&MidiEvent::note_on(31, 64, 1)).unwrap();
        keyboard.apply(&MidiEvent::sustain(true, 2)).unwrap();
        keyboard.apply(&MidiEvent::note_off(31, 3)).unwrap();
        assert!(keyboard.is_pressed(10));
        keyboard.apply(&MidiEvent::sustain(false, 4)).unwrap();
        assert!(!keyboard.is_pressed(10));
    }

    #[test]
    fn test_controller_alt_status() {
        let mut keyboard = Keyboard::new();
        let mut event = MidiEvent::sustain(true, 1);
        event.status = CONTROLLER_ALT;
        keyboard.apply(&event).unwrap();
        assert!(keyboard.is_sustained());
    }

    #[test]
    fn test_unknown_status_is_fatal() {
        let mut keyboard = Keyboard::new();
        let event = MidiEvent {
            status: 208,
            key: 0,
            velocity: 0,
            reserved: 0,
            timestamp_ms: 0,
        };
        assert_eq!(keyboard.apply(&event), Err(UnknownStatus(208)));
    }
}
