use std::collections::{HashMap, HashSet};

use crate::audio::AudioSink;
use crate::core::keyboard::Keyboard;
use crate::core::keys::KeySet;
use crate::core::mixer::{Mixer, ToneConfig, Voice, VoiceId};
use crate::core::pitch::Note;

/// Duration bound for a keyboard tone. The fade envelope has decayed past
/// audibility long before this.
pub const KEY_TONE_MS: u64 = 5000;

/// Receives the keyboard after each batch of input events is applied.
pub trait KeyboardWatcher {
    fn on_update(&mut self, keyboard: &Keyboard, now_ms: u64);
}

/// Turns held keys into mixer voices.
///
/// Each distinct (key, velocity, press-time) triple backs at most one voice;
/// a triple that disappears stops its voice, and a stopped voice is never
/// restarted without a fresh identity from a fresh press.
pub struct Player<S: AudioSink> {
    keys: KeySet,
    mixer: Mixer<S>,
    sounding: HashMap<(i32, u8, u64), VoiceId>,
    tone_ms: u64,
}

impl<S: AudioSink> Player<S> {
    pub fn new(keys: KeySet, mixer: Mixer<S>) -> Self {
        Self {
            keys,
            mixer,
            sounding: HashMap::new(),
            tone_ms: KEY_TONE_MS,
        }
    }

    pub fn mixer(&self) -> &Mixer<S> {
        &self.mixer
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding.len()
    }
}

impl<S: AudioSink> KeyboardWatcher for Player<S> {
    fn on_update(&mut self, keyboard: &Keyboard, now_ms: u64) {
        let held: HashSet<(i32, u8, u64)> = keyboard.held().collect();

        let finished: Vec<_> = self
            .sounding
            .keys()
            .copied()
            .filter(|triple| !held.contains(triple))
            .collect();
        let mut to_stop = Vec::with_capacity(finished.len());
        for triple in finished {
            if let Some(id) = self.sounding.remove(&triple) {
                to_stop.push(id);
            }
        }

        let mut to_start = Vec::new();
        for triple in held {
            if self.sounding.contains_key(&triple) {
                continue;
            }
            let (key, velocity, pressed_ms) = triple;
            let frequency = match self.keys.frequency(key) {
                Ok(frequency) => frequency,
                Err(err) => {
                    log::warn!("ignoring press: {}", err);
                    continue;
                }
            };
            let voice = Voice::new(
                ToneConfig {
                    frequency,
                    amplitude: velocity,
                    fade: true,
                },
                self.tone_ms,
            );
            log::info!("({} / {} at {})", Note::from_key(key), velocity, pressed_ms);
            self.sounding.insert(triple, voice.id());
            to_start.push((voice, pressed_ms));
        }

        if to_stop.is_empty() && to_start.is_empty() {
            return;
        }

        // Apply the whole diff, then rebuild the sink buffer once
        self.mixer.stop_all(to_stop);
        self.mixer.start_all(to_start);
        self.mixer.render(now_ms);
    }
}
