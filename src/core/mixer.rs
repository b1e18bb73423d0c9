use std::cell::OnceCell;
use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::AudioSink;

/// Decay time constant for fading tones, in seconds.
const FADE_TAU: f32 = 0.5;

const DEFAULT_VOLUME: f32 = 0.5;

/// What a voice's generator sees: carrier frequency in Hz, peak amplitude on
/// the MIDI velocity scale, and whether the tone decays or holds.
#[derive(Debug, Clone, Copy)]
pub struct ToneConfig {
    pub frequency: f32,
    pub amplitude: u8,
    pub fade: bool,
}

/// Sample generator: elapsed seconds and config in, one sample out.
pub type SampleFn = fn(f32, &ToneConfig) -> f32;

/// Sine carrier scaled by amplitude, with an exponential decay envelope when
/// the config asks for a fade.
pub fn sine_tone(t: f32, config: &ToneConfig) -> f32 {
    let envelope = if config.fade { (-t / FADE_TAU).exp() } else { 1.0 };
    (2.0 * PI * config.frequency * t).sin() * (config.amplitude as f32 / 127.0) * envelope
}

/// Process-unique voice identity. Two voices never share one, so the same
/// pitch can sound twice concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(0);

/// One synthesized, independently timed tone.
///
/// The waveform is computed once for the voice's full duration and cached;
/// after that the voice is immutable and only enters or leaves the active set.
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    duration_ms: u64,
    config: ToneConfig,
    generator: SampleFn,
    samples: OnceCell<Vec<f32>>,
}

impl Voice {
    pub fn new(config: ToneConfig, duration_ms: u64) -> Self {
        Self::with_generator(config, duration_ms, sine_tone)
    }

    pub fn with_generator(config: ToneConfig, duration_ms: u64, generator: SampleFn) -> Self {
        Self {
            id: VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed)),
            duration_ms,
            config,
            generator,
            samples: OnceCell::new(),
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    /// The full waveform for the voice's duration, synthesized on first use.
    pub fn waveform(&self, sample_rate: u32) -> &[f32] {
        self.samples.get_or_init(|| {
            let len = (self.duration_ms * sample_rate as u64 / 1000) as usize;
            (0..len)
                .map(|i| (self.generator)(i as f32 / sample_rate as f32, &self.config))
                .collect()
        })
    }
}

struct ActiveVoice {
    voice: Voice,
    started_ms: u64,
}

/// Maintains the set of concurrently sounding voices and composes them into
/// the sink's single in-flight buffer.
pub struct Mixer<S: AudioSink> {
    sink: S,
    volume: f32,
    active: HashMap<VoiceId, ActiveVoice>,
}

impl<S: AudioSink> Mixer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            volume: DEFAULT_VOLUME,
            active: HashMap::new(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Register a voice as sounding from `at_ms`, synthesizing its waveform
    /// up front. Call `render` afterwards to make it audible.
    pub fn start(&mut self, voice: Voice, at_ms: u64) -> VoiceId {
        let id = voice.id();
        voice.waveform(self.sink.sample_rate());
        self.active.insert(id, ActiveVoice { voice, started_ms: at_ms });
        id
    }

    /// Remove a voice from the active set. Call `render` afterwards to make
    /// the removal audible.
    pub fn stop(&mut self, id: VoiceId) {
        self.active.remove(&id);
    }

    /// Register several voices so a single `render` call follows instead of
    /// one rebuild per voice.
    pub fn start_all(&mut self, voices: impl IntoIterator<Item = (Voice, u64)>) -> Vec<VoiceId> {
        voices
            .into_iter()
            .map(|(voice, at_ms)| self.start(voice, at_ms))
            .collect()
    }

    /// Remove several voices ahead of a single `render` call.
    pub fn stop_all(&mut self, ids: impl IntoIterator<Item = VoiceId>) {
        for id in ids {
            self.stop(id);
        }
    }

    /// Compose every surviving voice into one buffer and hand it to the sink.
    ///
    /// The buffer is rebuilt from scratch and swap-submitted on every call:
    /// each voice's suffix is taken at its own elapsed offset, so voices stay
    /// phase-consistent with themselves, but the sink restarts at sample 0 and
    /// rapid start/stop churn can produce audible clicks.
    pub fn render(&mut self, now_ms: u64) {
        let sample_rate = self.sink.sample_rate();
        let peak = self.sink.peak_amplitude() as f32;

        let mut parts: Vec<&[f32]> = Vec::new();
        let mut longest = 0usize;
        for active in self.active.values() {
            let elapsed_ms = now_ms.saturating_sub(active.started_ms);
            if elapsed_ms >= active.voice.duration_ms() {
                // Already rung out; nothing left to contribute
                continue;
            }
            let offset = (elapsed_ms * sample_rate as u64 / 1000) as usize;
            let waveform = active.voice.waveform(sample_rate);
            if offset >= waveform.len() {
                continue;
            }
            let part = &waveform[offset..];
            longest = longest.max(part.len());
            parts.push(part);
        }

        if parts.is_empty() {
            self.sink.stop();
            return;
        }

        let mut mix = vec![0.0f32; longest];
        for part in parts {
            for (acc, sample) in mix.iter_mut().zip(part) {
                *acc += sample;
            }
        }

        let volume = self.volume;
        let buffer: Vec<i16> = mix
            .iter()
            .map(|sample| (sample * volume * peak).clamp(-peak, peak) as i16)
            .collect();

        self.sink.stop();
        self.sink.submit(&buffer);
    }
}
