use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("key {key} is outside the built range 0..{num_keys}")]
pub struct KeyOutOfRange {
    pub key: i32,
    pub num_keys: usize,
}

/// Builds equal-tempered key-to-frequency tables over a root pitch.
///
/// Defaults describe a standard 88-key board under the A0 = key 0 convention:
/// A4 = 440 Hz sits at key 48.
#[derive(Debug, Clone)]
pub struct KeySetBuilder {
    pub root: f32,
    pub root_key: i32,
    pub num_keys: usize,
    pub keys_per_octave: u32,
}

impl Default for KeySetBuilder {
    fn default() -> Self {
        Self {
            root: 440.0,
            root_key: 48,
            num_keys: 88,
            keys_per_octave: 12,
        }
    }
}

impl KeySetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed-form equal-temperament frequency for any key, in Hz.
    pub fn frequency(&self, key: i32) -> f32 {
        let steps = (key - self.root_key) as f32 / self.keys_per_octave as f32;
        self.root * 2.0f32.powf(steps)
    }

    fn build_keys(&self) -> Vec<f32> {
        (0..self.num_keys).map(|k| self.frequency(k as i32)).collect()
    }

    /// Materialize the full frequency table for keys `0..num_keys`.
    pub fn build(&self) -> KeySet {
        KeySet {
            keys: Some(self.build_keys()),
            builder: self.clone(),
        }
    }

    /// Answer every lookup by the ratio formula instead of a table. Never
    /// fails, extrapolating beyond the keyboard in both directions.
    pub fn build_lazy(&self) -> KeySet {
        KeySet {
            keys: None,
            builder: self.clone(),
        }
    }
}

/// Key-to-frequency mapping, either a materialized table or the closed form.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Option<Vec<f32>>,
    builder: KeySetBuilder,
}

impl KeySet {
    pub fn frequency(&self, key: i32) -> Result<f32, KeyOutOfRange> {
        match &self.keys {
            Some(keys) => usize::try_from(key)
                .ok()
                .and_then(|index| keys.get(index).copied())
                .ok_or(KeyOutOfRange {
                    key,
                    num_keys: keys.len(),
                }),
            None => Ok(self.builder.frequency(key)),
        }
    }
}
