use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::keyboard::{Keyboard, UnknownStatus};
use crate::core::player::KeyboardWatcher;
use crate::midi::MidiSource;

/// Monotonic session clock. The input source and the poll loop share one so
/// event timestamps and render times are on the same axis.
#[derive(Debug, Clone, Copy)]
pub struct Clock(Instant);

impl Clock {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds elapsed since the clock started.
    pub fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One listening session: a cooperative poll loop over a MIDI source, the
/// keyboard state machine it feeds, and the watchers told about every change.
pub struct Session<M: MidiSource> {
    midi: M,
    clock: Clock,
    keyboard: Keyboard,
    watchers: Vec<Box<dyn KeyboardWatcher>>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<M: MidiSource> Session<M> {
    pub fn new(midi: M, clock: Clock) -> Self {
        Self {
            midi,
            clock,
            keyboard: Keyboard::new(),
            watchers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    /// Register a watcher; each one is notified, in registration order, after
    /// every tick's events are applied.
    pub fn watch(&mut self, watcher: Box<dyn KeyboardWatcher>) {
        self.watchers.push(watcher);
    }

    /// Flag checked at the top of each loop iteration. Arm it from anywhere
    /// to end the session cooperatively.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    /// Advance one iteration: drain pending input, apply every event in
    /// delivery order, then notify the watchers.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), UnknownStatus> {
        for event in self.midi.poll() {
            self.keyboard.apply(&event)?;
        }
        for watcher in &mut self.watchers {
            watcher.on_update(&self.keyboard, now_ms);
        }
        Ok(())
    }

    /// Run until the stop flag is set. An unknown status byte is a protocol
    /// violation and aborts the session with the error.
    pub fn run(&mut self) -> Result<(), UnknownStatus> {
        while !self.stop.load(Ordering::Relaxed) {
            let now_ms = self.clock.now_ms();
            self.tick(now_ms)?;
            thread::sleep(self.poll_interval);
        }
        log::info!("listening session stopped");
        Ok(())
    }
}
