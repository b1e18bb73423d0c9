use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::audio::{AudioContext, AudioSink};
use crate::core::keys::{KeySet, KeySetBuilder};
use crate::core::mixer::{Mixer, ToneConfig, Voice};
use crate::core::pitch::Note;
use crate::core::player::Player;
use crate::core::session::{Clock, Session};
use crate::midi::{MidiError, MidirSource};

#[derive(Parser)]
#[command(
    name = "keytone",
    about = "A tone generator with MIDI keyboard support",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Listen to a MIDI keyboard and play what it sends
    Keyboard(KeyboardArgs),
    /// Play one or more named notes
    Note(NoteArgs),
}

#[derive(Args)]
pub struct KeyboardArgs {
    /// Poll interval for the MIDI input, in milliseconds
    #[arg(long, default_value_t = 10)]
    pub poll_ms: u64,

    /// Master volume, 0.0 to 1.0
    #[arg(long, default_value_t = 0.5)]
    pub volume: f32,
}

#[derive(Args)]
pub struct NoteArgs {
    /// Note names such as C4, Eb3 or F#-1
    #[arg(required = true)]
    pub notes: Vec<String>,

    /// How long each note sounds, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub duration: u64,

    /// Peak amplitude on the MIDI velocity scale
    #[arg(long, default_value_t = 96, value_parser = clap::value_parser!(u8).range(0..=127))]
    pub amplitude: u8,

    /// Master volume, 0.0 to 1.0
    #[arg(long, default_value_t = 0.5)]
    pub volume: f32,

    /// Layer a minor third (6:5) over each note
    #[arg(long)]
    pub minor_third: bool,

    /// Layer a major third (5:4) over each note
    #[arg(long)]
    pub major_third: bool,

    /// Layer a perfect fourth (4:3) over each note
    #[arg(long)]
    pub fourth: bool,

    /// Layer a perfect fifth (3:2) over each note
    #[arg(long)]
    pub fifth: bool,

    /// Layer an octave (2:1) over each note
    #[arg(long)]
    pub octave: bool,

    /// Layer an arbitrary interval given as an integer ratio, e.g. 7:4
    #[arg(long, value_name = "N:D")]
    pub ratio: Vec<Ratio>,

    /// Hold each tone at full amplitude instead of letting it decay
    #[arg(long)]
    pub no_fade: bool,

    /// Play the notes one after another instead of as one chord
    #[arg(long)]
    pub sequential: bool,
}

impl NoteArgs {
    /// The interval stack applied to every requested note, unison first.
    fn intervals(&self) -> Vec<Ratio> {
        let mut ratios = vec![Ratio::UNISON];
        if self.minor_third {
            ratios.push(Ratio::MINOR_THIRD);
        }
        if self.major_third {
            ratios.push(Ratio::MAJOR_THIRD);
        }
        if self.fourth {
            ratios.push(Ratio::FOURTH);
        }
        if self.fifth {
            ratios.push(Ratio::FIFTH);
        }
        if self.octave {
            ratios.push(Ratio::OCTAVE);
        }
        ratios.extend(self.ratio.iter().copied());
        ratios
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ratio '{0}' is not of the form N:D with nonzero integers")]
pub struct RatioError(String);

/// An interval as a frequency ratio of small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub num: u32,
    pub den: u32,
}

impl Ratio {
    pub const UNISON: Ratio = Ratio { num: 1, den: 1 };
    pub const MINOR_THIRD: Ratio = Ratio { num: 6, den: 5 };
    pub const MAJOR_THIRD: Ratio = Ratio { num: 5, den: 4 };
    pub const FOURTH: Ratio = Ratio { num: 4, den: 3 };
    pub const FIFTH: Ratio = Ratio { num: 3, den: 2 };
    pub const OCTAVE: Ratio = Ratio { num: 2, den: 1 };

    pub fn apply(self, frequency: f32) -> f32 {
        frequency * self.num as f32 / self.den as f32
    }
}

impl FromStr for Ratio {
    type Err = RatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, den) = s.split_once(':').ok_or_else(|| RatioError(s.to_string()))?;
        let num = num.parse::<u32>().map_err(|_| RatioError(s.to_string()))?;
        let den = den.parse::<u32>().map_err(|_| RatioError(s.to_string()))?;
        if num == 0 || den == 0 {
            return Err(RatioError(s.to_string()));
        }
        Ok(Ratio { num, den })
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Keyboard(args) => run_keyboard(args),
        Command::Note(args) => run_note(args),
    }
}

fn run_keyboard(args: &KeyboardArgs) -> anyhow::Result<()> {
    let clock = Clock::start();
    let midi = match MidirSource::connect_default(clock) {
        Ok(midi) => midi,
        Err(MidiError::NoDevice) => {
            // Recoverable: report it and end the session cleanly
            eprintln!("No MIDI input device found; connect a keyboard and try again.");
            return Ok(());
        }
        Err(err) => return Err(err).context("connecting MIDI input"),
    };
    let port_name = midi.port_name().to_string();

    let audio = AudioContext::open().context("opening audio output")?;
    let sink = audio.open_sink().context("starting audio stream")?;
    let mut mixer = Mixer::new(sink);
    mixer.set_volume(args.volume);
    let player = Player::new(KeySetBuilder::new().build(), mixer);

    let mut session = Session::new(midi, clock);
    session.set_poll_interval(Duration::from_millis(args.poll_ms));
    session.watch(Box::new(player));

    let stop = session.stop_handle();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        stop.store(true, Ordering::Relaxed);
    });

    println!("Listening on '{}'. Press Enter to stop.", port_name);
    session.run().context("listening session failed")?;
    println!("Exiting.");
    Ok(())
}

fn run_note(args: &NoteArgs) -> anyhow::Result<()> {
    // Parse every name up front so bad input never touches a device
    let mut notes = Vec::with_capacity(args.notes.len());
    for name in &args.notes {
        let note: Note = name
            .parse()
            .with_context(|| format!("bad note name '{}'", name))?;
        notes.push(note);
    }
    let ratios = args.intervals();

    let audio = AudioContext::open().context("opening audio output")?;
    let sink = audio.open_sink().context("starting audio stream")?;
    let mut mixer = Mixer::new(sink);
    mixer.set_volume(args.volume);

    // Lazy so any octave the grammar allows maps to a frequency
    let keys = KeySetBuilder::new().build_lazy();

    if args.sequential {
        for note in &notes {
            let voices = voices_for(note, &keys, &ratios, args)?;
            play(&mut mixer, voices, args.duration);
        }
    } else {
        let mut voices = Vec::new();
        for note in &notes {
            voices.extend(voices_for(note, &keys, &ratios, args)?);
        }
        play(&mut mixer, voices, args.duration);
    }

    Ok(())
}

fn voices_for(
    note: &Note,
    keys: &KeySet,
    ratios: &[Ratio],
    args: &NoteArgs,
) -> anyhow::Result<Vec<Voice>> {
    let base = keys.frequency(note.key())?;
    println!("{} ({:.1} Hz)", note, base);
    Ok(ratios
        .iter()
        .map(|ratio| {
            Voice::new(
                ToneConfig {
                    frequency: ratio.apply(base),
                    amplitude: args.amplitude,
                    fade: !args.no_fade,
                },
                args.duration,
            )
        })
        .collect())
}

fn play<S: AudioSink>(mixer: &mut Mixer<S>, voices: Vec<Voice>, duration_ms: u64) {
    let ids = mixer.start_all(voices.into_iter().map(|voice| (voice, 0)));
    mixer.render(0);
    thread::sleep(Duration::from_millis(duration_ms));
    mixer.stop_all(ids);
    mixer.render(duration_ms);
}
