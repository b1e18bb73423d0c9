use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

// Glyph forms accepted alongside the ASCII accidental tokens
const SHARP_SIGN: char = '\u{266F}';
const FLAT_SIGN: char = '\u{266D}';
const NATURAL_SIGN: char = '\u{266E}';
const DOUBLE_SHARP_SIGN: char = '\u{1D12A}';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error("empty note name")]
    Empty,
    #[error("'{0}' does not start with a letter A-G")]
    BadLetter(String),
    #[error("'{0}' is missing an octave")]
    MissingOctave(String),
    #[error("'{0}' has an unreadable octave")]
    BadOctave(String),
}

/// Note letters A-G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Letter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            _ => None,
        }
    }

    /// Semitone offset from the start of the octave (octaves begin at C).
    fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::A => 'A',
            Letter::B => 'B',
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
        }
    }
}

// Spelling tables for the integer-key constructor, indexed by semitone
// within a C-based octave. Naturals and single accidentals only.
const SHARP_SPELLINGS: [(Letter, i32); 12] = [
    (Letter::C, 0),
    (Letter::C, 1),
    (Letter::D, 0),
    (Letter::D, 1),
    (Letter::E, 0),
    (Letter::F, 0),
    (Letter::F, 1),
    (Letter::G, 0),
    (Letter::G, 1),
    (Letter::A, 0),
    (Letter::A, 1),
    (Letter::B, 0),
];

const FLAT_SPELLINGS: [(Letter, i32); 12] = [
    (Letter::C, 0),
    (Letter::D, -1),
    (Letter::D, 0),
    (Letter::E, -1),
    (Letter::E, 0),
    (Letter::F, 0),
    (Letter::G, -1),
    (Letter::G, 0),
    (Letter::A, -1),
    (Letter::A, 0),
    (Letter::B, -1),
    (Letter::B, 0),
];

/// A spelled pitch: letter, net accidental offset in semitones, octave.
///
/// Two notes compare equal when they name the same pitch, regardless of
/// spelling; `C#4` and `Db4` are equal but display differently. The canonical
/// key is the semitone index with A0 at key 0, so C4 is key 39.
#[derive(Debug, Clone)]
pub struct Note {
    letter: Letter,
    accidental: i32,
    octave: i32,
    use_flats: bool,
}

impl Note {
    /// Parse a note name such as `C4`, `Eb3`, `F#-1` or `Gx2`.
    ///
    /// The accidental run may mix sharp (`s`, `S`, `#`, ♯), double-sharp
    /// (`x`, `X`, 𝄪, or `##`), flat (`b`, `B`, ♭) and natural (`n`, `N`, ♮)
    /// tokens in any order; the net offset is stored. `use_flats` only sets
    /// the preference later respelling will use.
    pub fn parse(name: &str, use_flats: bool) -> Result<Self, NoteError> {
        let mut chars = name.char_indices();
        let (_, first) = chars.next().ok_or(NoteError::Empty)?;
        let letter = Letter::from_char(first).ok_or_else(|| NoteError::BadLetter(name.to_string()))?;

        let mut accidental = 0;
        let mut octave_start = name.len();
        for (idx, c) in chars {
            match accidental_offset(c) {
                Some(offset) => accidental += offset,
                None => {
                    octave_start = idx;
                    break;
                }
            }
        }

        let octave_digits = &name[octave_start..];
        if octave_digits.is_empty() {
            return Err(NoteError::MissingOctave(name.to_string()));
        }
        let octave = octave_digits
            .parse::<i32>()
            .map_err(|_| NoteError::BadOctave(name.to_string()))?;

        Ok(Note {
            letter,
            accidental,
            octave,
            use_flats,
        })
    }

    /// Build a note directly from a canonical key, spelled with sharps.
    pub fn from_key(key: i32) -> Self {
        Self::from_key_with(key, false)
    }

    /// Build a note directly from a canonical key with a spelling preference.
    pub fn from_key_with(key: i32, use_flats: bool) -> Self {
        let c_based = key + 9;
        let octave = c_based.div_euclid(12);
        let rel = c_based.rem_euclid(12) as usize;
        let (letter, accidental) = if use_flats {
            FLAT_SPELLINGS[rel]
        } else {
            SHARP_SPELLINGS[rel]
        };
        Note {
            letter,
            accidental,
            octave,
            use_flats,
        }
    }

    /// Canonical semitone index, anchored so A0 is key 0.
    pub fn key(&self) -> i32 {
        self.letter.semitone() + self.accidental + 12 * self.octave - 9
    }

    /// Respell from the canonical key: `Cb4` becomes `B3`, `Db4` becomes
    /// `C#4` (or stays `Db4` when flats are preferred). Idempotent.
    ///
    /// `use_flats` overrides the note's own spelling preference when given.
    pub fn simplified(&self, use_flats: Option<bool>) -> Note {
        Note::from_key_with(self.key(), use_flats.unwrap_or(self.use_flats))
    }

    pub fn accidental(&self) -> i32 {
        self.accidental
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// The accidental rendered with the fewest symbols: `x` per double-sharp,
    /// then at most one `#`, or a run of `b`s. Empty for a natural.
    pub fn accidental_spelling(&self) -> String {
        if self.accidental >= 0 {
            let mut s = "x".repeat((self.accidental / 2) as usize);
            if self.accidental % 2 == 1 {
                s.push('#');
            }
            s
        } else {
            "b".repeat(self.accidental.unsigned_abs() as usize)
        }
    }
}

fn accidental_offset(c: char) -> Option<i32> {
    match c {
        '#' | 's' | 'S' | SHARP_SIGN => Some(1),
        'x' | 'X' | DOUBLE_SHARP_SIGN => Some(2),
        'b' | 'B' | FLAT_SIGN => Some(-1),
        'n' | 'N' | NATURAL_SIGN => Some(0),
        _ => None,
    }
}

impl FromStr for Note {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Note::parse(s, false)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.letter.as_char(),
            self.accidental_spelling(),
            self.octave
        )
    }
}

// Enharmonic equivalence: identity is the pitch, not the spelling.
impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(name: &str) -> Note {
        name.parse().unwrap()
    }

    #[test]
    fn test_key_anchors() {
        assert_eq!(note("A0").key(), 0);
        assert_eq!(note("C4").key(), 39);
        assert_eq!(note("C#4").key(), 40);
        assert_eq!(note("A4").key(), 48);
    }

    #[test]
    fn test_display_round_trip() {
        let c4 = note("C4");
        assert_eq!(c4.to_string(), "C4");
        assert_eq!(note(&c4.to_string()), c4);
    }

    #[test]
    fn test_letters_case_insensitive() {
        for l in ['A', 'B', 'C', 'D', 'E', 'F', 'G'] {
            let upper = note(&format!("{}4", l));
            let lower = note(&format!("{}4", l.to_ascii_lowercase()));
            assert_eq!(upper, lower);
            assert_eq!(upper.to_string(), lower.to_string());
        }
    }

    #[test]
    fn test_enharmonic_equivalence() {
        let cs = note("C#4");
        let db = note("Db4");
        assert_eq!(cs, db);
        assert_eq!(cs.key(), db.key());
        assert_ne!(cs.to_string(), db.to_string());
    }

    #[test]
    fn test_accidental_run_reduction() {
        let cases = [
            ("####", "xx"),
            ("s###", "xx"),
            ("#S###b", "xx"),
            ("#S###bbbbbbb", "bb"),
            ("#S##b", "x#"),
            ("xbbnnn", ""),
            ("#", "#"),
            ("s", "#"),
            ("S", "#"),
            ("\u{266F}", "#"),
            ("x", "x"),
            ("X", "x"),
            ("##", "x"),
            ("\u{1D12A}", "x"),
            ("b", "b"),
            ("B", "b"),
            ("\u{266D}", "b"),
            ("n", ""),
            ("N", ""),
            ("\u{266E}", ""),
            ("", ""),
        ];
        for (run, expected) in cases {
            let parsed = note(&format!("C{}4", run));
            assert_eq!(
                parsed.accidental_spelling(),
                expected,
                "accidental run {:?}",
                run
            );
        }
    }

    #[test]
    fn test_simplified_respells_to_sharps_by_default() {
        let db = note("Db4");
        let simplified = db.simplified(None);
        assert_eq!(simplified, db);
        assert_eq!(simplified.to_string(), "C#4");
    }

    #[test]
    fn test_simplified_keeps_flat_preference() {
        let cs = Note::parse("C#4", true).unwrap();
        let simplified = cs.simplified(None);
        assert_eq!(simplified, note("Db4"));
        assert_eq!(simplified.to_string(), "Db4");
    }

    #[test]
    fn test_simplified_override_beats_preference() {
        let cs = Note::parse("C#4", true).unwrap();
        assert_eq!(cs.simplified(Some(false)).to_string(), "C#4");
        assert_eq!(note("C#4").simplified(Some(true)).to_string(), "Db4");
    }

    #[test]
    fn test_simplified_crosses_letters() {
        let cb = note("Cb4");
        let simplified = cb.simplified(None);
        assert_eq!(simplified, note("B3"));
        assert_eq!(simplified.to_string(), "B3");
    }

    #[test]
    fn test_simplified_idempotent() {
        for name in ["Cb4", "Db4", "G###nn-2", "A0", "Fx7"] {
            let once = note(name).simplified(None);
            let twice = once.simplified(None);
            assert_eq!(once.to_string(), twice.to_string());
        }
    }

    #[test]
    fn test_from_key_round_trip() {
        for key in [2, 0, -12, -1, 12, 23, 25, 9, 39, 87] {
            let spelled = Note::from_key(key);
            assert_eq!(spelled.key(), key);
            assert_eq!(note(&spelled.to_string()).key(), key);

            let flat = Note::from_key_with(key, true);
            assert_eq!(flat.key(), key);
            assert_eq!(note(&flat.to_string()).key(), key);
        }
    }

    #[test]
    fn test_negative_octave() {
        let low = note("C###-2");
        assert_eq!(low.octave(), -2);
        assert_eq!(low.to_string(), "Cx#-2");
        assert_eq!(note(&low.to_string()), low);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Note>(), Err(NoteError::Empty));
        assert_eq!(
            "C".parse::<Note>(),
            Err(NoteError::MissingOctave("C".into()))
        );
        assert_eq!(
            "C#".parse::<Note>(),
            Err(NoteError::MissingOctave("C#".into()))
        );
        assert_eq!(
            "H4".parse::<Note>(),
            Err(NoteError::BadLetter("H4".into()))
        );
        assert_eq!(
            "C#q4".parse::<Note>(),
            Err(NoteError::BadOctave("C#q4".into()))
        );
        assert_eq!(
            "C4x".parse::<Note>(),
            Err(NoteError::BadOctave("C4x".into()))
        );
        assert_eq!("C-".parse::<Note>(), Err(NoteError::BadOctave("C-".into())));
    }
}
