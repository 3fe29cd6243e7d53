//! Tone sequence mini-language for the device buzzer
//!
//! A spec is a comma-separated list of notes followed by `;<tempo>`, e.g.
//! `C4Q,E4Q,G4H;120`. Each note is a letter `A`-`G` (or `R` for a rest), an
//! optional `#` or `b`, an octave `0`-`8` and a length `W`/`H`/`Q`/`E`/`S`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

static NOTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-GR])([#b]?)([0-8])([WHQES])$").expect("valid regex"));

/// Slowest accepted tempo in beats per minute
pub const MIN_TEMPO: u16 = 20;

/// Fastest accepted tempo in beats per minute
pub const MAX_TEMPO: u16 = 400;

/// Pitch accidental
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accidental {
    /// `#`
    Sharp,
    /// `b`
    Flat,
}

/// Note duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLength {
    /// `W`
    Whole,
    /// `H`
    Half,
    /// `Q`
    Quarter,
    /// `E`
    Eighth,
    /// `S`
    Sixteenth,
}

impl NoteLength {
    const fn symbol(self) -> char {
        match self {
            Self::Whole => 'W',
            Self::Half => 'H',
            Self::Quarter => 'Q',
            Self::Eighth => 'E',
            Self::Sixteenth => 'S',
        }
    }

    const fn from_symbol(c: char) -> Option<Self> {
        match c {
            'W' => Some(Self::Whole),
            'H' => Some(Self::Half),
            'Q' => Some(Self::Quarter),
            'E' => Some(Self::Eighth),
            'S' => Some(Self::Sixteenth),
            _ => None,
        }
    }

    /// Length in quarter-note beats
    #[must_use]
    pub const fn beats(self) -> f32 {
        match self {
            Self::Whole => 4.0,
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
        }
    }
}

/// One note or rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// `A`-`G`, or `R` for a rest
    pub pitch: char,
    /// Optional sharp or flat
    pub accidental: Option<Accidental>,
    /// Octave 0-8
    pub octave: u8,
    /// Duration
    pub length: NoteLength,
}

impl Note {
    /// Whether this note is silent
    #[must_use]
    pub const fn is_rest(&self) -> bool {
        self.pitch == 'R'
    }
}

impl FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = NOTE_REGEX
            .captures(s.trim())
            .ok_or_else(|| Error::InvalidTone(format!("bad note {s:?}")))?;

        let pitch = caps[1].chars().next().unwrap_or('R');
        let accidental = match &caps[2] {
            "#" => Some(Accidental::Sharp),
            "b" => Some(Accidental::Flat),
            _ => None,
        };
        let octave = caps[3]
            .parse()
            .map_err(|_| Error::InvalidTone(format!("bad octave in {s:?}")))?;
        let length = caps[4]
            .chars()
            .next()
            .and_then(NoteLength::from_symbol)
            .ok_or_else(|| Error::InvalidTone(format!("bad length in {s:?}")))?;

        Ok(Self {
            pitch,
            accidental,
            octave,
            length,
        })
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.accidental {
            Some(Accidental::Sharp) => "#",
            Some(Accidental::Flat) => "b",
            None => "",
        };
        write!(
            f,
            "{}{accidental}{}{}",
            self.pitch,
            self.octave,
            self.length.symbol()
        )
    }
}

/// Validated tone sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneSpec {
    notes: Vec<Note>,
    tempo: u16,
}

impl ToneSpec {
    /// Build a spec from parts
    ///
    /// # Errors
    ///
    /// Returns error if there are no notes or the tempo is out of range
    pub fn new(notes: Vec<Note>, tempo: u16) -> Result<Self> {
        if notes.is_empty() {
            return Err(Error::InvalidTone("no notes".to_string()));
        }
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&tempo) {
            return Err(Error::InvalidTone(format!(
                "tempo {tempo} outside {MIN_TEMPO}-{MAX_TEMPO}"
            )));
        }
        Ok(Self { notes, tempo })
    }

    /// Notes in play order
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Tempo in beats per minute
    #[must_use]
    pub const fn tempo(&self) -> u16 {
        self.tempo
    }

    /// Total play time at the spec's tempo
    #[must_use]
    pub fn duration(&self) -> std::time::Duration {
        let beats: f32 = self.notes.iter().map(|n| n.length.beats()).sum();
        std::time::Duration::from_secs_f32(beats * 60.0 / f32::from(self.tempo))
    }
}

impl FromStr for ToneSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (notes, tempo) = s
            .trim()
            .split_once(';')
            .ok_or_else(|| Error::InvalidTone(format!("missing ';<tempo>' in {s:?}")))?;

        let tempo = tempo
            .trim()
            .parse()
            .map_err(|_| Error::InvalidTone(format!("bad tempo {tempo:?}")))?;
        let notes = notes
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<Note>>>()?;

        Self::new(notes, tempo)
    }
}

impl fmt::Display for ToneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, note) in self.notes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{note}")?;
        }
        write!(f, ";{}", self.tempo)
    }
}
