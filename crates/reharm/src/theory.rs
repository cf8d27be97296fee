//! Symbolic harmony: chords, keys, progressions and melody events.
//!
//! Pitch classes are `u8` in 0..12 with C = 0. MIDI pitches are plain `u8`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chord_templates::{self, parse_note_name, root_name};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended2,
    Suspended4,
    Dominant7,
    Major7,
    Minor7,
    MinorMajor7,
    Diminished7,
    HalfDiminished7,
    Major6,
    Minor6,
    Dominant9,
    Major9,
    Minor9,
    Dominant13,
    Add9,
}

impl ChordQuality {
    pub const ALL: &'static [ChordQuality] = &[
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Diminished,
        ChordQuality::Augmented,
        ChordQuality::Suspended2,
        ChordQuality::Suspended4,
        ChordQuality::Dominant7,
        ChordQuality::Major7,
        ChordQuality::Minor7,
        ChordQuality::MinorMajor7,
        ChordQuality::Diminished7,
        ChordQuality::HalfDiminished7,
        ChordQuality::Major6,
        ChordQuality::Minor6,
        ChordQuality::Dominant9,
        ChordQuality::Major9,
        ChordQuality::Minor9,
        ChordQuality::Dominant13,
        ChordQuality::Add9,
    ];

    /// Suffix for chord symbol display
    pub fn suffix(&self) -> &'static str {
        chord_templates::template(*self).suffix
    }

    /// Semitones above the root, extensions as compound intervals.
    pub fn intervals(&self) -> &'static [u8] {
        chord_templates::template(*self).intervals
    }

    pub fn is_dominant(&self) -> bool {
        matches!(
            self,
            ChordQuality::Dominant7 | ChordQuality::Dominant9 | ChordQuality::Dominant13
        )
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, ChordQuality::Suspended2 | ChordQuality::Suspended4)
    }

    pub fn has_major_third(&self) -> bool {
        self.intervals().contains(&4)
    }

    pub fn has_minor_third(&self) -> bool {
        self.intervals().contains(&3)
    }

    /// Four-or-more note qualities built on a seventh.
    pub fn is_seventh(&self) -> bool {
        self.intervals().iter().any(|&i| i == 9 || i == 10 || i == 11)
            && !matches!(self, ChordQuality::Major6 | ChordQuality::Minor6)
    }
}

/// A chord symbol. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ChordFields")]
pub struct Chord {
    pub root: u8,
    pub quality: ChordQuality,
    /// Added tensions as compound intervals above the root (b9 = 13, #11 = 18).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tensions: Vec<u8>,
    /// Slash bass pitch class, when different from the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass: Option<u8>,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        Self {
            root: root % 12,
            quality,
            tensions: Vec::new(),
            bass: None,
        }
    }

    pub fn with_bass(mut self, bass: u8) -> Self {
        let bass = bass % 12;
        self.bass = (bass != self.root).then_some(bass);
        self
    }

    pub fn with_tensions(mut self, tensions: impl IntoIterator<Item = u8>) -> Self {
        let mut tensions: Vec<u8> = tensions.into_iter().collect();
        tensions.sort_unstable();
        tensions.dedup();
        self.tensions = tensions;
        self
    }

    /// Parse a chord symbol such as `"Cmaj7"`, `"F#m7b5/C"` or `"G7(b9,#11)"`.
    pub fn parse(symbol: &str) -> Result<Self> {
        let symbol = symbol.trim();
        let err = || Error::ChordParse(symbol.to_string());

        let (body, bass) = match symbol.rsplit_once('/') {
            Some((body, bass)) => (body, Some(parse_note_name(bass).ok_or_else(err)?)),
            None => (symbol, None),
        };

        let mut root_end = body.chars().next().ok_or_else(err)?.len_utf8();
        for (idx, c) in body.char_indices().skip(1) {
            if matches!(c, '#' | 'b' | '♯' | '♭') {
                root_end = idx + c.len_utf8();
            } else {
                break;
            }
        }
        let root = parse_note_name(&body[..root_end]).ok_or_else(err)?;
        let rest = &body[root_end..];

        // "m(maj7)" is a suffix in its own right, not a tension list
        let (suffix, tensions) = match rest.split_once('(') {
            Some(_) if chord_templates::quality_for_suffix(rest).is_some() => (rest, Vec::new()),
            Some((suffix, inner)) => {
                let inner = inner.strip_suffix(')').ok_or_else(err)?;
                let tensions = inner
                    .split(',')
                    .map(|t| chord_templates::tension_interval(t.trim()).ok_or_else(err))
                    .collect::<Result<Vec<u8>>>()?;
                (suffix, tensions)
            }
            None => (rest, Vec::new()),
        };

        let quality = chord_templates::quality_for_suffix(suffix).ok_or_else(err)?;
        let mut chord = Chord::new(root, quality).with_tensions(tensions);
        if let Some(bass) = bass {
            chord = chord.with_bass(bass);
        }
        Ok(chord)
    }

    /// Template tones only, in stacking order.
    pub fn chord_tones(&self) -> Vec<u8> {
        let mut tones = Vec::with_capacity(6);
        for &interval in self.quality.intervals() {
            let pc = (self.root + interval) % 12;
            if !tones.contains(&pc) {
                tones.push(pc);
            }
        }
        tones
    }

    /// Every sounding pitch class: template, tensions, then slash bass.
    pub fn pitch_classes(&self) -> Vec<u8> {
        let mut pcs = self.chord_tones();
        let extra = self
            .tensions
            .iter()
            .map(|&t| (self.root + t) % 12)
            .chain(self.bass);
        for pc in extra {
            if !pcs.contains(&pc) {
                pcs.push(pc);
            }
        }
        pcs
    }

    pub fn bass_pitch_class(&self) -> u8 {
        self.bass.unwrap_or(self.root)
    }

    pub fn contains(&self, pitch_class: u8) -> bool {
        self.pitch_classes().contains(&(pitch_class % 12))
    }

    pub fn transpose(&self, semitones: i32) -> Chord {
        let shift = |pc: u8| (pc as i32 + semitones).rem_euclid(12) as u8;
        Chord {
            root: shift(self.root),
            quality: self.quality,
            tensions: self.tensions.clone(),
            bass: self.bass.map(shift),
        }
    }

    /// Ascending root motion to `next`, in semitones (0..12).
    pub fn root_motion_to(&self, next: &Chord) -> u8 {
        (next.root + 12 - self.root) % 12
    }

    pub fn symbol(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", root_name(self.root), self.quality.suffix())?;
        if !self.tensions.is_empty() {
            let labels: Vec<&str> = self
                .tensions
                .iter()
                .filter_map(|&t| chord_templates::tension_label(t))
                .collect();
            write!(f, "({})", labels.join(","))?;
        }
        if let Some(bass) = self.bass {
            write!(f, "/{}", root_name(bass))?;
        }
        Ok(())
    }
}

/// Chord fields as they arrive from a snapshot, before range checks.
#[derive(Deserialize)]
struct ChordFields {
    root: u8,
    quality: ChordQuality,
    #[serde(default)]
    tensions: Vec<u8>,
    #[serde(default)]
    bass: Option<u8>,
}

impl TryFrom<ChordFields> for Chord {
    type Error = Error;

    fn try_from(fields: ChordFields) -> Result<Self> {
        if fields.root >= 12 {
            let why = format!("root {} is not a pitch class", fields.root);
            return Err(Error::InvalidChord(why));
        }
        if let Some(bass) = fields.bass.filter(|&b| b >= 12) {
            return Err(Error::InvalidChord(format!("bass {} is not a pitch class", bass)));
        }
        if let Some(t) = fields
            .tensions
            .iter()
            .find(|&&t| chord_templates::tension_label(t).is_none())
        {
            return Err(Error::InvalidChord(format!("{} is not a tension interval", t)));
        }
        let mut chord = Chord::new(fields.root, fields.quality).with_tensions(fields.tensions);
        if let Some(bass) = fields.bass {
            chord = chord.with_bass(bass);
        }
        Ok(chord)
    }
}

impl FromStr for Chord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Chord::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    pub fn parallel(&self) -> KeyMode {
        match self {
            KeyMode::Major => KeyMode::Minor,
            KeyMode::Minor => KeyMode::Major,
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

const MAJOR_STEPS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR_STEPS: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];
const HARMONIC_MINOR_STEPS: [u8; 7] = [0, 2, 3, 5, 7, 8, 11];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyFields")]
pub struct Key {
    pub tonic: u8,
    pub mode: KeyMode,
}

#[derive(Deserialize)]
struct KeyFields {
    tonic: u8,
    mode: KeyMode,
}

impl TryFrom<KeyFields> for Key {
    type Error = Error;

    fn try_from(fields: KeyFields) -> Result<Self> {
        if fields.tonic >= 12 {
            let why = format!("tonic {} is not a pitch class", fields.tonic);
            return Err(Error::InvalidKey(why));
        }
        Ok(Key::new(fields.tonic, fields.mode))
    }
}

impl Key {
    pub fn new(tonic: u8, mode: KeyMode) -> Self {
        Self {
            tonic: tonic % 12,
            mode,
        }
    }

    pub fn major(tonic: u8) -> Self {
        Self::new(tonic, KeyMode::Major)
    }

    pub fn minor(tonic: u8) -> Self {
        Self::new(tonic, KeyMode::Minor)
    }

    /// Parse `"C major"`, `"Eb minor"`, `"F#m"`, `"Bb"`.
    pub fn parse(text: &str) -> Result<Self> {
        let err = || Error::KeyParse(text.to_string());
        let mut words = text.split_whitespace();
        let first = words.next().ok_or_else(err)?;
        let mode_word = words.next();
        if words.next().is_some() {
            return Err(err());
        }

        let (tonic, mode) = match mode_word {
            Some(word) => {
                let mode = match word.to_ascii_lowercase().as_str() {
                    "major" | "maj" | "ionian" => KeyMode::Major,
                    "minor" | "min" | "m" | "aeolian" => KeyMode::Minor,
                    _ => return Err(err()),
                };
                (parse_note_name(first).ok_or_else(err)?, mode)
            }
            None => match parse_note_name(first) {
                Some(tonic) => (tonic, KeyMode::Major),
                None => {
                    let stripped = first
                        .strip_suffix("min")
                        .or_else(|| first.strip_suffix('m'))
                        .ok_or_else(err)?;
                    (parse_note_name(stripped).ok_or_else(err)?, KeyMode::Minor)
                }
            },
        };

        Ok(Key::new(tonic, mode))
    }

    pub fn parallel(&self) -> Key {
        Key::new(self.tonic, self.mode.parallel())
    }

    fn steps(&self) -> &'static [u8; 7] {
        match self.mode {
            KeyMode::Major => &MAJOR_STEPS,
            KeyMode::Minor => &NATURAL_MINOR_STEPS,
        }
    }

    /// The seven natural scale pitch classes, tonic first.
    pub fn scale(&self) -> [u8; 7] {
        let mut scale = [0u8; 7];
        for (slot, step) in scale.iter_mut().zip(self.steps()) {
            *slot = (self.tonic + step) % 12;
        }
        scale
    }

    /// Diatonic pitch-class set. Minor keys also admit the raised leading tone.
    pub fn pitch_classes(&self) -> Vec<u8> {
        let mut pcs = self.scale().to_vec();
        if self.mode == KeyMode::Minor {
            pcs.push((self.tonic + 11) % 12);
        }
        pcs
    }

    pub fn contains(&self, pitch_class: u8) -> bool {
        self.pitch_classes().contains(&(pitch_class % 12))
    }

    /// Scale degree (1..=7) of a pitch class, if diatonic.
    pub fn degree_of(&self, pitch_class: u8) -> Option<u8> {
        let pc = pitch_class % 12;
        if let Some(idx) = self.scale().iter().position(|&s| s == pc) {
            return Some(idx as u8 + 1);
        }
        (self.mode == KeyMode::Minor && pc == (self.tonic + 11) % 12).then_some(7)
    }

    /// Natural pitch class of a degree (1..=7).
    pub fn degree_pitch_class(&self, degree: u8) -> Option<u8> {
        (1..=7)
            .contains(&degree)
            .then(|| (self.tonic + self.steps()[degree as usize - 1]) % 12)
    }

    pub fn triad(&self, degree: u8) -> Option<Chord> {
        self.stacked(degree, 3)
    }

    pub fn seventh(&self, degree: u8) -> Option<Chord> {
        self.stacked(degree, 4)
    }

    // V and vii in minor take the raised leading tone.
    fn stacked(&self, degree: u8, notes: usize) -> Option<Chord> {
        if !(1..=7).contains(&degree) {
            return None;
        }
        let steps = match self.mode {
            KeyMode::Minor if degree == 5 || degree == 7 => &HARMONIC_MINOR_STEPS,
            _ => self.steps(),
        };
        let idx = degree as usize - 1;
        let pcs: Vec<u8> = (0..notes)
            .map(|k| (self.tonic + steps[(idx + 2 * k) % 7]) % 12)
            .collect();
        let root = pcs[0];
        let quality =
            chord_templates::quality_for_mask(chord_templates::to_interval_mask(&pcs, root))?;
        Some(Chord::new(root, quality))
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", root_name(self.tonic), self.mode)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Key::parse(s)
    }
}

/// One chord and how many beats it lasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSlot {
    pub chord: Chord,
    pub duration: f64,
}

/// Ordered chords with durations in beats.
///
/// Positions are stable under replacement and shift by one under insertion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChordSlot>", into = "Vec<ChordSlot>")]
pub struct ChordProgression {
    slots: Vec<ChordSlot>,
}

impl ChordProgression {
    pub fn new(slots: Vec<ChordSlot>) -> Result<Self> {
        if let Some(bad) = slots
            .iter()
            .find(|s| !s.duration.is_finite() || s.duration <= 0.0)
        {
            return Err(Error::InvalidProgression(format!(
                "{} has non-positive duration {}",
                bad.chord, bad.duration
            )));
        }
        Ok(Self { slots })
    }

    pub fn from_chords(chords: impl IntoIterator<Item = Chord>, beats: f64) -> Result<Self> {
        Self::new(
            chords
                .into_iter()
                .map(|chord| ChordSlot {
                    chord,
                    duration: beats,
                })
                .collect(),
        )
    }

    pub fn from_symbols(symbols: &[&str], beats: f64) -> Result<Self> {
        let chords = symbols
            .iter()
            .map(|s| Chord::parse(s))
            .collect::<Result<Vec<_>>>()?;
        Self::from_chords(chords, beats)
    }

    /// Parse a whitespace, comma or bar separated list of symbols.
    pub fn parse(text: &str, beats: f64) -> Result<Self> {
        let symbols: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
            .filter(|s| !s.is_empty())
            .collect();
        Self::from_symbols(&symbols, beats)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ChordSlot] {
        &self.slots
    }

    pub fn chord(&self, position: usize) -> Option<&Chord> {
        self.slots.get(position).map(|s| &s.chord)
    }

    pub fn chords(&self) -> impl Iterator<Item = &Chord> + '_ {
        self.slots.iter().map(|s| &s.chord)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.chords().map(Chord::to_string).collect()
    }

    /// Beat at which `position` starts; `len()` gives the total length.
    pub fn onset(&self, position: usize) -> f64 {
        self.slots.iter().take(position).map(|s| s.duration).sum()
    }

    pub fn total_beats(&self) -> f64 {
        self.onset(self.slots.len())
    }

    /// Beat span `[start, end)` of a position.
    pub fn span(&self, position: usize) -> Option<(f64, f64)> {
        let slot = self.slots.get(position)?;
        let start = self.onset(position);
        Some((start, start + slot.duration))
    }

    /// Notes sounding anywhere within `[start, end)` beats.
    pub fn melody_between<'m>(
        melody: &'m [MelodyNote],
        start: f64,
        end: f64,
    ) -> Vec<&'m MelodyNote> {
        melody.iter().filter(|n| n.overlaps(start, end)).collect()
    }

    /// Notes sounding under the chord at `position`.
    pub fn melody_at<'m>(&self, position: usize, melody: &'m [MelodyNote]) -> Vec<&'m MelodyNote> {
        match self.span(position) {
            Some((start, end)) => Self::melody_between(melody, start, end),
            None => Vec::new(),
        }
    }

    pub fn replace(&self, position: usize, chord: Chord) -> Result<Self> {
        self.check_position(position)?;
        let mut slots = self.slots.clone();
        slots[position].chord = chord;
        Ok(Self { slots })
    }

    /// Insert before `position`; the new chord takes the first half of that chord's beats.
    pub fn insert(&self, position: usize, chord: Chord) -> Result<Self> {
        self.check_position(position)?;
        let mut slots = self.slots.clone();
        let half = slots[position].duration / 2.0;
        slots[position].duration = half;
        slots.insert(
            position,
            ChordSlot {
                chord,
                duration: half,
            },
        );
        Ok(Self { slots })
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position >= self.slots.len() {
            return Err(Error::PositionOutOfRange {
                position,
                len: self.slots.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<ChordSlot>> for ChordProgression {
    type Error = Error;

    fn try_from(slots: Vec<ChordSlot>) -> Result<Self> {
        Self::new(slots)
    }
}

impl From<ChordProgression> for Vec<ChordSlot> {
    fn from(progression: ChordProgression) -> Self {
        progression.slots
    }
}

impl fmt::Display for ChordProgression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbols().join(" "))
    }
}

/// A melody note in beats, aligned with the progression's beat grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MelodyNote {
    /// MIDI pitch
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
}

impl MelodyNote {
    pub fn new(pitch: u8, start: f64, duration: f64) -> Self {
        Self {
            pitch,
            start,
            duration,
        }
    }

    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end() > start
    }
}
