//! Concrete voicings and the dynamic-programming voice-leading optimizer.

use reharmconf::VoicingSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::theory::Chord;
use crate::{Error, Result};

const DEGREE_LABELS: [&str; 12] = [
    "R", "b2", "2", "b3", "3", "4", "b5", "5", "#5", "6", "b7", "7",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicedNote {
    /// MIDI pitch
    pub pitch: u8,
    /// 0 is the lowest voice
    pub voice: usize,
    /// Interval label above the chord root ("R", "b3", "5", "b7"...)
    pub degree: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoicingKind {
    Close,
    Open,
    Drop2,
    Rootless,
    Quartal,
    /// One note, for bass lines.
    Single,
}

/// A chord laid out as MIDI pitches, lowest voice first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordVoicing {
    chord: Chord,
    notes: Vec<VoicedNote>,
    kind: VoicingKind,
    /// Octave of the lowest note (MIDI 60 is octave 5)
    register: u8,
    span: u8,
    /// Index of the bass among the chord tones; 0 is root position
    inversion: u8,
}

impl ChordVoicing {
    /// Every pitch must belong to the chord.
    pub fn new(chord: Chord, mut pitches: Vec<u8>, kind: VoicingKind) -> Result<Self> {
        pitches.sort_unstable();
        pitches.dedup();
        let (Some(&low), Some(&high)) = (pitches.first(), pitches.last()) else {
            return Err(Error::InvalidVoicing(format!("{} voiced with no notes", chord)));
        };
        if high > 127 {
            return Err(Error::InvalidVoicing(format!("pitch {} is not a MIDI note", high)));
        }
        let allowed = chord.pitch_classes();
        if let Some(stray) = pitches.iter().find(|p| !allowed.contains(&(*p % 12))) {
            return Err(Error::InvalidVoicing(format!(
                "pitch {} is not in {}",
                stray, chord
            )));
        }

        let notes = pitches
            .iter()
            .enumerate()
            .map(|(voice, &pitch)| VoicedNote {
                pitch,
                voice,
                degree: DEGREE_LABELS[((pitch % 12 + 12 - chord.root) % 12) as usize].to_string(),
            })
            .collect();
        let inversion = chord
            .chord_tones()
            .iter()
            .position(|&pc| pc == low % 12)
            .unwrap_or(0) as u8;

        Ok(Self {
            notes,
            kind,
            register: low / 12,
            span: high - low,
            inversion,
            chord,
        })
    }

    pub fn chord(&self) -> &Chord {
        &self.chord
    }

    pub fn notes(&self) -> &[VoicedNote] {
        &self.notes
    }

    pub fn kind(&self) -> VoicingKind {
        self.kind
    }

    pub fn register(&self) -> u8 {
        self.register
    }

    pub fn span(&self) -> u8 {
        self.span
    }

    pub fn inversion(&self) -> u8 {
        self.inversion
    }

    pub fn pitches(&self) -> Vec<u8> {
        self.notes.iter().map(|n| n.pitch).collect()
    }

    pub fn bass_note(&self) -> u8 {
        self.notes.first().map_or(0, |n| n.pitch)
    }

    /// Semitones between adjacent voices, bottom up.
    pub fn voice_intervals(&self) -> Vec<u8> {
        self.notes
            .windows(2)
            .map(|w| w[1].pitch - w[0].pitch)
            .collect()
    }
}

/// Register limits for generated voicings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicingConstraints {
    pub low: u8,
    pub high: u8,
    pub max_span: u8,
    pub max_candidates: usize,
    /// Voice one chord tone at a time instead of the full chord.
    #[serde(default)]
    pub single_note: bool,
}

impl Default for VoicingConstraints {
    fn default() -> Self {
        Self::piano()
    }
}

impl VoicingConstraints {
    pub fn piano() -> Self {
        Self {
            low: 48,
            high: 84,
            max_span: 24,
            max_candidates: 6,
            single_note: false,
        }
    }

    /// Standard tuning, kept to the first twelve frets.
    pub fn guitar() -> Self {
        Self {
            low: 40,
            high: 76,
            max_span: 19,
            max_candidates: 6,
            single_note: false,
        }
    }

    /// SATB-like range.
    pub fn ensemble() -> Self {
        Self {
            low: 36,
            high: 81,
            max_span: 36,
            max_candidates: 6,
            single_note: false,
        }
    }

    /// Four-string bass, E1 to G3, one note per chord.
    pub fn bass() -> Self {
        Self {
            low: 28,
            high: 55,
            max_span: 12,
            max_candidates: 6,
            single_note: true,
        }
    }

    pub fn for_instrument(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "piano" => Ok(Self::piano()),
            "guitar" => Ok(Self::guitar()),
            "ensemble" => Ok(Self::ensemble()),
            "bass" => Ok(Self::bass()),
            other => Err(Error::InvalidVoicingConstraints(format!(
                "unknown instrument {:?}",
                other
            ))),
        }
    }

    pub fn from_settings(settings: &VoicingSettings) -> Result<Self> {
        let mut constraints = Self::for_instrument(&settings.instrument)?;
        if let Some(low) = settings.low_pitch {
            constraints.low = low;
        }
        if let Some(high) = settings.high_pitch {
            constraints.high = high;
        }
        constraints.max_candidates = settings.max_candidates;
        constraints.validate()?;
        Ok(constraints)
    }

    pub fn validate(&self) -> Result<()> {
        if self.high > 127 || self.low >= self.high {
            return Err(Error::InvalidVoicingConstraints(format!(
                "pitch range {}..={} is empty or outside MIDI",
                self.low, self.high
            )));
        }
        if self.max_candidates == 0 || self.max_span == 0 {
            return Err(Error::InvalidVoicingConstraints(
                "max_candidates and max_span must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Rule-based candidate generator: close, open, drop-2, rootless and quartal.
#[derive(Debug, Clone, Default)]
pub struct VoicingGenerator {
    constraints: VoicingConstraints,
}

impl VoicingGenerator {
    pub fn new(constraints: VoicingConstraints) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &VoicingConstraints {
        &self.constraints
    }

    /// Up to `max_candidates` voicings, nearest the middle of the range first.
    pub fn candidates(&self, chord: &Chord) -> Vec<ChordVoicing> {
        if self.constraints.single_note {
            return self.bass_notes(chord);
        }
        let tones = voiced_tones(chord);
        let mut shapes: Vec<(Vec<u8>, VoicingKind)> = Vec::new();

        for rotation in 0..tones.len() {
            let order: Vec<u8> = tones[rotation..]
                .iter()
                .chain(&tones[..rotation])
                .copied()
                .collect();
            for bottom in self.bottoms(order[0]) {
                let close = stack(bottom, &order);
                if close.len() >= 4 {
                    shapes.push((drop2(&close), VoicingKind::Drop2));
                }
                if close.len() >= 3 {
                    shapes.push((open(&close), VoicingKind::Open));
                }
                shapes.push((close, VoicingKind::Close));
            }
        }

        if tones.len() >= 4 && chord.bass.is_none() {
            let upper: Vec<u8> = tones.iter().copied().filter(|&pc| pc != chord.root).collect();
            for rotation in 0..upper.len().min(2) {
                let order: Vec<u8> = upper[rotation..]
                    .iter()
                    .chain(&upper[..rotation])
                    .copied()
                    .collect();
                for bottom in self.bottoms(order[0]) {
                    shapes.push((stack(bottom, &order), VoicingKind::Rootless));
                }
            }
        }

        for &start in &tones {
            let fourths: Vec<u8> = (0..tones.len().clamp(3, 4) as u8)
                .map(|k| (start + 5 * k) % 12)
                .collect();
            if fourths.iter().all(|&pc| chord.contains(pc)) {
                for bottom in self.bottoms(start) {
                    let pitches = (0..fourths.len() as u8).map(|k| bottom + 5 * k).collect();
                    shapes.push((pitches, VoicingKind::Quartal));
                }
            }
        }

        let c = self.constraints;
        let mut seen = HashSet::new();
        let mut out: Vec<ChordVoicing> = shapes
            .into_iter()
            .filter(|(pitches, _)| {
                let (lo, hi) = (pitches.iter().min(), pitches.iter().max());
                match (lo, hi) {
                    (Some(&lo), Some(&hi)) => {
                        lo >= c.low
                            && hi <= c.high
                            && hi - lo <= c.max_span
                            && chord.bass.map_or(true, |b| lo % 12 == b)
                    }
                    _ => false,
                }
            })
            .filter_map(|(pitches, kind)| ChordVoicing::new(chord.clone(), pitches, kind).ok())
            .filter(|v| seen.insert(v.pitches()))
            .collect();

        let centre = (c.low as f64 + c.high as f64) / 2.0;
        let distance = |v: &ChordVoicing| {
            let pitches = v.pitches();
            let mean = pitches.iter().map(|&p| p as f64).sum::<f64>() / pitches.len() as f64;
            (mean - centre).abs()
        };
        out.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        out.truncate(c.max_candidates);
        debug!(chord = %chord, candidates = out.len(), "generated voicings");
        out
    }

    /// The bass pitch in every octave first, then the fifth and third.
    /// Leaps between them are left to the optimizer's motion cost.
    fn bass_notes(&self, chord: &Chord) -> Vec<ChordVoicing> {
        let mut pitch_classes = vec![chord.bass_pitch_class()];
        if chord.bass.is_none() {
            let tones = chord.chord_tones();
            pitch_classes.extend(tones.get(2).into_iter().chain(tones.get(1)).copied());
        }

        let centre = (self.constraints.low as f64 + self.constraints.high as f64) / 2.0;
        let distance = |p: &u8| (*p as f64 - centre).abs();
        let mut out = Vec::new();
        for pc in pitch_classes {
            let mut pitches: Vec<u8> = self.bottoms(pc).collect();
            pitches.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
            out.extend(
                pitches
                    .into_iter()
                    .filter_map(|p| {
                        ChordVoicing::new(chord.clone(), vec![p], VoicingKind::Single).ok()
                    }),
            );
        }
        out.truncate(self.constraints.max_candidates);
        debug!(chord = %chord, candidates = out.len(), "generated bass notes");
        out
    }

    fn bottoms(&self, pitch_class: u8) -> impl Iterator<Item = u8> {
        let (low, high) = (self.constraints.low, self.constraints.high);
        (low..=high).filter(move |p| p % 12 == pitch_class)
    }
}

// Chord tones to voice: drop the fifth from five-plus note chords, keep a slash bass.
fn voiced_tones(chord: &Chord) -> Vec<u8> {
    let mut tones = chord.chord_tones();
    if tones.len() > 4 {
        let fifth = (chord.root + 7) % 12;
        tones.retain(|&pc| pc != fifth);
    }
    if let Some(bass) = chord.bass {
        tones.retain(|&pc| pc != bass);
        tones.insert(0, bass);
    }
    tones
}

fn stack(bottom: u8, order: &[u8]) -> Vec<u8> {
    let mut pitches = Vec::with_capacity(order.len());
    let mut prev = bottom;
    pitches.push(bottom);
    for &pc in &order[1..] {
        let mut up = (pc + 12 - prev % 12) % 12;
        if up == 0 {
            up = 12;
        }
        prev = prev.saturating_add(up);
        pitches.push(prev);
    }
    pitches
}

fn drop2(close: &[u8]) -> Vec<u8> {
    let mut pitches = close.to_vec();
    let idx = pitches.len() - 2;
    pitches[idx] = pitches[idx].saturating_sub(12);
    pitches.sort_unstable();
    pitches
}

fn open(close: &[u8]) -> Vec<u8> {
    let mut pitches = close.to_vec();
    pitches[1] = pitches[1].saturating_add(12);
    pitches.sort_unstable();
    pitches
}

/// The chosen voicing per chord and what the path scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicingPlan {
    pub voicings: Vec<ChordVoicing>,
    pub total_quality: f64,
    pub transitions_evaluated: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VoicingOptimizer;

impl VoicingOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Pick one voicing per chord maximizing summed transition quality.
    ///
    /// `best[0][j] = 1.0`; `best[i][j] = max_k best[i-1][k] + pairwise(k, j)`.
    pub fn optimize(&self, candidates: &[Vec<ChordVoicing>]) -> Result<VoicingPlan> {
        if let Some(i) = candidates.iter().position(Vec::is_empty) {
            return Err(Error::InvalidVoicing(format!("no voicing candidates for chord {}", i)));
        }
        if candidates.is_empty() {
            return Ok(VoicingPlan {
                voicings: Vec::new(),
                total_quality: 0.0,
                transitions_evaluated: 0,
            });
        }

        let mut best: Vec<Vec<f64>> = vec![vec![1.0; candidates[0].len()]];
        let mut back: Vec<Vec<usize>> = vec![vec![0; candidates[0].len()]];
        let mut transitions = 0;

        for i in 1..candidates.len() {
            let mut scores = Vec::with_capacity(candidates[i].len());
            let mut from = Vec::with_capacity(candidates[i].len());
            for to in &candidates[i] {
                let mut winner = (f64::NEG_INFINITY, 0);
                for (k, prev) in candidates[i - 1].iter().enumerate() {
                    let score = best[i - 1][k] + pairwise_quality(prev, to);
                    transitions += 1;
                    if score > winner.0 {
                        winner = (score, k);
                    }
                }
                scores.push(winner.0);
                from.push(winner.1);
            }
            best.push(scores);
            back.push(from);
        }

        let last = best.len() - 1;
        let (mut j, total_quality) = best[last]
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (j, s)| if s > acc.1 { (j, s) } else { acc });

        let mut picked = vec![0; candidates.len()];
        for i in (0..candidates.len()).rev() {
            picked[i] = j;
            j = back[i][j];
        }
        let voicings = picked
            .iter()
            .enumerate()
            .map(|(i, &j)| candidates[i][j].clone())
            .collect();

        info!(
            chords = candidates.len(),
            transitions,
            total_quality,
            "voicing path chosen"
        );
        Ok(VoicingPlan {
            voicings,
            total_quality,
            transitions_evaluated: transitions,
        })
    }

    /// Candidates from `generator` for every chord, then [`optimize`](Self::optimize).
    pub fn voice<'a>(
        &self,
        chords: impl IntoIterator<Item = &'a Chord>,
        generator: &VoicingGenerator,
    ) -> Result<VoicingPlan> {
        let candidates: Vec<Vec<ChordVoicing>> =
            chords.into_iter().map(|c| generator.candidates(c)).collect();
        self.optimize(&candidates)
    }
}

/// Transition quality between two voicings, voices aligned bottom up.
///
/// Half from small total motion, a quarter each from stepwise and held
/// voices, minus a quarter per parallel fifth or octave.
pub fn pairwise_quality(from: &ChordVoicing, to: &ChordVoicing) -> f64 {
    let a = padded(from, to.notes.len());
    let b = padded(to, from.notes.len());
    let n = a.len() as f64;

    let motion: Vec<i32> = a.iter().zip(&b).map(|(&x, &y)| y - x).collect();
    let average = motion.iter().map(|m| m.abs() as f64).sum::<f64>() / n;
    let steps = motion.iter().filter(|m| (1..=2).contains(&m.abs())).count() as f64;
    let held = motion.iter().filter(|&&m| m == 0).count() as f64;

    let mut parallels = 0;
    for i in 0..a.len() {
        for j in i + 1..a.len() {
            let before = (a[j] - a[i]).rem_euclid(12);
            let after = (b[j] - b[i]).rem_euclid(12);
            let perfect = before == after && (before == 0 || before == 7);
            let same_direction = motion[i] != 0 && motion[i].signum() == motion[j].signum();
            if perfect && same_direction {
                parallels += 1;
            }
        }
    }

    0.5 * (1.0 - average / 12.0).max(0.0) + 0.25 * steps / n + 0.25 * held / n
        - 0.25 * parallels as f64
}

// Pitches padded to `len` voices by repeating the top note.
fn padded(voicing: &ChordVoicing, len: usize) -> Vec<i32> {
    let mut pitches: Vec<i32> = voicing.notes.iter().map(|n| n.pitch as i32).collect();
    let top = pitches.last().copied().unwrap_or(0);
    while pitches.len() < len {
        pitches.push(top);
    }
    pitches
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chord(symbol: &str) -> Chord {
        Chord::parse(symbol).unwrap()
    }

    fn voicing(symbol: &str, pitches: &[u8]) -> ChordVoicing {
        ChordVoicing::new(chord(symbol), pitches.to_vec(), VoicingKind::Close).unwrap()
    }

    #[test]
    fn derived_fields() {
        let v = voicing("C", &[64, 67, 72]);
        assert_eq!(v.bass_note(), 64);
        assert_eq!(v.voice_intervals(), vec![3, 5]);
        assert_eq!(v.inversion(), 1);
        assert_eq!(v.span(), 8);
        assert_eq!(v.register(), 5);
        let degrees: Vec<&str> = v.notes().iter().map(|n| n.degree.as_str()).collect();
        assert_eq!(degrees, vec!["3", "5", "R"]);
    }

    #[test]
    fn rejects_foreign_pitches() {
        assert!(ChordVoicing::new(chord("C"), vec![60, 62], VoicingKind::Close).is_err());
        assert!(ChordVoicing::new(chord("C"), vec![], VoicingKind::Close).is_err());
    }

    #[test]
    fn candidates_respect_constraints() {
        let generator = VoicingGenerator::new(VoicingConstraints::piano());
        for symbol in ["Cmaj7", "G7", "Am", "Fsus4", "Dm7", "C/E", "G13"] {
            let c = chord(symbol);
            let found = generator.candidates(&c);
            assert!(!found.is_empty(), "{}", symbol);
            assert!(found.len() <= 6);
            for v in &found {
                let p = v.pitches();
                assert!(p.iter().all(|&x| (48..=84).contains(&x)));
                assert!(v.span() <= 24);
                if let Some(bass) = c.bass {
                    assert_eq!(v.bass_note() % 12, bass);
                }
            }
        }
    }

    #[test]
    fn seventh_chords_get_drop2_and_rootless() {
        let generator = VoicingGenerator::new(VoicingConstraints {
            max_candidates: 200,
            ..VoicingConstraints::piano()
        });
        let kinds: HashSet<VoicingKind> =
            generator.candidates(&chord("Dm7")).iter().map(|v| v.kind()).collect();
        assert!(kinds.contains(&VoicingKind::Drop2));
        assert!(kinds.contains(&VoicingKind::Rootless));
        assert!(kinds.contains(&VoicingKind::Close));

        let sus = generator.candidates(&chord("Csus4"));
        assert!(sus.iter().any(|v| v.kind() == VoicingKind::Quartal));
    }

    #[test]
    fn instrument_settings() {
        let settings = VoicingSettings {
            instrument: "guitar".into(),
            high_pitch: Some(72),
            ..VoicingSettings::default()
        };
        let c = VoicingConstraints::from_settings(&settings).unwrap();
        assert_eq!((c.low, c.high, c.max_span), (40, 72, 19));

        let unknown = VoicingSettings {
            instrument: "theremin".into(),
            ..VoicingSettings::default()
        };
        assert!(matches!(
            VoicingConstraints::from_settings(&unknown),
            Err(Error::InvalidVoicingConstraints(_))
        ));
    }

    #[test]
    fn bass_voices_one_chord_tone() {
        let generator = VoicingGenerator::new(VoicingConstraints::for_instrument("bass").unwrap());
        for symbol in ["C", "G7", "Am", "Bdim", "C/E"] {
            let c = chord(symbol);
            let found = generator.candidates(&c);
            assert!(!found.is_empty(), "{}", symbol);
            assert!(found.len() <= 6);
            for v in &found {
                assert_eq!(v.kind(), VoicingKind::Single);
                assert_eq!(v.pitches().len(), 1);
                assert!((28..=55).contains(&v.bass_note()), "{} in {}", v.bass_note(), symbol);
            }
            assert_eq!(found[0].bass_note() % 12, c.bass_pitch_class());
        }
        let slash = generator.candidates(&chord("C/E"));
        assert!(slash.iter().all(|v| v.bass_note() % 12 == 4));

        // G is the fifth of C and the root of G, so the line can hold it
        let progression = [chord("C"), chord("G"), chord("C")];
        let plan = VoicingOptimizer::new().voice(&progression, &generator).unwrap();
        let line: Vec<u8> = plan.voicings.iter().map(|v| v.bass_note()).collect();
        assert_eq!(line, vec![43, 43, 43]);
        assert!((plan.total_quality - 2.5).abs() < 1e-9);
    }

    #[test]
    fn held_voices_beat_leaps() {
        let c = voicing("C", &[60, 64, 67]);
        let same = voicing("C", &[60, 64, 67]);
        let leap = voicing("C", &[72, 76, 79]);
        assert!((pairwise_quality(&c, &same) - 0.75).abs() < 1e-9);
        // octave leap: no motion credit and a parallel fifth
        assert!(pairwise_quality(&c, &leap) < 0.0);
    }

    #[test]
    fn dp_beats_greedy() {
        let columns = vec![
            vec![voicing("C", &[60, 64]), voicing("C", &[55, 60])],
            vec![voicing("C", &[60, 64]), voicing("C", &[55, 60])],
            vec![voicing("G", &[55, 59]), voicing("G", &[62, 67])],
        ];
        let plan = VoicingOptimizer::new().optimize(&columns).unwrap();
        assert_eq!(plan.transitions_evaluated, 8);

        let chosen: Vec<Vec<u8>> = plan.voicings.iter().map(|v| v.pitches()).collect();
        assert_eq!(chosen, vec![vec![55, 60], vec![55, 60], vec![55, 59]]);

        // greedy from the first candidate: stay on C-E, then take the best next step
        let greedy = 1.0
            + pairwise_quality(&columns[0][0], &columns[1][0])
            + pairwise_quality(&columns[1][0], &columns[2][1]);
        assert!(plan.total_quality > greedy);
        assert!((plan.total_quality - (1.0 + 0.75 + 0.5 * (23.0 / 24.0) + 0.25)).abs() < 1e-9);
    }

    #[test]
    fn empty_column_is_an_error() {
        let columns = vec![vec![voicing("C", &[60, 64, 67])], Vec::new()];
        assert!(VoicingOptimizer::new().optimize(&columns).is_err());
        assert!(VoicingOptimizer::new().optimize(&[]).unwrap().voicings.is_empty());
    }
}
