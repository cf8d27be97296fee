//! Functional harmony analysis: roman numerals and harmonic function.

use serde::{Deserialize, Serialize};

use crate::theory::{Chord, ChordQuality, Key, KeyMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonicFunction {
    Tonic,
    Subdominant,
    Dominant,
    SecondaryDominant,
    Modal,
    Borrowed,
    Chromatic,
}

impl HarmonicFunction {
    /// Function a diatonic chord gets from its scale degree.
    pub fn for_degree(degree: u8) -> Option<HarmonicFunction> {
        match degree {
            1 | 3 | 6 => Some(HarmonicFunction::Tonic),
            2 | 4 => Some(HarmonicFunction::Subdominant),
            5 | 7 => Some(HarmonicFunction::Dominant),
            _ => None,
        }
    }
}

/// Tonic / subdominant / dominant grouping used for adjacency rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionalRole {
    Tonic,
    Subdominant,
    Dominant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordAnalysis {
    pub roman_numeral: String,
    pub function: HarmonicFunction,
    pub is_diatonic: bool,
    pub is_borrowed: bool,
    /// Degree of the root in the key (or its parallel, for borrowed chords)
    pub scale_degree: Option<u8>,
    /// 0.0–1.0, how strongly the chord asserts its function
    pub functional_strength: f64,
}

impl ChordAnalysis {
    /// T/S/D role; borrowed chords keep the role of their degree.
    pub fn role(&self) -> Option<FunctionalRole> {
        let function = match self.function {
            HarmonicFunction::Borrowed => self.scale_degree.and_then(HarmonicFunction::for_degree)?,
            HarmonicFunction::SecondaryDominant => HarmonicFunction::Dominant,
            other => other,
        };
        match function {
            HarmonicFunction::Tonic => Some(FunctionalRole::Tonic),
            HarmonicFunction::Subdominant => Some(FunctionalRole::Subdominant),
            HarmonicFunction::Dominant => Some(FunctionalRole::Dominant),
            _ => None,
        }
    }
}

/// Trait for harmony analysis backends.
///
/// The engine only consumes analyses; `DiatonicAnalyzer` is the built-in
/// rule-based implementation.
pub trait HarmonyAnalyzer: Send + Sync {
    fn analyze(&self, chord: &Chord, key: &Key) -> ChordAnalysis;
}

/// Rule-based analyzer: scale-degree functions, parallel-mode borrowing,
/// secondary dominants and church-mode colour chords.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiatonicAnalyzer;

const ROMAN: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Chromatic offset from the tonic to (degree index, accidental) against the major scale.
const CHROMATIC_DEGREES: [(usize, &str); 12] = [
    (0, ""),
    (1, "b"),
    (1, ""),
    (2, "b"),
    (2, ""),
    (3, ""),
    (3, "#"),
    (4, ""),
    (5, "b"),
    (5, ""),
    (6, "b"),
    (6, ""),
];

/// Rotations of the major scale that colour-chord analysis accepts.
const MODE_STEPS: [[u8; 7]; 4] = [
    [0, 2, 3, 5, 7, 9, 10], // dorian
    [0, 1, 3, 5, 7, 8, 10], // phrygian
    [0, 2, 4, 6, 7, 9, 11], // lydian
    [0, 2, 4, 5, 7, 9, 10], // mixolydian
];

fn degree_strength(degree: u8) -> f64 {
    match degree {
        1 | 5 => 1.0,
        4 => 0.9,
        2 => 0.8,
        6 | 7 => 0.7,
        _ => 0.5,
    }
}

fn numeral(chord: &Chord, index: usize, accidental: &str) -> String {
    let base = ROMAN[index % 7];
    let upper = chord.quality.has_major_third() || chord.quality.is_suspended();
    let body = if upper {
        base.to_string()
    } else {
        base.to_lowercase()
    };
    let suffix = match chord.quality {
        ChordQuality::Diminished => "°",
        ChordQuality::Diminished7 => "°7",
        ChordQuality::HalfDiminished7 => "ø7",
        ChordQuality::Augmented => "+",
        ChordQuality::Major7 | ChordQuality::Major9 | ChordQuality::MinorMajor7 => "maj7",
        ChordQuality::Suspended2 => "sus2",
        ChordQuality::Suspended4 => "sus4",
        q if q.is_seventh() => "7",
        ChordQuality::Major6 | ChordQuality::Minor6 => "6",
        _ => "",
    };
    format!("{}{}{}", accidental, body, suffix)
}

fn chromatic_numeral(chord: &Chord, key: &Key) -> String {
    let offset = ((chord.root + 12 - key.tonic) % 12) as usize;
    let (index, accidental) = CHROMATIC_DEGREES[offset];
    numeral(chord, index, accidental)
}

fn all_in(tones: &[u8], scale: &[u8]) -> bool {
    tones.iter().all(|t| scale.contains(t))
}

impl DiatonicAnalyzer {
    fn secondary_target(chord: &Chord, key: &Key) -> Option<u8> {
        let dominant_shape = chord.quality == ChordQuality::Major || chord.quality.is_dominant();
        if !dominant_shape {
            return None;
        }
        let target = key.degree_of((chord.root + 5) % 12)?;
        // V/I is just V; vii° cannot be tonicized
        let target_triad = key.triad(target)?;
        (target != 1 && target_triad.quality != ChordQuality::Diminished).then_some(target)
    }
}

impl HarmonyAnalyzer for DiatonicAnalyzer {
    fn analyze(&self, chord: &Chord, key: &Key) -> ChordAnalysis {
        let tones = chord.chord_tones();

        if all_in(&tones, &key.pitch_classes()) {
            if let Some(degree) = key.degree_of(chord.root) {
                let function =
                    HarmonicFunction::for_degree(degree).unwrap_or(HarmonicFunction::Chromatic);
                return ChordAnalysis {
                    roman_numeral: numeral(chord, degree as usize - 1, ""),
                    function,
                    is_diatonic: true,
                    is_borrowed: false,
                    scale_degree: Some(degree),
                    functional_strength: degree_strength(degree),
                };
            }
        }

        if let Some(target) = Self::secondary_target(chord, key) {
            let head = if chord.quality.is_dominant() { "V7" } else { "V" };
            let target_numeral = key
                .triad(target)
                .map(|t| numeral(&t, target as usize - 1, ""))
                .unwrap_or_default();
            return ChordAnalysis {
                roman_numeral: format!("{}/{}", head, target_numeral),
                function: HarmonicFunction::SecondaryDominant,
                is_diatonic: false,
                is_borrowed: false,
                scale_degree: None,
                functional_strength: 0.75,
            };
        }

        let parallel = key.parallel();
        if all_in(&tones, &parallel.pitch_classes()) {
            if let Some(degree) = parallel.degree_of(chord.root) {
                return ChordAnalysis {
                    roman_numeral: chromatic_numeral(chord, key),
                    function: HarmonicFunction::Borrowed,
                    is_diatonic: false,
                    is_borrowed: true,
                    scale_degree: Some(degree),
                    functional_strength: 0.6,
                };
            }
        }

        let modal = MODE_STEPS.iter().any(|steps| {
            let scale: Vec<u8> = steps.iter().map(|s| (key.tonic + s) % 12).collect();
            all_in(&tones, &scale)
        });

        ChordAnalysis {
            roman_numeral: chromatic_numeral(chord, key),
            function: if modal {
                HarmonicFunction::Modal
            } else {
                HarmonicFunction::Chromatic
            },
            is_diatonic: false,
            is_borrowed: false,
            scale_degree: None,
            functional_strength: if modal { 0.4 } else { 0.2 },
        }
    }
}

/// Whether `chord` belongs to the key's diatonic set, independent of any analyzer.
pub fn is_diatonic(chord: &Chord, key: &Key) -> bool {
    all_in(&chord.chord_tones(), &key.pitch_classes())
}

/// Whether the key is minor; a convenience for strategies.
pub fn is_minor(key: &Key) -> bool {
    key.mode == KeyMode::Minor
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn analyze(symbol: &str, key: &str) -> ChordAnalysis {
        DiatonicAnalyzer.analyze(&Chord::parse(symbol).unwrap(), &Key::parse(key).unwrap())
    }

    #[test]
    fn diatonic_functions_in_c_major() {
        let cases = [
            ("Cmaj7", "Imaj7", HarmonicFunction::Tonic),
            ("Dm7", "ii7", HarmonicFunction::Subdominant),
            ("Em", "iii", HarmonicFunction::Tonic),
            ("F", "IV", HarmonicFunction::Subdominant),
            ("G7", "V7", HarmonicFunction::Dominant),
            ("Am7", "vi7", HarmonicFunction::Tonic),
            ("Bm7b5", "viiø7", HarmonicFunction::Dominant),
        ];
        for (symbol, roman, function) in cases {
            let analysis = analyze(symbol, "C major");
            assert_eq!(analysis.roman_numeral, roman, "{}", symbol);
            assert_eq!(analysis.function, function, "{}", symbol);
            assert!(analysis.is_diatonic);
        }
    }

    #[test]
    fn secondary_dominant() {
        let analysis = analyze("A7", "C major");
        assert_eq!(analysis.function, HarmonicFunction::SecondaryDominant);
        assert_eq!(analysis.roman_numeral, "V7/ii");
        assert_eq!(analysis.role(), Some(FunctionalRole::Dominant));
    }

    #[test]
    fn borrowed_from_parallel_minor() {
        let analysis = analyze("Fm", "C major");
        assert!(analysis.is_borrowed);
        assert_eq!(analysis.function, HarmonicFunction::Borrowed);
        assert_eq!(analysis.roman_numeral, "iv");
        assert_eq!(analysis.role(), Some(FunctionalRole::Subdominant));

        let flat_six = analyze("Ab", "C major");
        assert_eq!(flat_six.roman_numeral, "bVI");
    }

    #[test]
    fn neapolitan_is_modal_colour() {
        let analysis = analyze("Db", "C major");
        assert_eq!(analysis.function, HarmonicFunction::Modal);
        assert_eq!(analysis.roman_numeral, "bII");
        assert_eq!(analysis.role(), None);
    }

    #[test]
    fn tritone_sub_is_chromatic() {
        let analysis = analyze("Db7", "C major");
        assert_eq!(analysis.function, HarmonicFunction::Chromatic);
        assert!(!analysis.is_diatonic);
        assert_eq!(analysis.functional_strength, 0.2);
    }

    #[test]
    fn minor_key_dominant_uses_leading_tone() {
        let analysis = analyze("E7", "A minor");
        assert!(analysis.is_diatonic);
        assert_eq!(analysis.roman_numeral, "V7");
        assert_eq!(analysis.function, HarmonicFunction::Dominant);
    }
}
