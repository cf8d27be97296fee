use crate::theory::ChordQuality;

/// A chord template: quality + intervals above the root, plus a pitch-class bitmask.
pub struct ChordTemplate {
    pub quality: ChordQuality,
    pub suffix: &'static str,
    /// Semitones above the root; extensions keep their compound interval (9th = 14).
    pub intervals: &'static [u8],
    pub mask: u16, // bit i set means pitch class root+i is in the chord
}

impl ChordTemplate {
    const fn new(quality: ChordQuality, suffix: &'static str, intervals: &'static [u8]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << (intervals[i] % 12);
            i += 1;
        }
        Self {
            quality,
            suffix,
            intervals,
            mask,
        }
    }
}

/// Every quality the engine can name, one template each.
pub static TEMPLATES: &[ChordTemplate] = &[
    ChordTemplate::new(ChordQuality::Major, "", &[0, 4, 7]),
    ChordTemplate::new(ChordQuality::Minor, "m", &[0, 3, 7]),
    ChordTemplate::new(ChordQuality::Diminished, "dim", &[0, 3, 6]),
    ChordTemplate::new(ChordQuality::Augmented, "aug", &[0, 4, 8]),
    ChordTemplate::new(ChordQuality::Suspended2, "sus2", &[0, 2, 7]),
    ChordTemplate::new(ChordQuality::Suspended4, "sus4", &[0, 5, 7]),
    ChordTemplate::new(ChordQuality::Dominant7, "7", &[0, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Major7, "maj7", &[0, 4, 7, 11]),
    ChordTemplate::new(ChordQuality::Minor7, "m7", &[0, 3, 7, 10]),
    ChordTemplate::new(ChordQuality::MinorMajor7, "m(maj7)", &[0, 3, 7, 11]),
    ChordTemplate::new(ChordQuality::Diminished7, "dim7", &[0, 3, 6, 9]),
    ChordTemplate::new(ChordQuality::HalfDiminished7, "m7b5", &[0, 3, 6, 10]),
    ChordTemplate::new(ChordQuality::Major6, "6", &[0, 4, 7, 9]),
    ChordTemplate::new(ChordQuality::Minor6, "m6", &[0, 3, 7, 9]),
    ChordTemplate::new(ChordQuality::Dominant9, "9", &[0, 4, 7, 10, 14]),
    ChordTemplate::new(ChordQuality::Major9, "maj9", &[0, 4, 7, 11, 14]),
    ChordTemplate::new(ChordQuality::Minor9, "m9", &[0, 3, 7, 10, 14]),
    ChordTemplate::new(ChordQuality::Dominant13, "13", &[0, 4, 7, 10, 14, 21]),
    ChordTemplate::new(ChordQuality::Add9, "add9", &[0, 4, 7, 14]),
];

/// Alternate spellings accepted by the parser, beyond each template's canonical suffix.
static SUFFIX_ALIASES: &[(&str, ChordQuality)] = &[
    ("maj", ChordQuality::Major),
    ("M", ChordQuality::Major),
    ("min", ChordQuality::Minor),
    ("-", ChordQuality::Minor),
    ("o", ChordQuality::Diminished),
    ("°", ChordQuality::Diminished),
    ("+", ChordQuality::Augmented),
    ("sus", ChordQuality::Suspended4),
    ("dom7", ChordQuality::Dominant7),
    ("M7", ChordQuality::Major7),
    ("Δ", ChordQuality::Major7),
    ("Δ7", ChordQuality::Major7),
    ("min7", ChordQuality::Minor7),
    ("-7", ChordQuality::Minor7),
    ("mMaj7", ChordQuality::MinorMajor7),
    ("mmaj7", ChordQuality::MinorMajor7),
    ("o7", ChordQuality::Diminished7),
    ("°7", ChordQuality::Diminished7),
    ("ø", ChordQuality::HalfDiminished7),
    ("ø7", ChordQuality::HalfDiminished7),
    ("min6", ChordQuality::Minor6),
    ("M9", ChordQuality::Major9),
    ("min9", ChordQuality::Minor9),
];

/// Parenthesized tension labels and their compound interval above the root.
pub static TENSIONS: &[(&str, u8)] = &[
    ("b9", 13),
    ("9", 14),
    ("#9", 15),
    ("11", 17),
    ("#11", 18),
    ("b13", 20),
    ("13", 21),
];

const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Pitch classes conventionally spelled with flats.
pub static FLAT_KEY_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10];

pub fn note_name(pitch_class: u8, use_flats: bool) -> &'static str {
    let idx = (pitch_class % 12) as usize;
    if use_flats {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_SHARP[idx]
    }
}

/// Spell a chord root the way lead sheets do: black keys as flats.
pub fn root_name(pitch_class: u8) -> &'static str {
    note_name(pitch_class, FLAT_KEY_ROOTS.contains(&(pitch_class % 12)))
}

pub fn template(quality: ChordQuality) -> &'static ChordTemplate {
    TEMPLATES
        .iter()
        .find(|t| t.quality == quality)
        .unwrap_or(&TEMPLATES[0])
}

/// Exact suffix lookup, canonical spellings first.
pub fn quality_for_suffix(suffix: &str) -> Option<ChordQuality> {
    TEMPLATES
        .iter()
        .find(|t| t.suffix == suffix)
        .map(|t| t.quality)
        .or_else(|| {
            SUFFIX_ALIASES
                .iter()
                .find(|(alias, _)| *alias == suffix)
                .map(|(_, q)| *q)
        })
}

/// Identify a quality from the exact set of intervals above a root.
pub fn quality_for_mask(mask: u16) -> Option<ChordQuality> {
    TEMPLATES.iter().find(|t| t.mask == mask).map(|t| t.quality)
}

/// Convert a set of pitch classes to an interval bitmask relative to a root.
pub fn to_interval_mask(pitch_classes: &[u8], root: u8) -> u16 {
    let mut mask = 0u16;
    for &pc in pitch_classes {
        let interval = (pc % 12 + 12 - root % 12) % 12;
        mask |= 1 << interval;
    }
    mask
}

/// Parse a bare note name ("C", "F#", "Bb", "Ebb") into a pitch class.
pub fn parse_note_name(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let base: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let mut offset = 0i32;
    for c in chars {
        match c {
            '#' | '♯' => offset += 1,
            'b' | '♭' => offset -= 1,
            _ => return None,
        }
    }
    Some((base + offset).rem_euclid(12) as u8)
}

pub fn tension_label(interval: u8) -> Option<&'static str> {
    TENSIONS
        .iter()
        .find(|(_, i)| *i == interval)
        .map(|(label, _)| *label)
}

pub fn tension_interval(label: &str) -> Option<u8> {
    TENSIONS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, i)| *i)
}
