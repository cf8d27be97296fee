use std::ops::Range;

use super::{finish, Strategy, StrategyContext, StrategyKind};
use crate::analysis::HarmonicFunction;
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::Chord;

/// Dominant chords replaced by the dominant a tritone away.
#[derive(Debug, Clone, Copy, Default)]
pub struct TritoneSubstitution;

const CONFIDENCE_CAP: f64 = 0.80;

fn bass_distance(a: &Chord, b: &Chord) -> u8 {
    let d = (b.bass_pitch_class() + 12 - a.bass_pitch_class()) % 12;
    d.min(12 - d)
}

impl Strategy for TritoneSubstitution {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TritoneSubstitution
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let mut out = Vec::new();

        for i in window {
            let (Some(current), Some(analysis)) = (ctx.chord(i), ctx.analyze(i)) else {
                continue;
            };
            if !current.quality.is_dominant() {
                continue;
            }
            let primary = analysis.function == HarmonicFunction::Dominant;
            if !primary && analysis.function != HarmonicFunction::SecondaryDominant {
                continue;
            }

            let sub = Chord::new(current.root + 6, current.quality)
                .with_tensions(current.tensions.iter().copied());
            let next = ctx.chord(i + 1);

            let mut confidence: f64 = 0.65;
            if primary {
                confidence += 0.05;
            }
            if next.is_some_and(|n| current.root_motion_to(n) == 5) {
                confidence += 0.05;
            }
            if ctx.style.rules().extended_harmony {
                confidence += 0.05;
            }
            confidence = confidence.min(CONFIDENCE_CAP);

            // the substitute's b9 against the melody
            let clash_pc = (sub.root + 1) % 12;
            let clashes = ctx
                .melody_at(i)
                .iter()
                .any(|n| n.pitch_class() == clash_pc);
            if clashes {
                confidence *= 0.05;
            }

            let mut voice_leading = 0.85;
            if let Some(next) = next {
                if bass_distance(&sub, next) < bass_distance(current, next) {
                    voice_leading += 0.1;
                }
            }

            let draft = SuggestionDraft::replacement(
                i,
                current.clone(),
                sub.clone(),
                StrategyKind::TritoneSubstitution,
                SubstitutionType::TritoneSubstitution,
            )
            .confidence(confidence)
            .voice_leading(voice_leading)
            .reasoning(format!(
                "{} shares the tritone of {} ({})",
                sub, current, analysis.roman_numeral
            ));
            out.extend(finish(draft));
        }
        out
    }
}
