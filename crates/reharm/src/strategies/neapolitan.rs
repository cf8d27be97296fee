use std::ops::Range;

use super::{finish, voice_leading_quality, Strategy, StrategyContext, StrategyKind};
use crate::analysis::{is_minor, FunctionalRole};
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::{Chord, ChordQuality};

/// The major triad on the lowered second degree, as a pre-dominant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neapolitan;

const CONFIDENCE_CAP: f64 = 0.65;
const CLASH_CONFIDENCE: f64 = 0.05;

impl Strategy for Neapolitan {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Neapolitan
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let root = (ctx.key.tonic + 1) % 12;
        // the natural second degree against the lowered root is a minor ninth
        let clash_pc = (ctx.key.tonic + 2) % 12;
        let prefer_inversion = ctx.style.rules().prefer_neapolitan_inversion;
        let mut out = Vec::new();

        for i in window {
            let Some(current) = ctx.chord(i) else { continue };
            let role = ctx.analyze(i).and_then(|a| a.role());
            let next_is_dominant = ctx
                .analyze(i + 1)
                .is_some_and(|a| a.role() == Some(FunctionalRole::Dominant));

            let predominant = role == Some(FunctionalRole::Subdominant);
            if !predominant && !(next_is_dominant && role != Some(FunctionalRole::Dominant)) {
                continue;
            }

            let clashes = ctx
                .melody_at(i)
                .iter()
                .any(|n| n.pitch_class() == clash_pc);

            let mut base: f64 = if is_minor(ctx.key) { 0.35 } else { 0.20 };
            if next_is_dominant {
                base += 0.15;
            }
            if predominant {
                base += 0.10;
            }

            let root_position = Chord::new(root, ChordQuality::Major);
            let first_inversion = root_position.clone().with_bass(root + 4);
            for (chord, inverted) in [(root_position, false), (first_inversion, true)] {
                if &chord == current {
                    continue;
                }
                let preferred = inverted == prefer_inversion;
                let confidence = if clashes {
                    CLASH_CONFIDENCE
                } else {
                    (base + if preferred { 0.05 } else { 0.0 }).min(CONFIDENCE_CAP)
                };
                let voice_leading = match ctx.chord(i + 1) {
                    Some(next) => voice_leading_quality(&chord, next),
                    None => voice_leading_quality(current, &chord),
                };
                let form = if inverted { "first inversion" } else { "root position" };
                let draft = SuggestionDraft::replacement(
                    i,
                    current.clone(),
                    chord.clone(),
                    StrategyKind::Neapolitan,
                    SubstitutionType::NeapolitanSixth,
                )
                .confidence(confidence)
                .voice_leading(voice_leading)
                .reasoning(if clashes {
                    format!("Neapolitan {} ({}) clashes with the melody", chord, form)
                } else {
                    format!("Neapolitan {} ({}) as pre-dominant", chord, form)
                });
                out.extend(finish(draft));
            }
        }
        out
    }
}
