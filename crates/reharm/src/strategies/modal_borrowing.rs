use std::ops::Range;

use super::{finish, voice_leading_quality, Strategy, StrategyContext, StrategyKind};
use crate::analysis::FunctionalRole;
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::{Chord, ChordQuality, KeyMode};

/// Swaps a diatonic chord for its counterpart in the parallel mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModalBorrowing;

impl ModalBorrowing {
    fn eligible(ctx: &StrategyContext<'_>, i: usize, role: Option<FunctionalRole>) -> bool {
        let next_is_dominant = ctx
            .analyze(i + 1)
            .is_some_and(|a| a.role() == Some(FunctionalRole::Dominant));
        ctx.is_cadential(i)
            || matches!(role, Some(FunctionalRole::Tonic | FunctionalRole::Subdominant))
            || next_is_dominant
    }
}

impl Strategy for ModalBorrowing {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ModalBorrowing
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let parallel = ctx.key.parallel();
        let mut out = Vec::new();

        for i in window {
            let (Some(current), Some(analysis)) = (ctx.chord(i), ctx.analyze(i)) else {
                continue;
            };
            let Some(degree) = analysis.scale_degree else {
                continue;
            };
            let role = analysis.role();
            if !analysis.is_diatonic || !Self::eligible(ctx, i, role) {
                continue;
            }
            let seventh = current.quality.is_seventh();
            let cadential = ctx.is_cadential(i);

            let borrowed = if seventh {
                parallel.seventh(degree)
            } else {
                parallel.triad(degree)
            };
            if let Some(chord) = borrowed.filter(|c| c != current) {
                let voice_leading = voice_leading_quality(current, &chord);
                let borrowed_role = ctx.analyze_chord(&chord).role();
                let mut confidence = 0.45 + 0.15 * voice_leading;
                if borrowed_role.is_some() && borrowed_role == role {
                    confidence += 0.15;
                }
                if role == Some(FunctionalRole::Subdominant) {
                    confidence += 0.10;
                }
                if cadential {
                    confidence += 0.05;
                }
                let draft = SuggestionDraft::replacement(
                    i,
                    current.clone(),
                    chord.clone(),
                    StrategyKind::ModalBorrowing,
                    SubstitutionType::ModalBorrowing,
                )
                .confidence(confidence.min(0.90))
                .voice_leading(voice_leading)
                .reasoning(format!(
                    "{} borrowed from {} in place of {}",
                    chord, parallel, analysis.roman_numeral
                ));
                out.extend(finish(draft));
            }

            // mixolydian flat seven for the leading-tone chord
            if ctx.key.mode == KeyMode::Major && degree == 7 {
                let quality = if seventh {
                    ChordQuality::Dominant7
                } else {
                    ChordQuality::Major
                };
                let chord = Chord::new(ctx.key.tonic + 10, quality);
                let voice_leading = voice_leading_quality(current, &chord);
                let draft = SuggestionDraft::replacement(
                    i,
                    current.clone(),
                    chord.clone(),
                    StrategyKind::ModalBorrowing,
                    SubstitutionType::ModalBorrowing,
                )
                .confidence(0.35 + 0.15 * voice_leading)
                .voice_leading(voice_leading)
                .reasoning(format!("{} is the mixolydian bVII", chord));
                out.extend(finish(draft));
            }
        }
        out
    }
}
