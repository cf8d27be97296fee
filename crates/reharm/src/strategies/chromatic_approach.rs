use std::ops::Range;

use super::{finish, voice_leading_quality, Strategy, StrategyContext, StrategyKind};
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::{Chord, ChordQuality};

/// Passing chords across root motion wider than a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromaticApproach;

impl Strategy for ChromaticApproach {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ChromaticApproach
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let mut out = Vec::new();

        for p in window.start.max(1)..window.end {
            let (Some(prev), Some(target)) = (ctx.chord(p - 1), ctx.chord(p)) else {
                continue;
            };
            let motion = prev.root_motion_to(target);
            if motion.min(12 - motion) < 2 {
                continue;
            }

            let target_is_diminished = matches!(
                target.quality,
                ChordQuality::Diminished | ChordQuality::Diminished7 | ChordQuality::HalfDiminished7
            );
            let mut candidates = vec![(
                Chord::new(target.root + 11, ChordQuality::Diminished7),
                0.75,
                "leading-tone diminished seventh",
            )];
            if !target_is_diminished {
                candidates.push((
                    Chord::new(target.root + 7, ChordQuality::Dominant7),
                    0.70,
                    "applied dominant",
                ));
            }
            candidates.push((
                Chord::new(target.root + 1, ChordQuality::Dominant7),
                0.62,
                "dominant a half step above",
            ));

            for (chord, confidence, label) in candidates {
                if &chord == prev || &chord == target {
                    continue;
                }
                let voice_leading = (voice_leading_quality(prev, &chord)
                    + voice_leading_quality(&chord, target))
                    / 2.0;
                let draft = SuggestionDraft::insertion(
                    p,
                    chord.clone(),
                    StrategyKind::ChromaticApproach,
                    SubstitutionType::ChromaticApproach,
                )
                .confidence(confidence)
                .voice_leading(voice_leading)
                .reasoning(format!("{} ({}) approaches {} from {}", chord, label, target, prev));
                out.extend(finish(draft));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::Fixture;

    #[test]
    fn approaches_a_wide_leap() {
        let fixture = Fixture::new("C Am", "C major", "jazz");
        let suggestions = fixture.run(&ChromaticApproach);
        let symbols: Vec<String> = suggestions
            .iter()
            .map(|s| s.suggested_chord().to_string())
            .collect();
        assert_eq!(symbols, vec!["Abdim7", "E7", "Bb7"]);
        for s in &suggestions {
            assert_eq!(s.position(), 1);
            assert!(s.is_insertion());
            assert!((0.60..=0.80).contains(&s.confidence()));
        }
    }

    #[test]
    fn stepwise_motion_is_left_alone() {
        let fixture = Fixture::new("C B C Db", "C major", "gospel");
        let suggestions = fixture.run(&ChromaticApproach);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn skips_candidates_equal_to_a_neighbour() {
        // G7 is already the applied dominant of C
        let fixture = Fixture::new("G7 C", "C major", "jazz");
        let suggestions = fixture.run(&ChromaticApproach);
        assert!(suggestions
            .iter()
            .all(|s| s.suggested_chord().to_string() != "G7"));
        assert_eq!(suggestions.len(), 2);
    }
}
