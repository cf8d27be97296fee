use std::ops::Range;

use super::{finish, voice_leading_quality, Strategy, StrategyContext, StrategyKind};
use crate::analysis::FunctionalRole;
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::{Chord, ChordProgression, ChordQuality};

/// Inserts a sus chord on the same root right before its resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Suspension;

fn sus_forms(quality: ChordQuality) -> &'static [ChordQuality] {
    use ChordQuality::*;
    match quality {
        Major | Minor | Major7 | Minor7 => &[Suspended4, Suspended2],
        Dominant7 | Dominant9 | Dominant13 => &[Suspended4],
        _ => &[],
    }
}

/// Interval above the root that replaces the third.
fn suspended_interval(quality: ChordQuality) -> u8 {
    if quality == ChordQuality::Suspended2 {
        2
    } else {
        5
    }
}

impl Strategy for Suspension {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Suspension
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let mut out = Vec::new();

        for i in window {
            let Some(resolution) = ctx.chord(i) else { continue };
            let forms = sus_forms(resolution.quality);
            if forms.is_empty() {
                continue;
            }
            let previous = i.checked_sub(1).and_then(|p| ctx.chord(p));
            let dominant = ctx
                .analyze(i)
                .is_some_and(|a| a.role() == Some(FunctionalRole::Dominant));
            let third = resolution
                .chord_tones()
                .into_iter()
                .find(|&pc| matches!((pc + 12 - resolution.root) % 12, 3 | 4));
            // melody under the inserted half of the slot
            let third_in_melody = match (ctx.progression.span(i), third) {
                (Some((start, end)), Some(third)) => {
                    let mid = start + (end - start) / 2.0;
                    ChordProgression::melody_between(ctx.melody, start, mid)
                        .iter()
                        .any(|n| n.pitch_class() == third)
                }
                _ => false,
            };

            for &quality in forms {
                let sus = Chord::new(resolution.root, quality);
                if previous == Some(&sus) {
                    continue;
                }
                let held = (resolution.root + suspended_interval(quality)) % 12;

                let mut confidence: f64 = 0.40;
                if dominant {
                    confidence += 0.10;
                }
                if previous.is_some_and(|p| p.contains(held)) {
                    confidence += 0.10;
                }
                if quality == ChordQuality::Suspended4 {
                    confidence += 0.05;
                }
                if ctx.is_cadential(i) {
                    confidence += 0.05;
                }
                if third_in_melody {
                    confidence -= 0.10;
                }
                let confidence = confidence.clamp(0.30, 0.70);

                let draft = SuggestionDraft::insertion(
                    i,
                    sus.clone(),
                    StrategyKind::Suspension,
                    SubstitutionType::Suspension,
                )
                .confidence(confidence)
                .voice_leading(voice_leading_quality(&sus, resolution))
                .reasoning(format!("{} resolves into {}", sus, resolution));
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
    use crate::theory::MelodyNote;

    #[test]
    fn inserts_sus4_before_the_dominant() {
        let fixture = Fixture::new("C F G C", "C major", "pop");
        let suggestions = fixture.run(&Suspension);
        let gsus4 = suggestions
            .iter()
            .find(|s| s.suggested_chord().to_string() == "Gsus4")
            .expect("Gsus4");
        assert_eq!(gsus4.position(), 2);
        assert!(gsus4.is_insertion());
        assert_eq!(gsus4.substitution_type(), SubstitutionType::Suspension);
        // dominant, prepared by the C in F, sus4, cadential
        assert!((gsus4.confidence() - 0.70).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_in_band() {
        let fixture = Fixture::new("Cmaj7 Am7 Dm7 G7 C", "C major", "jazz");
        let suggestions = fixture.run(&Suspension);
        assert!(!suggestions.is_empty());
        for s in &suggestions {
            assert!((0.30..=0.70).contains(&s.confidence()), "{}", s);
        }
        // dominant sevenths take sus4 only
        assert!(suggestions.iter().all(|s| s.suggested_chord().to_string() != "Gsus2"));
    }

    #[test]
    fn skips_when_already_suspended() {
        let fixture = Fixture::new("Csus4 C Bdim", "C major", "pop");
        let suggestions = fixture.run(&Suspension);
        assert!(suggestions
            .iter()
            .all(|s| !(s.position() == 1 && s.suggested_chord().to_string() == "Csus4")));
        assert!(suggestions.iter().all(|s| s.position() != 2 && s.position() != 0));
    }

    #[test]
    fn melody_third_lowers_confidence() {
        let plain = Fixture::new("C F", "C major", "pop");
        // A is the third of F, sounding in the first half of the F bar
        let clashing =
            Fixture::new("C F", "C major", "pop").with_melody(vec![MelodyNote::new(69, 4.0, 1.0)]);
        let conf = |f: &Fixture| {
            f.run(&Suspension)
                .iter()
                .find(|s| s.position() == 1 && s.suggested_chord().to_string() == "Fsus4")
                .map(|s| s.confidence())
                .unwrap()
        };
        assert!(conf(&clashing) < conf(&plain));
    }
}
