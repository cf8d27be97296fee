use std::ops::Range;

use super::{finish, voice_leading_quality, Strategy, StrategyContext, StrategyKind};
use crate::analysis::FunctionalRole;
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft};
use crate::theory::Chord;

/// Replaces chords or inserts bridges where tonic/subdominant/dominant
/// motion is weak.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionalMovement;

/// Strength of a move between functional roles.
pub(crate) fn adjacency(from: Option<FunctionalRole>, to: Option<FunctionalRole>) -> f64 {
    use FunctionalRole::*;
    match (from, to) {
        (Some(Tonic), Some(Subdominant)) => 0.9,
        (Some(Subdominant), Some(Dominant)) => 1.0,
        (Some(Dominant), Some(Tonic)) => 1.0,
        (Some(Tonic), Some(Dominant)) => 0.7,
        (Some(Subdominant), Some(Tonic)) => 0.6,
        (Some(Dominant), Some(Subdominant)) => 0.3,
        (Some(a), Some(b)) if a == b => 0.4,
        _ => 0.5,
    }
}

fn role_for_degree(degree: u8) -> Option<FunctionalRole> {
    match degree {
        1 | 3 | 6 => Some(FunctionalRole::Tonic),
        2 | 4 => Some(FunctionalRole::Subdominant),
        5 | 7 => Some(FunctionalRole::Dominant),
        _ => None,
    }
}

fn is_retrogression(from: Option<FunctionalRole>, to: Option<FunctionalRole>) -> bool {
    from == Some(FunctionalRole::Dominant) && to == Some(FunctionalRole::Subdominant)
}

impl FunctionalMovement {
    fn replacements(&self, ctx: &StrategyContext<'_>, i: usize, out: &mut Vec<ChordSuggestion>) {
        let (Some(current), Some(analysis)) = (ctx.chord(i), ctx.analyze(i)) else {
            return;
        };
        let (Some(degree), Some(role)) = (analysis.scale_degree, analysis.role()) else {
            return;
        };
        if !analysis.is_diatonic {
            return;
        }
        // the opening and closing tonic anchor the phrase
        let last = ctx.progression.len() - 1;
        if degree == 1 && (i == 0 || i == last) {
            return;
        }

        let prev = i.checked_sub(1).and_then(|p| ctx.chord(p));
        let next = ctx.chord(i + 1);
        let prev_role = prev.and_then(|c| ctx.analyze_chord(c).role());
        let next_role = next.and_then(|c| ctx.analyze_chord(c).role());

        let around = |r: Option<FunctionalRole>| {
            prev.map_or(0.0, |_| adjacency(prev_role, r))
                + next.map_or(0.0, |_| adjacency(r, next_role))
        };
        let current_strength = around(Some(role));
        let allow_retrogression = ctx.style.rules().allow_dominant_to_subdominant;

        for candidate_degree in 1..=7u8 {
            if candidate_degree == degree {
                continue;
            }
            let chord = if current.quality.is_seventh() {
                ctx.key.seventh(candidate_degree)
            } else {
                ctx.key.triad(candidate_degree)
            };
            let Some(chord) = chord else { continue };
            if &chord == current {
                continue;
            }

            let candidate_role = role_for_degree(candidate_degree);
            if !allow_retrogression
                && (is_retrogression(prev_role, candidate_role)
                    || is_retrogression(candidate_role, next_role))
            {
                continue;
            }

            let delta = around(candidate_role) - current_strength;
            if delta <= 1e-9 {
                continue;
            }

            let primary = matches!(candidate_degree, 1 | 4 | 5);
            let confidence =
                0.60 + 0.15 * (delta / 0.5).min(1.0) + if primary { 0.05 } else { 0.0 };
            let substitution_type = if candidate_role == Some(role) {
                SubstitutionType::DiatonicSubstitution
            } else {
                SubstitutionType::FunctionalReplacement
            };
            let voice_leading = neighbour_quality(prev, &chord, next)
                .unwrap_or_else(|| voice_leading_quality(current, &chord));

            let draft = SuggestionDraft::replacement(
                i,
                current.clone(),
                chord.clone(),
                StrategyKind::FunctionalMovement,
                substitution_type,
            )
            .confidence(confidence)
            .voice_leading(voice_leading)
            .reasoning(format!(
                "{} strengthens functional motion here (+{:.2} adjacency)",
                chord, delta
            ));
            out.extend(finish(draft));
        }
    }

    fn bridges(&self, ctx: &StrategyContext<'_>, i: usize, out: &mut Vec<ChordSuggestion>) {
        let Some(prev_index) = i.checked_sub(1) else {
            return;
        };
        let (Some(prev), Some(next)) = (ctx.chord(prev_index), ctx.chord(i)) else {
            return;
        };
        let next_analysis = ctx.analyze_chord(next);
        let prev_role = ctx.analyze_chord(prev).role();
        let next_role = next_analysis.role();
        let sevenths = prev.quality.is_seventh() || next.quality.is_seventh();
        let diatonic = |degree: u8| {
            if sevenths {
                ctx.key.seventh(degree)
            } else {
                ctx.key.triad(degree)
            }
        };

        let mut options: Vec<(Chord, f64, &str)> = Vec::new();
        match (prev_role, next_role) {
            (Some(FunctionalRole::Tonic), Some(FunctionalRole::Dominant)) => {
                let why = "subdominant bridge completes T-S-D";
                options.extend(diatonic(4).map(|c| (c, 0.75, why)));
                let why = "supertonic bridge completes T-S-D";
                options.extend(diatonic(2).map(|c| (c, 0.70, why)));
            }
            (Some(FunctionalRole::Dominant), Some(FunctionalRole::Subdominant)) => {
                let why = "tonic resolution before the subdominant avoids a retrogression";
                options.extend(diatonic(1).map(|c| (c, 0.70, why)));
            }
            _ => {}
        }

        // close an unprepared final tonic with V
        let is_final_tonic =
            i + 1 == ctx.progression.len() && next_analysis.scale_degree == Some(1);
        if is_final_tonic && prev_role != Some(FunctionalRole::Dominant) {
            let why = "dominant prepares the final cadence";
            options.extend(ctx.key.seventh(5).map(|c| (c, 0.80, why)));
        }

        for (chord, confidence, why) in options {
            if &chord == prev || &chord == next {
                continue;
            }
            let voice_leading =
                (voice_leading_quality(prev, &chord) + voice_leading_quality(&chord, next)) / 2.0;
            let draft = SuggestionDraft::insertion(
                i,
                chord.clone(),
                StrategyKind::FunctionalMovement,
                SubstitutionType::FunctionalInsertion,
            )
            .confidence(confidence)
            .voice_leading(voice_leading)
            .reasoning(format!("insert {}: {}", chord, why));
            out.extend(finish(draft));
        }
    }
}

fn neighbour_quality(prev: Option<&Chord>, chord: &Chord, next: Option<&Chord>) -> Option<f64> {
    let scores: Vec<f64> = prev
        .map(|p| voice_leading_quality(p, chord))
        .into_iter()
        .chain(next.map(|n| voice_leading_quality(chord, n)))
        .collect();
    (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
}

impl Strategy for FunctionalMovement {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FunctionalMovement
    }

    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        let mut out = Vec::new();
        for i in window {
            self.replacements(ctx, i, &mut out);
            self.bridges(ctx, i, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::Fixture;

    #[test]
    fn does_not_replace_when_adjacency_does_not_strictly_improve() {
        let fixture = Fixture::new("Cmaj7 Am7 Dm7 G7", "C major", "classical");
        let suggestions = fixture.run(&FunctionalMovement);
        assert!(suggestions
            .iter()
            .all(|s| !(s.position() == 1 && !s.is_insertion())));
    }

    #[test]
    fn bridges_tonic_to_dominant() {
        let fixture = Fixture::new("C G C", "C major", "classical");
        let suggestions = fixture.run(&FunctionalMovement);
        let bridge = suggestions
            .iter()
            .find(|s| {
                s.is_insertion() && s.position() == 1 && s.suggested_chord().to_string() == "F"
            })
            .expect("IV bridge");
        assert_eq!(bridge.confidence(), 0.75);
        assert_eq!(bridge.substitution_type(), SubstitutionType::FunctionalInsertion);
        assert!(bridge.target_chord().is_none());
    }

    #[test]
    fn replacement_confidence_in_range() {
        let fixture = Fixture::new("C Em Em Am G C", "C major", "pop");
        for s in fixture.run(&FunctionalMovement) {
            assert!((0.59..=0.81).contains(&s.confidence()), "{}", s);
        }
    }

    #[test]
    fn classical_never_proposes_a_retrogression() {
        let fixture = Fixture::new("C Em F C", "C major", "classical");
        for s in fixture.run(&FunctionalMovement) {
            if s.is_insertion() {
                continue;
            }
            let prev = fixture.progression.chord(s.position() - 1).unwrap();
            let key = fixture.key;
            let prev_deg = key.degree_of(prev.root).unwrap();
            let cand_deg = key.degree_of(s.suggested_chord().root).unwrap();
            assert!(!(matches!(prev_deg, 5 | 7) && matches!(cand_deg, 2 | 4)), "{}", s);
        }
    }

    #[test]
    fn prepares_final_tonic() {
        let fixture = Fixture::new("C F C", "C major", "classical");
        let suggestions = fixture.run(&FunctionalMovement);
        assert!(suggestions
            .iter()
            .any(|s| {
                s.is_insertion() && s.position() == 2 && s.suggested_chord().to_string() == "G7"
            }));
    }
}
