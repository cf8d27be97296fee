//! Scoring: turns a raw suggestion into one comparable number.
//!
//! ```text
//! adjusted = confidence * strategy_weight * complexity_multiplier
//! total    = adjusted * (w_conf + w_vl*vl + w_fp*fp + w_mc*mc + w_var*var)
//! ```
//!
//! The weighted blend is divided by the sum of the style's scoring weights,
//! so `total` stays in [0, 1] whatever a custom style sets.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analysis::{
    ChordAnalysis, DiatonicAnalyzer, FunctionalRole, HarmonicFunction, HarmonyAnalyzer,
};
use crate::style::{Complexity, StyleProfile};
use crate::suggestion::{ChordSuggestion, SubstitutionType};
use crate::theory::{Chord, ChordProgression, Key, MelodyNote};

/// Per-component view of a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub strategy_weight: f64,
    pub complexity_multiplier: f64,
    pub adjusted_confidence: f64,
    pub voice_leading: f64,
    pub functional_progression: f64,
    pub melodic_consonance: f64,
    pub variety: f64,
    pub total: f64,
}

/// Where a suggestion lands: its neighbours and the melody it sounds under.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub previous_chord: Option<&'a Chord>,
    pub next_chord: Option<&'a Chord>,
    pub melody: &'a [&'a MelodyNote],
    pub previous_type: Option<SubstitutionType>,
}

// Penalty by interval of a melody note above a chord tone.
fn clash_penalty(interval: u8) -> f64 {
    match interval % 12 {
        1 => 0.7,   // minor second / minor ninth
        11 => 0.6,  // major seventh
        2 => 0.25,
        6 | 10 => 0.2,
        _ => 0.0,
    }
}

#[derive(Clone)]
pub struct ScoringEngine {
    analyzer: Arc<dyn HarmonyAnalyzer>,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::with_analyzer(Arc::new(DiatonicAnalyzer))
    }

    pub fn with_analyzer(analyzer: Arc<dyn HarmonyAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Score a suggestion against the progression it was proposed for.
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        suggestion: &ChordSuggestion,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        previous_suggestion: Option<&ChordSuggestion>,
        style: &StyleProfile,
        complexity: Complexity,
    ) -> f64 {
        self.breakdown(suggestion, progression, key, melody, previous_suggestion, style, complexity)
            .total
    }

    #[allow(clippy::too_many_arguments)]
    pub fn breakdown(
        &self,
        suggestion: &ChordSuggestion,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        previous_suggestion: Option<&ChordSuggestion>,
        style: &StyleProfile,
        complexity: Complexity,
    ) -> ScoreBreakdown {
        let position = suggestion.position();
        let previous_chord = position.checked_sub(1).and_then(|p| progression.chord(p));
        let (next_chord, window) = if suggestion.is_insertion() {
            // the inserted chord sounds over the first half of the slot it precedes
            let window = progression
                .span(position)
                .map(|(start, end)| {
                    ChordProgression::melody_between(melody, start, start + (end - start) / 2.0)
                })
                .unwrap_or_default();
            (progression.chord(position), window)
        } else {
            (progression.chord(position + 1), progression.melody_at(position, melody))
        };

        let ctx = ScoringContext {
            previous_chord,
            next_chord,
            melody: &window,
            previous_type: previous_suggestion.map(|s| s.substitution_type()),
        };
        self.score_in_context(suggestion, key, &ctx, style, complexity)
    }

    /// Score with explicit neighbours, as the beam search sees a partial sequence.
    pub fn score_in_context(
        &self,
        suggestion: &ChordSuggestion,
        key: &Key,
        ctx: &ScoringContext<'_>,
        style: &StyleProfile,
        complexity: Complexity,
    ) -> ScoreBreakdown {
        let strategy_weight = style.strategy_weight(suggestion.strategy_source());
        let complexity_multiplier = self.complexity_multiplier(suggestion, key, complexity);
        let adjusted_confidence = suggestion.confidence() * strategy_weight * complexity_multiplier;

        let voice_leading = suggestion.voice_leading_quality();
        let functional_progression = self.functional_progression_score(
            suggestion.suggested_chord(),
            ctx.previous_chord,
            ctx.next_chord,
            key,
            style,
        );
        let melodic_consonance =
            melodic_consonance_score(suggestion.suggested_chord(), ctx.melody, style);
        let variety = variety_score(suggestion.substitution_type(), ctx.previous_type, style);

        let w = style.scoring_weights();
        let blend = w.confidence
            + w.voice_leading * voice_leading
            + w.functional_progression * functional_progression
            + w.melodic_consonance * melodic_consonance
            + w.variety * variety;
        let weight_sum = w.sum();
        let total = if weight_sum > 0.0 {
            adjusted_confidence * blend / weight_sum
        } else {
            0.0
        };

        ScoreBreakdown {
            strategy_weight,
            complexity_multiplier,
            adjusted_confidence,
            voice_leading,
            functional_progression,
            melodic_consonance,
            variety,
            total,
        }
    }

    /// 1.0 for diatonic suggestions, `complexity` when either chord leaves the key.
    pub fn complexity_multiplier(
        &self,
        suggestion: &ChordSuggestion,
        key: &Key,
        complexity: Complexity,
    ) -> f64 {
        let chromatic = !self.analyzer.analyze(suggestion.suggested_chord(), key).is_diatonic
            || suggestion
                .target_chord()
                .is_some_and(|t| !self.analyzer.analyze(t, key).is_diatonic);
        if chromatic {
            complexity.value()
        } else {
            1.0
        }
    }

    /// Mean strength of the moves into and out of `chord`.
    pub fn functional_progression_score(
        &self,
        chord: &Chord,
        previous: Option<&Chord>,
        next: Option<&Chord>,
        key: &Key,
        style: &StyleProfile,
    ) -> f64 {
        let analysis = self.analyzer.analyze(chord, key);
        let mut moves = Vec::with_capacity(2);
        if let Some(prev) = previous {
            let prev_analysis = self.analyzer.analyze(prev, key);
            moves.push(transition(prev, &prev_analysis, chord, &analysis, style));
        }
        if let Some(next) = next {
            let next_analysis = self.analyzer.analyze(next, key);
            moves.push(transition(chord, &analysis, next, &next_analysis, style));
        }
        if moves.is_empty() {
            return 0.5;
        }
        moves.iter().sum::<f64>() / moves.len() as f64
    }
}

fn transition(
    from: &Chord,
    from_analysis: &ChordAnalysis,
    to: &Chord,
    to_analysis: &ChordAnalysis,
    style: &StyleProfile,
) -> f64 {
    use FunctionalRole::*;

    if from_analysis.function == HarmonicFunction::SecondaryDominant
        && from.root_motion_to(to) == 5
    {
        return 1.0;
    }
    match (from_analysis.role(), to_analysis.role()) {
        (Some(Dominant), Some(Tonic)) => 1.0,
        (Some(Subdominant), Some(Dominant)) => 0.85,
        (Some(Tonic), Some(Subdominant)) => 0.6,
        (Some(Tonic), Some(Dominant)) => 0.55,
        (Some(Subdominant), Some(Tonic)) => 0.5,
        (Some(Dominant), Some(Subdominant)) => {
            if style.rules().allow_dominant_to_subdominant {
                0.5
            } else {
                0.1
            }
        }
        _ => 0.4,
    }
}

/// One minus the worst clash of any melody note against `chord`.
pub fn melodic_consonance_score(
    chord: &Chord,
    melody: &[&MelodyNote],
    style: &StyleProfile,
) -> f64 {
    let tones = chord.pitch_classes();
    let worst = melody
        .iter()
        .map(|note| {
            let pc = note.pitch_class();
            if tones.contains(&pc) {
                return 0.0;
            }
            tones
                .iter()
                .map(|&t| clash_penalty((pc + 12 - t) % 12))
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max);
    1.0 - (worst * style.melodic_clash_penalty()).min(1.0)
}

pub fn variety_score(
    substitution_type: SubstitutionType,
    previous: Option<SubstitutionType>,
    style: &StyleProfile,
) -> f64 {
    if previous == Some(substitution_type) {
        1.0 - style.repetition_penalty()
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::StrategyKind;
    use crate::style::ScoringWeights;
    use crate::suggestion::SuggestionDraft;

    fn chord(symbol: &str) -> Chord {
        Chord::parse(symbol).unwrap()
    }

    fn tritone_sub() -> ChordSuggestion {
        SuggestionDraft::replacement(
            1,
            chord("G7"),
            chord("Db7"),
            StrategyKind::TritoneSubstitution,
            SubstitutionType::TritoneSubstitution,
        )
        .confidence(0.8)
        .voice_leading(0.95)
        .build()
        .unwrap()
    }

    fn fixture() -> (ChordProgression, Key) {
        (
            ChordProgression::parse("Dm7 G7 Cmaj7", 4.0).unwrap(),
            Key::parse("C major").unwrap(),
        )
    }

    #[test]
    fn zero_strategy_weight_scores_zero() {
        let (progression, key) = fixture();
        let style = StyleProfile::named("classical").unwrap();
        let score = ScoringEngine::new().score(
            &tritone_sub(),
            &progression,
            &key,
            &[],
            None,
            &style,
            Complexity::default(),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn complexity_suppresses_chromatic_suggestions() {
        let (progression, key) = fixture();
        let style = StyleProfile::named("jazz").unwrap();
        let engine = ScoringEngine::new();
        let at = |c: f64| {
            engine.score(
                &tritone_sub(),
                &progression,
                &key,
                &[],
                None,
                &style,
                Complexity::new(c).unwrap(),
            )
        };
        assert_eq!(at(0.0), 0.0);
        assert!(at(0.5) > 0.0);
        assert!(at(1.0) > at(0.5));
        assert!(at(1.0) <= 1.0);
    }

    #[test]
    fn heavy_custom_weights_stay_in_unit_range() {
        let (progression, key) = fixture();
        let jazz = StyleProfile::named("jazz").unwrap();
        let mut definition = jazz.definition().clone();
        definition.name = "loud".into();
        definition.scoring_weights = ScoringWeights {
            confidence: 1.0,
            voice_leading: 1.0,
            functional_progression: 1.0,
            melodic_consonance: 1.0,
            variety: 1.0,
        };
        let loud = StyleProfile::new(definition).unwrap();

        let engine = ScoringEngine::new();
        let sub = tritone_sub();
        let total = engine.score(&sub, &progression, &key, &[], None, &loud, Complexity::MAX);
        assert!(total > 0.0 && total <= 1.0, "{}", total);

        // scaling every weight together changes nothing
        let mut halved = loud.definition().clone();
        halved.scoring_weights = ScoringWeights {
            confidence: 0.5,
            voice_leading: 0.5,
            functional_progression: 0.5,
            melodic_consonance: 0.5,
            variety: 0.5,
        };
        let halved = StyleProfile::new(halved).unwrap();
        let again = engine.score(&sub, &progression, &key, &[], None, &halved, Complexity::MAX);
        assert!((total - again).abs() < 1e-12);
    }

    #[test]
    fn diatonic_suggestions_ignore_complexity() {
        let (progression, key) = fixture();
        let style = StyleProfile::named("classical").unwrap();
        let replacement = SuggestionDraft::replacement(
            0,
            chord("Dm7"),
            chord("Fmaj7"),
            StrategyKind::FunctionalMovement,
            SubstitutionType::DiatonicSubstitution,
        )
        .confidence(0.7)
        .voice_leading(0.8)
        .build()
        .unwrap();
        let engine = ScoringEngine::new();
        let b = engine.breakdown(
            &replacement,
            &progression,
            &key,
            &[],
            None,
            &style,
            Complexity::new(0.0).unwrap(),
        );
        assert_eq!(b.complexity_multiplier, 1.0);
        assert!(b.total > 0.0);
        let total =
            engine.score(&replacement, &progression, &key, &[], None, &style, Complexity::MIN);
        assert!((b.total - total).abs() < 1e-12);
    }

    #[test]
    fn melody_clash_lowers_consonance() {
        let style = StyleProfile::named("jazz").unwrap();
        let db7 = chord("Db7");
        let d = MelodyNote::new(74, 0.0, 1.0);
        let f = MelodyNote::new(77, 0.0, 1.0);
        assert_eq!(melodic_consonance_score(&db7, &[&f], &style), 1.0);
        let clashing = melodic_consonance_score(&db7, &[&d], &style);
        assert!((clashing - (1.0 - 0.7 * 0.7)).abs() < 1e-9);
        assert_eq!(melodic_consonance_score(&db7, &[], &style), 1.0);
    }

    #[test]
    fn repeated_type_costs_variety() {
        let style = StyleProfile::named("pop").unwrap();
        let t = SubstitutionType::Suspension;
        assert_eq!(variety_score(t, None, &style), 1.0);
        assert_eq!(variety_score(t, Some(SubstitutionType::ModalBorrowing), &style), 1.0);
        assert!((variety_score(t, Some(t), &style) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn resolutions_outscore_retrogressions() {
        let key = Key::parse("C major").unwrap();
        let classical = StyleProfile::named("classical").unwrap();
        let jazz = StyleProfile::named("jazz").unwrap();
        let engine = ScoringEngine::new();
        let g7 = chord("G7");
        let (c, f) = (chord("C"), chord("F"));
        let to_tonic = engine.functional_progression_score(&g7, None, Some(&c), &key, &classical);
        let to_sub = engine.functional_progression_score(&g7, None, Some(&f), &key, &classical);
        let to_sub_jazz = engine.functional_progression_score(&g7, None, Some(&f), &key, &jazz);
        assert_eq!(to_tonic, 1.0);
        assert!((to_sub - 0.1).abs() < 1e-9);
        assert!(to_sub_jazz > to_sub);

        // V7/ii resolving to ii
        let a7 = chord("A7");
        let dm = chord("Dm");
        let secondary = engine.functional_progression_score(&a7, None, Some(&dm), &key, &classical);
        assert_eq!(secondary, 1.0);
        assert_eq!(engine.functional_progression_score(&g7, None, None, &key, &classical), 0.5);
    }
}
