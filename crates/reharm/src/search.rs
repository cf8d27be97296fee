//! Batch reharmonization: beam search over per-position actions.
//!
//! Each original position offers three kinds of action: keep the chord,
//! replace it, or insert a chord before it. A continuation is scored
//! against the chord chosen just before it and the previous substitution
//! type, never against its siblings, so expansions run in parallel.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use reharmconf::SearchSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::engine::SuggestionEngine;
use crate::scoring::ScoringContext;
use crate::style::{Complexity, StyleProfile};
use crate::suggestion::{ChordSuggestion, SubstitutionType, SuggestionFingerprint};
use crate::theory::{Chord, ChordProgression, Key, MelodyNote};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub beam_width: usize,
    /// Substitutions allowed in one result.
    pub max_suggestions: usize,
    /// Checked between steps; the best partial is returned when it runs out.
    pub max_time: Duration,
    /// Fixes candidate order, and so tie-breaking.
    pub seed: Option<u64>,
    /// Actions scoring at or below this are never applied.
    pub min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::from_settings_unchecked(&SearchSettings::default())
    }
}

impl SearchConfig {
    pub fn from_settings(settings: &SearchSettings) -> Result<Self> {
        let config = Self::from_settings_unchecked(settings);
        config.validate()?;
        Ok(config)
    }

    fn from_settings_unchecked(settings: &SearchSettings) -> Self {
        Self {
            beam_width: settings.beam_width,
            max_suggestions: settings.max_suggestions,
            max_time: Duration::from_millis(settings.max_time_ms),
            seed: settings.seed,
            min_score: settings.min_score,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.beam_width == 0 {
            return Err(Error::InvalidSearchConfig("beam_width must be at least 1".into()));
        }
        if !self.min_score.is_finite() || !(0.0..=1.0).contains(&self.min_score) {
            return Err(Error::InvalidSearchConfig(format!(
                "min_score {} is outside [0, 1]",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// Positions and proposals the search must not touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchConstraints {
    pub locked: BTreeSet<usize>,
    pub rejected: BTreeSet<SuggestionFingerprint>,
}

impl SearchConstraints {
    fn allows(&self, suggestion: &ChordSuggestion) -> bool {
        !self.locked.contains(&suggestion.position())
            && !self.rejected.contains(&suggestion.fingerprint())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Accepted suggestions, positioned for applying one after another.
    pub accepted: Vec<ChordSuggestion>,
    pub progression: ChordProgression,
    pub score: f64,
    pub positions_explored: usize,
    pub expansions: usize,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
struct Partial {
    chosen: Vec<ChordSuggestion>,
    score: f64,
    last_chord: Option<Chord>,
    last_type: Option<SubstitutionType>,
}

#[derive(Clone, Default)]
pub struct BeamSearchOptimizer {
    engine: SuggestionEngine,
}

impl BeamSearchOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: SuggestionEngine) -> Self {
        Self { engine }
    }

    /// Pick a coherent set of substitutions. `progression` is left untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn optimize(
        &self,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        style: &StyleProfile,
        complexity: Complexity,
        config: &SearchConfig,
        constraints: &SearchConstraints,
    ) -> Result<SearchOutcome> {
        config.validate()?;
        let started = Instant::now();
        let n = progression.len();

        let mut actions: Vec<Vec<ChordSuggestion>> = vec![Vec::new(); n];
        for suggestion in self
            .engine
            .generate(progression, key, melody, style, 0..n, None)
            .into_iter()
            .filter(|s| constraints.allows(s))
        {
            actions[suggestion.position()].push(suggestion);
        }
        if let Some(seed) = config.seed {
            let mut rng = StdRng::seed_from_u64(seed);
            for candidates in &mut actions {
                candidates.shuffle(&mut rng);
            }
        }
        info!(
            positions = n,
            candidates = actions.iter().map(Vec::len).sum::<usize>(),
            beam_width = config.beam_width,
            style = style.name(),
            "beam search starting"
        );

        let mut beam = vec![Partial {
            chosen: Vec::new(),
            score: 0.0,
            last_chord: None,
            last_type: None,
        }];
        let mut positions_explored = 0;
        let mut expansions = 0;
        let mut timed_out = false;

        for position in 0..n {
            if started.elapsed() >= config.max_time {
                warn!(
                    position,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "beam search out of time, returning best partial"
                );
                timed_out = true;
                break;
            }
            if beam[0].chosen.len() >= config.max_suggestions {
                debug!(position, "best partial reached max_suggestions");
                break;
            }

            let step = Step {
                position,
                progression,
                key,
                melody,
                style,
                complexity,
                config,
                candidates: &actions[position],
                engine: &self.engine,
            };
            let mut next: Vec<Partial> = beam
                .par_iter()
                .map(|partial| step.expand(partial))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect();
            expansions += next.len();
            next.sort_by(|a, b| b.score.total_cmp(&a.score));
            next.truncate(config.beam_width);
            debug!(position, survivors = next.len(), best = next[0].score, "beam step");
            beam = next;
            positions_explored += 1;
        }

        let best = beam.swap_remove(0);
        let mut result = progression.clone();
        let mut accepted = Vec::with_capacity(best.chosen.len());
        let mut offset = 0;
        for suggestion in &best.chosen {
            let rebased = suggestion.at_position(suggestion.position() + offset);
            result = rebased.apply_to(&result)?;
            if rebased.is_insertion() {
                offset += 1;
            }
            accepted.push(rebased);
        }

        info!(
            accepted = accepted.len(),
            score = best.score,
            positions_explored,
            timed_out,
            "beam search finished"
        );
        Ok(SearchOutcome {
            accepted,
            progression: result,
            score: best.score,
            positions_explored,
            expansions,
            timed_out,
        })
    }
}

/// Everything one expansion step reads.
struct Step<'a> {
    position: usize,
    progression: &'a ChordProgression,
    key: &'a Key,
    melody: &'a [MelodyNote],
    style: &'a StyleProfile,
    complexity: Complexity,
    config: &'a SearchConfig,
    candidates: &'a [ChordSuggestion],
    engine: &'a SuggestionEngine,
}

impl Step<'_> {
    fn expand(&self, partial: &Partial) -> Vec<Partial> {
        let original = self.progression.chord(self.position);
        let mut out = vec![Partial {
            chosen: partial.chosen.clone(),
            score: partial.score,
            last_chord: original.cloned(),
            last_type: partial.last_type,
        }];
        if partial.chosen.len() >= self.config.max_suggestions {
            return out;
        }

        let replacement_window = self.progression.melody_at(self.position, self.melody);
        let insertion_window = self
            .progression
            .span(self.position)
            .map(|(start, end)| {
                ChordProgression::melody_between(self.melody, start, start + (end - start) / 2.0)
            })
            .unwrap_or_default();

        for suggestion in self.candidates {
            let (next_chord, window) = if suggestion.is_insertion() {
                (original, &insertion_window)
            } else {
                (self.progression.chord(self.position + 1), &replacement_window)
            };
            let ctx = ScoringContext {
                previous_chord: partial.last_chord.as_ref(),
                next_chord,
                melody: window,
                previous_type: partial.last_type,
            };
            let score = self
                .engine
                .scorer()
                .score_in_context(suggestion, self.key, &ctx, self.style, self.complexity)
                .total;
            if score <= self.config.min_score {
                continue;
            }

            let mut chosen = partial.chosen.clone();
            chosen.push(suggestion.clone());
            let last_chord = if suggestion.is_insertion() {
                original.cloned()
            } else {
                Some(suggestion.suggested_chord().clone())
            };
            out.push(Partial {
                chosen,
                score: partial.score + score,
                last_chord,
                last_type: Some(suggestion.substitution_type()),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::is_diatonic;
    use crate::strategies::StrategyKind;

    fn run(
        symbols: &str,
        style: &str,
        complexity: f64,
        config: &SearchConfig,
        constraints: &SearchConstraints,
    ) -> SearchOutcome {
        let progression = ChordProgression::parse(symbols, 4.0).unwrap();
        BeamSearchOptimizer::new()
            .optimize(
                &progression,
                &Key::parse("C major").unwrap(),
                &[],
                &StyleProfile::named(style).unwrap(),
                Complexity::new(complexity).unwrap(),
                config,
                constraints,
            )
            .unwrap()
    }

    #[test]
    fn applies_at_most_max_suggestions() {
        let config = SearchConfig {
            max_suggestions: 2,
            ..SearchConfig::default()
        };
        let outcome = run("Cmaj7 Am7 Dm7 G7 Cmaj7", "jazz", 1.0, &config, &Default::default());
        assert!(!outcome.accepted.is_empty());
        assert!(outcome.accepted.len() <= 2);
        assert!(outcome.score > 0.0);
        assert!(!outcome.timed_out);
    }

    #[test]
    fn accepted_sequence_replays_to_the_result() {
        let outcome = run("C F G C", "pop", 1.0, &SearchConfig::default(), &Default::default());
        let mut replay = ChordProgression::parse("C F G C", 4.0).unwrap();
        for s in &outcome.accepted {
            replay = s.apply_to(&replay).unwrap();
        }
        assert_eq!(replay, outcome.progression);
        assert!((replay.total_beats() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn zero_complexity_keeps_everything_diatonic() {
        let config = SearchConfig::default();
        let outcome = run("Cmaj7 Am7 Dm7 G7", "jazz", 0.0, &config, &Default::default());
        let key = Key::parse("C major").unwrap();
        for s in &outcome.accepted {
            assert!(is_diatonic(s.suggested_chord(), &key), "{}", s);
            assert!(s.target_chord().map_or(true, |t| is_diatonic(t, &key)));
            assert_ne!(s.strategy_source(), StrategyKind::TritoneSubstitution);
        }
    }

    #[test]
    fn locked_positions_are_untouched() {
        let constraints = SearchConstraints {
            locked: (0..4).collect(),
            ..Default::default()
        };
        let outcome = run("C F G C", "pop", 1.0, &SearchConfig::default(), &constraints);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.progression.to_string(), "C F G C");
    }

    #[test]
    fn seeded_runs_are_identical() {
        let config = SearchConfig {
            seed: Some(42),
            beam_width: 3,
            ..SearchConfig::default()
        };
        let a = run("Cmaj7 Am7 Dm7 G7 Cmaj7", "gospel", 0.8, &config, &Default::default());
        let b = run("Cmaj7 Am7 Dm7 G7 Cmaj7", "gospel", 0.8, &config, &Default::default());
        assert_eq!(
            serde_json::to_string(&a.accepted).unwrap(),
            serde_json::to_string(&b.accepted).unwrap()
        );
    }

    #[test]
    fn exhausted_budget_returns_the_original() {
        let config = SearchConfig {
            max_time: Duration::ZERO,
            ..SearchConfig::default()
        };
        let outcome = run("C F G C", "pop", 1.0, &config, &Default::default());
        assert!(outcome.timed_out);
        assert!(outcome.accepted.is_empty());
        assert_eq!(outcome.positions_explored, 0);
    }

    #[test]
    fn rejects_zero_beam_width() {
        let settings = SearchSettings {
            beam_width: 0,
            ..SearchSettings::default()
        };
        assert!(matches!(
            SearchConfig::from_settings(&settings),
            Err(Error::InvalidSearchConfig(_))
        ));
    }
}
