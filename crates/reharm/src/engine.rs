//! Runs the strategy family over a window and ranks what comes back.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analysis::{DiatonicAnalyzer, HarmonyAnalyzer};
use crate::scoring::ScoringEngine;
use crate::strategies::{strategy, StrategyContext, StrategyKind};
use crate::style::{Complexity, StyleProfile};
use crate::suggestion::ChordSuggestion;
use crate::theory::{ChordProgression, Key, MelodyNote};

/// A suggestion with its score under one style and complexity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSuggestion {
    pub suggestion: ChordSuggestion,
    pub score: f64,
}

#[derive(Clone)]
pub struct SuggestionEngine {
    analyzer: Arc<dyn HarmonyAnalyzer>,
    scorer: ScoringEngine,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::with_analyzer(Arc::new(DiatonicAnalyzer))
    }

    /// Use a different analysis backend for strategies and scoring alike.
    pub fn with_analyzer(analyzer: Arc<dyn HarmonyAnalyzer>) -> Self {
        Self {
            scorer: ScoringEngine::with_analyzer(Arc::clone(&analyzer)),
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &dyn HarmonyAnalyzer {
        self.analyzer.as_ref()
    }

    pub fn scorer(&self) -> &ScoringEngine {
        &self.scorer
    }

    /// Raw proposals from every enabled strategy, deduplicated.
    ///
    /// `filter` restricts the strategies consulted. Identical proposals
    /// from different strategies collapse to the most confident one, in
    /// first-seen order.
    pub fn generate(
        &self,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        style: &StyleProfile,
        window: Range<usize>,
        filter: Option<&[StrategyKind]>,
    ) -> Vec<ChordSuggestion> {
        let kinds: Vec<StrategyKind> = StrategyKind::ALL
            .into_iter()
            .filter(|k| filter.map_or(true, |f| f.contains(k)))
            .collect();
        let ctx = StrategyContext::new(progression, key, self.analyzer.as_ref(), melody, style);

        let batches: Vec<Vec<ChordSuggestion>> = kinds
            .par_iter()
            .map(|&kind| {
                let found = strategy(kind).suggest(&ctx, window.clone());
                debug!(strategy = kind.name(), count = found.len(), "strategy finished");
                found
            })
            .collect();

        let mut out: Vec<ChordSuggestion> = Vec::new();
        let mut seen = HashMap::new();
        for suggestion in batches.into_iter().flatten() {
            match seen.get(&suggestion.fingerprint()) {
                Some(&idx) => {
                    let existing: &mut ChordSuggestion = &mut out[idx];
                    if suggestion.confidence() > existing.confidence() {
                        *existing = suggestion;
                    }
                }
                None => {
                    seen.insert(suggestion.fingerprint(), out.len());
                    out.push(suggestion);
                }
            }
        }
        out
    }

    /// Score and sort, best first. Equal scores keep their input order.
    pub fn rank(
        &self,
        suggestions: Vec<ChordSuggestion>,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        style: &StyleProfile,
        complexity: Complexity,
    ) -> Vec<RankedSuggestion> {
        let mut ranked: Vec<RankedSuggestion> = suggestions
            .into_iter()
            .map(|suggestion| {
                let score = self.scorer.score(
                    &suggestion,
                    progression,
                    key,
                    melody,
                    None,
                    style,
                    complexity,
                );
                RankedSuggestion { suggestion, score }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// `generate` then `rank`, truncated to `limit`.
    #[allow(clippy::too_many_arguments)]
    pub fn suggest(
        &self,
        progression: &ChordProgression,
        key: &Key,
        melody: &[MelodyNote],
        style: &StyleProfile,
        complexity: Complexity,
        window: Range<usize>,
        filter: Option<&[StrategyKind]>,
        limit: usize,
    ) -> Vec<RankedSuggestion> {
        let raw = self.generate(progression, key, melody, style, window.clone(), filter);
        let total = raw.len();
        let mut ranked = self.rank(raw, progression, key, melody, style, complexity);
        ranked.truncate(limit);
        info!(
            start = window.start,
            end = window.end,
            style = style.name(),
            candidates = total,
            returned = ranked.len(),
            "ranked suggestions"
        );
        ranked
    }
}
