//! Interactive reharmonization.
//!
//! A session owns a chain of immutable [`ReharmonizationState`] values.
//! Every mutation builds a new state and pushes the old one onto the undo
//! stack; undo and redo just move states between the two stacks. The
//! suggestion cache is an optimization only: every entry is rebuilt on a
//! miss, and anything a transition may have changed is dropped.

use chrono::{DateTime, Utc};
use reharmconf::{ReharmConfig, SessionSettings};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

use crate::cache::SuggestionCache;
use crate::engine::{RankedSuggestion, SuggestionEngine};
use crate::search::{BeamSearchOptimizer, SearchConfig, SearchConstraints, SearchOutcome};
use crate::strategies::StrategyKind;
use crate::style::{Complexity, StyleProfile, StyleRegistry};
use crate::suggestion::{ChordSuggestion, SuggestionFingerprint};
use crate::theory::{Chord, ChordProgression, Key, MelodyNote};
use crate::voicing::{VoicingGenerator, VoicingOptimizer, VoicingPlan};
use crate::{Error, Result};

/// Half-open range of positions, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRange {
    pub start: usize,
    pub end: usize,
}

impl SectionRange {
    pub fn contains(&self, position: usize) -> bool {
        (self.start..self.end).contains(&position)
    }
}

/// One snapshot in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReharmonizationState {
    pub progression: ChordProgression,
    /// Accepted suggestions in order, positioned as they were applied.
    pub accepted: Vec<ChordSuggestion>,
    /// Never offered again.
    pub rejected: BTreeSet<SuggestionFingerprint>,
    /// Never modified.
    pub locked: BTreeSet<usize>,
    pub sections: BTreeMap<String, SectionRange>,
    pub change_count: u64,
    pub last_modified: Option<usize>,
}

impl ReharmonizationState {
    pub fn new(progression: ChordProgression) -> Self {
        Self {
            progression,
            accepted: Vec::new(),
            rejected: BTreeSet::new(),
            locked: BTreeSet::new(),
            sections: BTreeMap::new(),
            change_count: 0,
            last_modified: None,
        }
    }

    /// The state after applying `suggestion`. Locks, sections and
    /// rejections at or after an insertion move with their chords.
    fn with_applied(&self, suggestion: &ChordSuggestion) -> Result<Self> {
        let position = suggestion.position();
        if self.locked.contains(&position) {
            return Err(Error::PositionLocked(position));
        }
        let mut next = self.clone();
        next.progression = suggestion.apply_to(&self.progression)?;
        next.accepted.push(suggestion.clone());
        next.change_count += 1;
        next.last_modified = Some(position);

        if suggestion.is_insertion() {
            next.locked = self
                .locked
                .iter()
                .map(|&p| if p >= position { p + 1 } else { p })
                .collect();
            for range in next.sections.values_mut() {
                if range.start >= position {
                    range.start += 1;
                }
                if range.end > position {
                    range.end += 1;
                }
            }
            next.rejected = self
                .rejected
                .iter()
                .map(|f| if f.position >= position { f.shifted(1) } else { f.clone() })
                .collect();
        }
        Ok(next)
    }

    /// Locks, sections and rejections must all point inside the progression.
    fn check_consistent(&self) -> Result<()> {
        let len = self.progression.len();
        if len == 0 {
            return Err(Error::InvalidProgression("a session needs at least one chord".into()));
        }
        if let Some(&position) = self.locked.iter().find(|&&p| p >= len) {
            return Err(Error::PositionOutOfRange { position, len });
        }
        if let Some(range) = self.sections.values().find(|r| r.start >= r.end || r.end > len) {
            return Err(Error::InvalidRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        if let Some(f) = self.rejected.iter().find(|f| f.position >= len) {
            return Err(Error::PositionOutOfRange {
                position: f.position,
                len,
            });
        }
        Ok(())
    }
}

/// Index-aligned comparison of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDiff {
    pub position: usize,
    pub original: Option<Chord>,
    pub current: Option<Chord>,
    pub changed: bool,
}

/// Everything needed to rebuild a session later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub original: ChordProgression,
    pub key: Key,
    pub melody: Vec<MelodyNote>,
    pub style: StyleProfile,
    pub complexity: Complexity,
    pub state: ReharmonizationState,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_suggestions_per_range")]
    pub suggestions_per_range: usize,
    pub saved_at: DateTime<Utc>,
}

fn default_history_depth() -> usize {
    SessionSettings::default().history_depth
}

fn default_suggestions_per_range() -> usize {
    SessionSettings::default().suggestions_per_range
}

pub struct InteractiveSession {
    original: ChordProgression,
    key: Key,
    melody: Vec<MelodyNote>,
    style: StyleProfile,
    complexity: Complexity,
    engine: SuggestionEngine,
    state: ReharmonizationState,
    undo_stack: VecDeque<ReharmonizationState>,
    redo_stack: Vec<ReharmonizationState>,
    history_depth: usize,
    suggestions_per_range: usize,
    cache: SuggestionCache,
}

fn validate_input(progression: &ChordProgression, melody: &[MelodyNote]) -> Result<()> {
    if progression.is_empty() {
        return Err(Error::InvalidProgression("a session needs at least one chord".into()));
    }
    for note in melody {
        let timing_ok = note.start.is_finite()
            && note.start >= 0.0
            && note.duration.is_finite()
            && note.duration > 0.0;
        if note.pitch > 127 || !timing_ok {
            return Err(Error::InvalidProgression(format!(
                "melody note {} at beat {} for {} beats",
                note.pitch, note.start, note.duration
            )));
        }
    }
    Ok(())
}

impl InteractiveSession {
    pub fn new(
        progression: ChordProgression,
        key: Key,
        melody: Vec<MelodyNote>,
        style: StyleProfile,
    ) -> Result<Self> {
        let settings = SessionSettings::default();
        Self::build(
            progression,
            key,
            melody,
            style,
            Complexity::new(settings.complexity)?,
            &settings,
        )
    }

    /// Style, complexity and limits from the `[session]` and `[styles]` sections.
    pub fn with_config(
        progression: ChordProgression,
        key: Key,
        melody: Vec<MelodyNote>,
        config: &ReharmConfig,
    ) -> Result<Self> {
        let registry = StyleRegistry::from_config(config)?;
        let style = registry.get(&config.session.style)?.clone();
        let complexity = Complexity::new(config.session.complexity)?;
        Self::build(progression, key, melody, style, complexity, &config.session)
    }

    fn build(
        progression: ChordProgression,
        key: Key,
        melody: Vec<MelodyNote>,
        style: StyleProfile,
        complexity: Complexity,
        settings: &SessionSettings,
    ) -> Result<Self> {
        validate_input(&progression, &melody)?;
        info!(
            chords = progression.len(),
            key = %key,
            style = style.name(),
            complexity = complexity.value(),
            "session started"
        );
        Ok(Self {
            state: ReharmonizationState::new(progression.clone()),
            original: progression,
            key,
            melody,
            style,
            complexity,
            engine: SuggestionEngine::new(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            history_depth: settings.history_depth.max(1),
            suggestions_per_range: settings.suggestions_per_range,
            cache: SuggestionCache::new(),
        })
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.set_complexity(complexity);
        self
    }

    pub fn with_engine(mut self, engine: SuggestionEngine) -> Self {
        self.engine = engine;
        self.cache.clear();
        self
    }

    pub fn set_complexity(&mut self, complexity: Complexity) {
        self.complexity = complexity;
        self.cache.clear();
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn style(&self) -> &StyleProfile {
        &self.style
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    pub fn melody(&self) -> &[MelodyNote] {
        &self.melody
    }

    pub fn original_progression(&self) -> &ChordProgression {
        &self.original
    }

    pub fn current_progression(&self) -> &ChordProgression {
        &self.state.progression
    }

    pub fn state(&self) -> &ReharmonizationState {
        &self.state
    }

    pub fn accepted(&self) -> &[ChordSuggestion] {
        &self.state.accepted
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    /// How many suggestions `get_suggestions_for_section` returns by default.
    pub fn suggestions_per_range(&self) -> usize {
        self.suggestions_per_range
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        let len = self.state.progression.len();
        if start >= end || end > len {
            return Err(Error::InvalidRange { start, end, len });
        }
        Ok(())
    }

    fn transition(&mut self, next: ReharmonizationState) {
        let previous = std::mem::replace(&mut self.state, next);
        self.undo_stack.push_back(previous);
        while self.undo_stack.len() > self.history_depth {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Up to `n` ranked suggestions positioned in `[start, end)`.
    ///
    /// Locked positions and rejected suggestions never appear. The cache
    /// holds the unfiltered ranking at the session complexity; an override
    /// bypasses it.
    pub fn get_suggestions_for_range(
        &mut self,
        start: usize,
        end: usize,
        n: usize,
        complexity_override: Option<Complexity>,
        strategy_filter: Option<&[StrategyKind]>,
    ) -> Result<Vec<RankedSuggestion>> {
        self.check_range(start, end)?;

        let ranked = match complexity_override.filter(|c| *c != self.complexity) {
            Some(complexity) => self.rank_range(start, end, complexity),
            None => match self.cache.get(start, end).map(<[_]>::to_vec) {
                Some(cached) => cached,
                None => {
                    let ranked = self.rank_range(start, end, self.complexity);
                    self.cache.put(start, end, ranked.clone());
                    ranked
                }
            },
        };

        let state = &self.state;
        let out: Vec<RankedSuggestion> = ranked
            .into_iter()
            .filter(|r| {
                strategy_filter.map_or(true, |f| f.contains(&r.suggestion.strategy_source()))
            })
            .filter(|r| !state.locked.contains(&r.suggestion.position()))
            .filter(|r| !state.rejected.contains(&r.suggestion.fingerprint()))
            .take(n)
            .collect();
        debug!(start, end, returned = out.len(), "range suggestions");
        Ok(out)
    }

    fn rank_range(
        &self,
        start: usize,
        end: usize,
        complexity: Complexity,
    ) -> Vec<RankedSuggestion> {
        let progression = &self.state.progression;
        let raw = self
            .engine
            .generate(progression, &self.key, &self.melody, &self.style, start..end, None);
        self.engine
            .rank(raw, progression, &self.key, &self.melody, &self.style, complexity)
    }

    pub fn accept_suggestion(&mut self, suggestion: &ChordSuggestion) -> Result<()> {
        let next = self.state.with_applied(suggestion)?;
        let position = suggestion.position();
        self.transition(next);

        let dropped = if suggestion.is_insertion() {
            // the length changed, so every cadence check may flip
            let dropped = self.cache.len();
            self.cache.clear();
            dropped
        } else {
            // neighbours score against the replaced chord
            self.cache
                .invalidate_overlapping(position.saturating_sub(1)..position + 2)
        };
        info!(
            position,
            chord = %suggestion.suggested_chord(),
            insertion = suggestion.is_insertion(),
            cache_dropped = dropped,
            "suggestion accepted"
        );
        Ok(())
    }

    /// Never offer `suggestion` again. Rejecting twice changes nothing.
    pub fn reject_suggestion(&mut self, suggestion: &ChordSuggestion) -> Result<()> {
        let position = suggestion.position();
        if self.state.locked.contains(&position) {
            return Err(Error::PositionLocked(position));
        }
        let fingerprint = suggestion.fingerprint();
        if self.state.rejected.contains(&fingerprint) {
            return Ok(());
        }
        let mut next = self.state.clone();
        next.rejected.insert(fingerprint);
        next.change_count += 1;
        self.transition(next);
        self.cache.invalidate_overlapping(position..position + 1);
        debug!(position, chord = %suggestion.suggested_chord(), "suggestion rejected");
        Ok(())
    }

    pub fn undo(&mut self) -> Result<()> {
        let previous = self.undo_stack.pop_back().ok_or(Error::NothingToUndo)?;
        let current = std::mem::replace(&mut self.state, previous);
        self.redo_stack.push(current);
        self.cache.clear();
        debug!(undo_left = self.undo_stack.len(), "undo");
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let next = self.redo_stack.pop().ok_or(Error::NothingToRedo)?;
        let current = std::mem::replace(&mut self.state, next);
        self.undo_stack.push_back(current);
        self.cache.clear();
        debug!(redo_left = self.redo_stack.len(), "redo");
        Ok(())
    }

    pub fn lock_range(&mut self, start: usize, end: usize) -> Result<()> {
        self.set_locked(start, end, true)
    }

    pub fn unlock_range(&mut self, start: usize, end: usize) -> Result<()> {
        self.set_locked(start, end, false)
    }

    fn set_locked(&mut self, start: usize, end: usize, locked: bool) -> Result<()> {
        self.check_range(start, end)?;
        let mut next = self.state.clone();
        for position in start..end {
            if locked {
                next.locked.insert(position);
            } else {
                next.locked.remove(&position);
            }
        }
        next.change_count += 1;
        self.transition(next);
        self.cache.invalidate_overlapping(start..end);
        debug!(start, end, locked, "lock changed");
        Ok(())
    }

    /// Name `[start, end)`. Re-marking a name moves it.
    pub fn mark_section(&mut self, name: &str, start: usize, end: usize) -> Result<()> {
        self.check_range(start, end)?;
        let mut next = self.state.clone();
        next.sections.insert(name.to_string(), SectionRange { start, end });
        next.change_count += 1;
        self.transition(next);
        Ok(())
    }

    pub fn section(&self, name: &str) -> Result<SectionRange> {
        self.state
            .sections
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownSection(name.to_string()))
    }

    pub fn get_suggestions_for_section(
        &mut self,
        name: &str,
        n: usize,
    ) -> Result<Vec<RankedSuggestion>> {
        let range = self.section(name)?;
        self.get_suggestions_for_range(range.start, range.end, n, None, None)
    }

    pub fn lock_section(&mut self, name: &str) -> Result<()> {
        let range = self.section(name)?;
        self.lock_range(range.start, range.end)
    }

    /// The progression `suggestion` would produce. Session state is untouched.
    pub fn preview_suggestion(&self, suggestion: &ChordSuggestion) -> Result<ChordProgression> {
        suggestion.apply_to(&self.state.progression)
    }

    pub fn compare_with_original(&self) -> Vec<PositionDiff> {
        let original = self.original.slots();
        let current = self.state.progression.slots();
        (0..original.len().max(current.len()))
            .map(|position| {
                let before = original.get(position).map(|s| s.chord.clone());
                let after = current.get(position).map(|s| s.chord.clone());
                PositionDiff {
                    position,
                    changed: before != after,
                    original: before,
                    current: after,
                }
            })
            .collect()
    }

    /// Beam search over the current progression, honouring locks and
    /// rejections. The result lands as a single undoable step.
    pub fn auto_reharmonize(&mut self, config: &SearchConfig) -> Result<SearchOutcome> {
        let constraints = SearchConstraints {
            locked: self.state.locked.clone(),
            rejected: self.state.rejected.clone(),
        };
        let outcome = BeamSearchOptimizer::with_engine(self.engine.clone()).optimize(
            &self.state.progression,
            &self.key,
            &self.melody,
            &self.style,
            self.complexity,
            config,
            &constraints,
        )?;
        if outcome.accepted.is_empty() {
            return Ok(outcome);
        }

        let mut next = self.state.clone();
        for suggestion in &outcome.accepted {
            next = next.with_applied(suggestion)?;
        }
        next.change_count = self.state.change_count + 1;
        self.transition(next);
        self.cache.clear();
        info!(
            accepted = outcome.accepted.len(),
            score = outcome.score,
            "auto reharmonization applied"
        );
        Ok(outcome)
    }

    /// Voice the current progression with the DP optimizer.
    pub fn voice_current(&self, generator: &VoicingGenerator) -> Result<VoicingPlan> {
        VoicingOptimizer::new().voice(self.state.progression.chords(), generator)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            original: self.original.clone(),
            key: self.key,
            melody: self.melody.clone(),
            style: self.style.clone(),
            complexity: self.complexity,
            state: self.state.clone(),
            history_depth: self.history_depth,
            suggestions_per_range: self.suggestions_per_range,
            saved_at: Utc::now(),
        }
    }

    /// Rebuild a session. Undo history starts empty.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        snapshot.state.check_consistent()?;
        let settings = SessionSettings {
            history_depth: snapshot.history_depth,
            suggestions_per_range: snapshot.suggestions_per_range,
            ..SessionSettings::default()
        };
        let mut session = Self::build(
            snapshot.original,
            snapshot.key,
            snapshot.melody,
            snapshot.style,
            snapshot.complexity,
            &settings,
        )?;
        session.state = snapshot.state;
        Ok(session)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: SessionSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::{SubstitutionType, SuggestionDraft};
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    fn session(symbols: &str, style: &str) -> InteractiveSession {
        InteractiveSession::new(
            ChordProgression::parse(symbols, 4.0).unwrap(),
            Key::parse("C major").unwrap(),
            Vec::new(),
            StyleProfile::named(style).unwrap(),
        )
        .unwrap()
    }

    fn chord(symbol: &str) -> Chord {
        Chord::parse(symbol).unwrap()
    }

    fn tritone(position: usize) -> ChordSuggestion {
        SuggestionDraft::replacement(
            position,
            chord("G7"),
            chord("Db7"),
            StrategyKind::TritoneSubstitution,
            SubstitutionType::TritoneSubstitution,
        )
        .confidence(0.8)
        .voice_leading(0.9)
        .build()
        .unwrap()
    }

    fn sus4(position: usize, symbol: &str) -> ChordSuggestion {
        SuggestionDraft::insertion(
            position,
            chord(symbol),
            StrategyKind::Suspension,
            SubstitutionType::Suspension,
        )
        .confidence(0.6)
        .voice_leading(0.8)
        .build()
        .unwrap()
    }

    #[test]
    fn accept_then_undo_restores_state() {
        let mut s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        let before = s.state().clone();
        s.accept_suggestion(&tritone(3)).unwrap();
        assert_eq!(s.current_progression().to_string(), "Cmaj7 Am7 Dm7 Db7");
        assert_eq!(s.accepted().len(), 1);
        assert_eq!(s.state().last_modified, Some(3));

        s.undo().unwrap();
        assert_eq!(s.state(), &before);
        s.redo().unwrap();
        assert_eq!(s.current_progression().to_string(), "Cmaj7 Am7 Dm7 Db7");
    }

    #[test]
    fn empty_stacks_are_protocol_errors() {
        let mut s = session("C F G C", "pop");
        let err = s.undo().unwrap_err();
        assert!(matches!(err, Error::NothingToUndo));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(s.redo(), Err(Error::NothingToRedo)));
    }

    #[test]
    fn new_mutation_clears_redo() {
        let mut s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        s.accept_suggestion(&tritone(3)).unwrap();
        s.undo().unwrap();
        assert!(s.can_redo());
        s.lock_range(0, 1).unwrap();
        assert!(!s.can_redo());
    }

    #[test]
    fn insertion_shifts_locks_sections_and_rejections() {
        let mut s = session("C F G C", "pop");
        s.lock_range(3, 4).unwrap();
        s.mark_section("cadence", 2, 4).unwrap();
        let rejected = tritone(2);
        s.reject_suggestion(&rejected).unwrap();

        s.accept_suggestion(&sus4(2, "Gsus4")).unwrap();
        assert_eq!(s.current_progression().to_string(), "C F Gsus4 G C");
        assert!(s.state().locked.contains(&4));
        assert!(!s.state().locked.contains(&3));
        assert_eq!(s.section("cadence").unwrap(), SectionRange { start: 3, end: 5 });
        assert!(s.state().rejected.contains(&rejected.fingerprint().shifted(1)));
    }

    #[test]
    fn locked_positions_refuse_and_hide() {
        let mut s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        s.lock_range(3, 4).unwrap();
        assert!(matches!(s.accept_suggestion(&tritone(3)), Err(Error::PositionLocked(3))));
        assert!(matches!(s.reject_suggestion(&tritone(3)), Err(Error::PositionLocked(3))));

        let offered = s.get_suggestions_for_range(0, 4, 100, None, None).unwrap();
        assert!(!offered.is_empty());
        assert!(offered.iter().all(|r| r.suggestion.position() != 3));

        s.unlock_range(3, 4).unwrap();
        let offered = s.get_suggestions_for_range(0, 4, 100, None, None).unwrap();
        assert!(offered.iter().any(|r| r.suggestion.position() == 3));
    }

    #[test]
    fn reject_is_idempotent() {
        let mut s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        let sub = tritone(3);
        s.reject_suggestion(&sub).unwrap();
        let once = s.state().clone();
        s.reject_suggestion(&sub).unwrap();
        assert_eq!(s.state(), &once);

        let offered = s.get_suggestions_for_range(0, 4, 100, None, None).unwrap();
        assert!(offered.iter().all(|r| r.suggestion.fingerprint() != sub.fingerprint()));
        s.undo().unwrap();
        assert!(!s.can_undo());
    }

    #[test]
    fn preview_is_pure() {
        let s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        let before = s.state().clone();
        for _ in 0..3 {
            let preview = s.preview_suggestion(&sus4(3, "Gsus4")).unwrap();
            assert_eq!(preview.len(), 5);
        }
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn stale_suggestions_are_refused() {
        let mut s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        s.accept_suggestion(&tritone(3)).unwrap();
        assert!(matches!(
            s.accept_suggestion(&tritone(3)),
            Err(Error::StaleSuggestion { position: 3, .. })
        ));
        assert_eq!(s.accepted().len(), 1);
    }

    #[test]
    fn cache_hits_and_invalidation() {
        let mut s = session("Cmaj7 Am7 Dm7 G7 Cmaj7 Am7", "jazz");
        s.get_suggestions_for_range(0, 2, 5, None, None).unwrap();
        s.get_suggestions_for_range(4, 6, 5, None, None).unwrap();
        s.get_suggestions_for_range(0, 2, 5, None, None).unwrap();
        assert_eq!(s.cache().hits(), 1);
        assert_eq!(s.cache().len(), 2);

        s.accept_suggestion(&tritone(3)).unwrap();
        // positions 2..5 may have changed; 0..2 is untouched
        assert_eq!(s.cache().len(), 1);

        s.undo().unwrap();
        assert!(s.cache().is_empty());

        // an override never fills the cache
        s.get_suggestions_for_range(0, 2, 5, Some(Complexity::MAX), None).unwrap();
        assert!(s.cache().is_empty());
    }

    #[test]
    fn strategy_filter_applies_after_cache() {
        let mut s = session("Dm7 G7 Cmaj7", "jazz");
        let only = [StrategyKind::TritoneSubstitution];
        let filtered = s.get_suggestions_for_range(0, 3, 10, None, Some(&only)).unwrap();
        assert_eq!(filtered.len(), 1);
        let all = s.get_suggestions_for_range(0, 3, 10, None, None).unwrap();
        assert!(all.len() > 1);
    }

    #[test]
    fn invalid_ranges_and_sections() {
        let mut s = session("C F G C", "pop");
        assert!(matches!(
            s.get_suggestions_for_range(2, 2, 5, None, None),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(s.lock_range(0, 9), Err(Error::InvalidRange { .. })));
        assert!(matches!(s.section("bridge"), Err(Error::UnknownSection(_))));
        assert!(matches!(s.lock_section("bridge"), Err(Error::UnknownSection(_))));

        s.mark_section("verse", 0, 2).unwrap();
        s.lock_section("verse").unwrap();
        assert_eq!(s.state().locked, BTreeSet::from([0, 1]));
        let found = s.get_suggestions_for_section("verse", 10).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn compare_reports_trailing_entries() {
        let mut s = session("C F G C", "pop");
        s.accept_suggestion(&sus4(2, "Gsus4")).unwrap();
        let diff = s.compare_with_original();
        assert_eq!(diff.len(), 5);
        assert!(!diff[0].changed && !diff[1].changed);
        assert_eq!(diff[2].current, Some(chord("Gsus4")));
        assert!(diff[2].changed);
        assert_eq!(diff[4].original, None);
        assert_eq!(diff[4].current, Some(chord("C")));
    }

    #[test]
    fn history_is_bounded() {
        let mut config = ReharmConfig::default();
        config.session.history_depth = 2;
        let mut s = InteractiveSession::with_config(
            ChordProgression::parse("C F G C", 4.0).unwrap(),
            Key::parse("C major").unwrap(),
            Vec::new(),
            &config,
        )
        .unwrap();
        for p in 0..4 {
            s.lock_range(p, p + 1).unwrap();
        }
        s.undo().unwrap();
        s.undo().unwrap();
        assert!(matches!(s.undo(), Err(Error::NothingToUndo)));
        assert_eq!(s.state().locked, BTreeSet::from([0, 1]));
    }

    #[test]
    fn unknown_configured_style_is_rejected() {
        let mut config = ReharmConfig::default();
        config.session.style = "baroque".into();
        let result = InteractiveSession::with_config(
            ChordProgression::parse("C F G C", 4.0).unwrap(),
            Key::parse("C major").unwrap(),
            Vec::new(),
            &config,
        );
        assert!(matches!(result, Err(Error::UnknownStyle(_))));
    }

    #[test]
    fn auto_reharmonize_is_one_undo_step() {
        let mut s = session("Cmaj7 Am7 Dm7 G7 Cmaj7", "jazz").with_complexity(Complexity::MAX);
        let before = s.state().clone();
        let outcome = s
            .auto_reharmonize(&SearchConfig {
                seed: Some(3),
                ..SearchConfig::default()
            })
            .unwrap();
        assert!(!outcome.accepted.is_empty());
        assert_eq!(s.current_progression(), &outcome.progression);
        assert_eq!(s.accepted(), outcome.accepted.as_slice());
        s.undo().unwrap();
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn snapshot_round_trips() {
        let mut s = session("C F G C", "gospel");
        s.accept_suggestion(&sus4(2, "Gsus4")).unwrap();
        s.mark_section("end", 3, 5).unwrap();
        s.lock_range(0, 1).unwrap();

        let json = s.to_json().unwrap();
        let restored = InteractiveSession::from_json(&json).unwrap();
        assert_eq!(restored.state(), s.state());
        assert_eq!(restored.style(), s.style());
        assert_eq!(restored.original_progression(), s.original_progression());
        assert!(!restored.can_undo());
    }

    #[test]
    fn malformed_snapshots_are_refused() {
        let mut config = ReharmConfig::default();
        config.session.history_depth = 7;
        let s = InteractiveSession::with_config(
            ChordProgression::parse("C F G C", 4.0).unwrap(),
            Key::parse("C major").unwrap(),
            Vec::new(),
            &config,
        )
        .unwrap();
        let saved: serde_json::Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();

        let restored = InteractiveSession::from_json(&saved.to_string()).unwrap();
        assert_eq!(restored.history_depth, 7);

        let mut bad_root = saved.clone();
        bad_root["state"]["progression"][0]["chord"]["root"] = 200.into();
        let err = InteractiveSession::from_json(&bad_root.to_string()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);

        let mut bad_tonic = saved.clone();
        bad_tonic["key"]["tonic"] = 14.into();
        assert!(InteractiveSession::from_json(&bad_tonic.to_string()).is_err());

        let mut bad_lock = saved.clone();
        bad_lock["state"]["locked"] = serde_json::json!([9]);
        assert!(matches!(
            InteractiveSession::from_json(&bad_lock.to_string()),
            Err(Error::PositionOutOfRange { position: 9, len: 4 })
        ));

        let mut bad_section = saved;
        bad_section["state"]["sections"] = serde_json::json!({"coda": {"start": 2, "end": 6}});
        assert!(matches!(
            InteractiveSession::from_json(&bad_section.to_string()),
            Err(Error::InvalidRange { .. })
        ));
    }

    fn warm_every_window(s: &mut InteractiveSession) {
        let len = s.current_progression().len();
        for start in 0..len {
            for end in start + 1..=len {
                s.get_suggestions_for_range(start, end, 100, None, None).unwrap();
            }
        }
    }

    fn assert_matches_fresh_session(warm: &mut InteractiveSession) {
        let mut cold = InteractiveSession::new(
            warm.current_progression().clone(),
            *warm.key(),
            warm.melody().to_vec(),
            warm.style().clone(),
        )
        .unwrap()
        .with_complexity(warm.complexity());
        let len = warm.current_progression().len();
        for start in 0..len {
            for end in start + 1..=len {
                let cached = warm.get_suggestions_for_range(start, end, 100, None, None).unwrap();
                let fresh = cold.get_suggestions_for_range(start, end, 100, None, None).unwrap();
                let progression = warm.current_progression();
                assert_eq!(cached, fresh, "window {}..{} of {}", start, end, progression);
            }
        }
    }

    #[test]
    fn cached_rankings_match_a_fresh_session() {
        let mut s = session("C F G C", "jazz");
        warm_every_window(&mut s);

        // the chord before an insertion gets a new neighbour and the cadence moves
        s.accept_suggestion(&sus4(3, "Csus4")).unwrap();
        assert_eq!(s.current_progression().to_string(), "C F G Csus4 C");
        assert_matches_fresh_session(&mut s);

        let dm = SuggestionDraft::replacement(
            1,
            chord("F"),
            chord("Dm"),
            StrategyKind::FunctionalMovement,
            SubstitutionType::DiatonicSubstitution,
        )
        .confidence(0.7)
        .voice_leading(0.8)
        .build()
        .unwrap();
        s.accept_suggestion(&dm).unwrap();
        assert_matches_fresh_session(&mut s);

        s.undo().unwrap();
        assert_matches_fresh_session(&mut s);
        s.undo().unwrap();
        assert_matches_fresh_session(&mut s);
        s.redo().unwrap();
        assert_matches_fresh_session(&mut s);
    }

    #[test]
    fn voices_the_current_progression() {
        let s = session("Cmaj7 Am7 Dm7 G7", "jazz");
        let plan = s.voice_current(&VoicingGenerator::default()).unwrap();
        assert_eq!(plan.voicings.len(), 4);
    }

    #[test]
    fn rejects_bad_melody() {
        let result = InteractiveSession::new(
            ChordProgression::parse("C", 4.0).unwrap(),
            Key::parse("C major").unwrap(),
            vec![MelodyNote::new(60, 0.0, 0.0)],
            StyleProfile::named("pop").unwrap(),
        );
        assert!(matches!(result, Err(Error::InvalidProgression(_))));
    }
}
