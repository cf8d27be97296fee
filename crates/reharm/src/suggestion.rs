//! The unit of work: a proposed replacement or insertion.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::strategies::StrategyKind;
use crate::theory::{Chord, ChordProgression};
use crate::{Error, Result};

/// Closed set of substitution tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubstitutionType {
    FunctionalReplacement,
    FunctionalInsertion,
    ModalBorrowing,
    TritoneSubstitution,
    NeapolitanSixth,
    ChromaticApproach,
    Suspension,
    DiatonicSubstitution,
}

impl SubstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubstitutionType::FunctionalReplacement => "functional-replacement",
            SubstitutionType::FunctionalInsertion => "functional-insertion",
            SubstitutionType::ModalBorrowing => "modal-borrowing",
            SubstitutionType::TritoneSubstitution => "tritone-substitution",
            SubstitutionType::NeapolitanSixth => "neapolitan-sixth",
            SubstitutionType::ChromaticApproach => "chromatic-approach",
            SubstitutionType::Suspension => "suspension",
            SubstitutionType::DiatonicSubstitution => "diatonic-substitution",
        }
    }
}

impl fmt::Display for SubstitutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated suggestion fields. `build()` checks the invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionDraft {
    pub suggested_chord: Chord,
    pub confidence: f64,
    pub reasoning: String,
    pub position: usize,
    pub voice_leading_quality: f64,
    pub strategy_source: StrategyKind,
    pub substitution_type: SubstitutionType,
    #[serde(default)]
    pub target_chord: Option<Chord>,
    pub is_insertion: bool,
}

impl SuggestionDraft {
    /// Replace the chord at `position`.
    pub fn replacement(
        position: usize,
        target: Chord,
        suggested: Chord,
        source: StrategyKind,
        substitution_type: SubstitutionType,
    ) -> Self {
        Self {
            suggested_chord: suggested,
            confidence: 0.0,
            reasoning: String::new(),
            position,
            voice_leading_quality: 0.5,
            strategy_source: source,
            substitution_type,
            target_chord: Some(target),
            is_insertion: false,
        }
    }

    /// Insert before the chord currently at `position`.
    pub fn insertion(
        position: usize,
        suggested: Chord,
        source: StrategyKind,
        substitution_type: SubstitutionType,
    ) -> Self {
        Self {
            suggested_chord: suggested,
            confidence: 0.0,
            reasoning: String::new(),
            position,
            voice_leading_quality: 0.5,
            strategy_source: source,
            substitution_type,
            target_chord: None,
            is_insertion: true,
        }
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn voice_leading(mut self, quality: f64) -> Self {
        self.voice_leading_quality = quality;
        self
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn build(self) -> Result<ChordSuggestion> {
        ChordSuggestion::try_from(self)
    }
}

/// A validated suggestion.
///
/// `is_insertion` holds exactly when there is no target chord, and both
/// scores lie in [0, 1]. Instances are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SuggestionDraft")]
pub struct ChordSuggestion {
    suggested_chord: Chord,
    confidence: f64,
    reasoning: String,
    position: usize,
    voice_leading_quality: f64,
    strategy_source: StrategyKind,
    substitution_type: SubstitutionType,
    target_chord: Option<Chord>,
    is_insertion: bool,
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidSuggestion(format!(
            "{} {} is outside [0, 1]",
            name, value
        )))
    }
}

impl TryFrom<SuggestionDraft> for ChordSuggestion {
    type Error = Error;

    fn try_from(draft: SuggestionDraft) -> Result<Self> {
        check_unit("confidence", draft.confidence)?;
        check_unit("voice_leading_quality", draft.voice_leading_quality)?;
        if draft.is_insertion != draft.target_chord.is_none() {
            return Err(Error::InvalidSuggestion(format!(
                "is_insertion = {} but target chord is {}",
                draft.is_insertion,
                if draft.target_chord.is_some() {
                    "present"
                } else {
                    "absent"
                }
            )));
        }

        Ok(Self {
            suggested_chord: draft.suggested_chord,
            confidence: draft.confidence,
            reasoning: draft.reasoning,
            position: draft.position,
            voice_leading_quality: draft.voice_leading_quality,
            strategy_source: draft.strategy_source,
            substitution_type: draft.substitution_type,
            target_chord: draft.target_chord,
            is_insertion: draft.is_insertion,
        })
    }
}

/// Identity of a suggestion for rejection and de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuggestionFingerprint {
    pub position: usize,
    pub is_insertion: bool,
    pub suggested_chord: Chord,
    pub target_chord: Option<Chord>,
}

impl SuggestionFingerprint {
    pub(crate) fn shifted(&self, offset: usize) -> Self {
        Self {
            position: self.position + offset,
            ..self.clone()
        }
    }
}

impl ChordSuggestion {
    pub fn suggested_chord(&self) -> &Chord {
        &self.suggested_chord
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn voice_leading_quality(&self) -> f64 {
        self.voice_leading_quality
    }

    pub fn strategy_source(&self) -> StrategyKind {
        self.strategy_source
    }

    pub fn substitution_type(&self) -> SubstitutionType {
        self.substitution_type
    }

    pub fn target_chord(&self) -> Option<&Chord> {
        self.target_chord.as_ref()
    }

    pub fn is_insertion(&self) -> bool {
        self.is_insertion
    }

    pub fn fingerprint(&self) -> SuggestionFingerprint {
        SuggestionFingerprint {
            position: self.position,
            is_insertion: self.is_insertion,
            suggested_chord: self.suggested_chord.clone(),
            target_chord: self.target_chord.clone(),
        }
    }

    /// Apply to a progression, replacing at or inserting before `position`.
    ///
    /// A replacement whose target no longer sits at its position is stale.
    pub fn apply_to(&self, progression: &ChordProgression) -> Result<ChordProgression> {
        match &self.target_chord {
            None => progression.insert(self.position, self.suggested_chord.clone()),
            Some(target) => {
                let current = progression.chord(self.position).ok_or(Error::PositionOutOfRange {
                    position: self.position,
                    len: progression.len(),
                })?;
                if current != target {
                    return Err(Error::StaleSuggestion {
                        position: self.position,
                        expected: target.to_string(),
                        found: current.to_string(),
                    });
                }
                progression.replace(self.position, self.suggested_chord.clone())
            }
        }
    }

    /// Same suggestion at another position.
    pub(crate) fn at_position(&self, position: usize) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

impl fmt::Display for ChordSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target_chord {
            Some(target) => write!(
                f,
                "@{} {} -> {} ({}, {:.2})",
                self.position, target, self.suggested_chord, self.substitution_type, self.confidence
            ),
            None => write!(
                f,
                "@{} insert {} ({}, {:.2})",
                self.position, self.suggested_chord, self.substitution_type, self.confidence
            ),
        }
    }
}
