//! Custom style definitions from `[styles.<name>]` tables.
//!
//! Every field is optional: unset fields inherit from `base` (or from the
//! built-in profile of the same name). The engine crate resolves these into
//! validated style profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleOverride {
    /// Built-in profile to start from. Default: same name, else "classical".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Strategy name to activation weight, e.g. `tritone_substitution = 0.0`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_weights: BTreeMap<String, f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_leading_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melodic_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variety_weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub melodic_clash_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_dominant_to_subdominant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_neapolitan_inversion: Option<bool>,
    /// Treat extended dominants and tritone substitutes as idiomatic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_harmony: Option<bool>,
}

impl StyleOverride {
    /// All numeric fields, labelled, for range validation.
    pub fn numeric_fields(&self) -> Vec<(String, f64)> {
        let mut fields: Vec<(String, f64)> = self
            .strategy_weights
            .iter()
            .map(|(name, w)| (format!("strategy_weights.{}", name), *w))
            .collect();

        let scalars = [
            ("confidence_weight", self.confidence_weight),
            ("voice_leading_weight", self.voice_leading_weight),
            ("functional_weight", self.functional_weight),
            ("melodic_weight", self.melodic_weight),
            ("variety_weight", self.variety_weight),
            ("melodic_clash_penalty", self.melodic_clash_penalty),
            ("repetition_penalty", self.repetition_penalty),
        ];
        for (label, value) in scalars {
            if let Some(v) = value {
                fields.push((label.to_string(), v));
            }
        }
        fields
    }
}
