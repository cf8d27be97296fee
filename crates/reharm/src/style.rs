//! Style profiles: which strategies are active, how scores are weighted,
//! and which musical rules are enforced.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use reharmconf::{ConfigError, ReharmConfig, StyleOverride};

use crate::strategies::StrategyKind;
use crate::{Error, Result};

/// Activation weight per strategy; the key set is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub functional_movement: f64,
    pub modal_borrowing: f64,
    pub neapolitan: f64,
    pub tritone_substitution: f64,
    pub suspension: f64,
    pub chromatic_approach: f64,
}

impl StrategyWeights {
    pub fn get(&self, kind: StrategyKind) -> f64 {
        match kind {
            StrategyKind::FunctionalMovement => self.functional_movement,
            StrategyKind::ModalBorrowing => self.modal_borrowing,
            StrategyKind::Neapolitan => self.neapolitan,
            StrategyKind::TritoneSubstitution => self.tritone_substitution,
            StrategyKind::Suspension => self.suspension,
            StrategyKind::ChromaticApproach => self.chromatic_approach,
        }
    }

    pub fn set(&mut self, kind: StrategyKind, weight: f64) {
        let slot = match kind {
            StrategyKind::FunctionalMovement => &mut self.functional_movement,
            StrategyKind::ModalBorrowing => &mut self.modal_borrowing,
            StrategyKind::Neapolitan => &mut self.neapolitan,
            StrategyKind::TritoneSubstitution => &mut self.tritone_substitution,
            StrategyKind::Suspension => &mut self.suspension,
            StrategyKind::ChromaticApproach => &mut self.chromatic_approach,
        };
        *slot = weight;
    }
}

/// Weights of the scoring channels. `confidence` is the base channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub confidence: f64,
    pub voice_leading: f64,
    pub functional_progression: f64,
    pub melodic_consonance: f64,
    pub variety: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.confidence
            + self.voice_leading
            + self.functional_progression
            + self.melodic_consonance
            + self.variety
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleRules {
    /// Permit V -> IV style retrogressions.
    pub allow_dominant_to_subdominant: bool,
    /// Rank the first-inversion Neapolitan above root position.
    pub prefer_neapolitan_inversion: bool,
    /// Extended dominants (9ths, 13ths) and tritone subs are idiomatic.
    pub extended_harmony: bool,
}

/// Unvalidated style fields; [`StyleProfile::new`] checks ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDefinition {
    pub name: String,
    pub strategy_weights: StrategyWeights,
    pub scoring_weights: ScoringWeights,
    pub melodic_clash_penalty: f64,
    pub repetition_penalty: f64,
    #[serde(default)]
    pub rules: StyleRules,
}

impl StyleDefinition {
    fn numeric_fields(&self) -> Vec<(String, f64)> {
        let mut fields: Vec<(String, f64)> = StrategyKind::ALL
            .iter()
            .map(|k| {
                (
                    format!("strategy_weights.{}", k.name()),
                    self.strategy_weights.get(*k),
                )
            })
            .collect();
        let w = &self.scoring_weights;
        fields.extend([
            ("confidence_weight".to_string(), w.confidence),
            ("voice_leading_weight".to_string(), w.voice_leading),
            ("functional_weight".to_string(), w.functional_progression),
            ("melodic_weight".to_string(), w.melodic_consonance),
            ("variety_weight".to_string(), w.variety),
            ("melodic_clash_penalty".to_string(), self.melodic_clash_penalty),
            ("repetition_penalty".to_string(), self.repetition_penalty),
        ]);
        fields
    }

    /// Layer a config override on top of this definition.
    pub fn apply(&mut self, name: &str, style: &StyleOverride) -> Result<()> {
        self.name = name.to_string();
        for (strategy, weight) in &style.strategy_weights {
            let kind: StrategyKind = strategy.parse()?;
            self.strategy_weights.set(kind, *weight);
        }

        let w = &mut self.scoring_weights;
        let scalars = [
            (&mut w.confidence, style.confidence_weight),
            (&mut w.voice_leading, style.voice_leading_weight),
            (&mut w.functional_progression, style.functional_weight),
            (&mut w.melodic_consonance, style.melodic_weight),
            (&mut w.variety, style.variety_weight),
        ];
        for (slot, value) in scalars {
            if let Some(v) = value {
                *slot = v;
            }
        }
        if let Some(v) = style.melodic_clash_penalty {
            self.melodic_clash_penalty = v;
        }
        if let Some(v) = style.repetition_penalty {
            self.repetition_penalty = v;
        }
        if let Some(v) = style.allow_dominant_to_subdominant {
            self.rules.allow_dominant_to_subdominant = v;
        }
        if let Some(v) = style.prefer_neapolitan_inversion {
            self.rules.prefer_neapolitan_inversion = v;
        }
        if let Some(v) = style.extended_harmony {
            self.rules.extended_harmony = v;
        }
        Ok(())
    }
}

/// A validated, immutable style. Every weight and penalty lies in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StyleDefinition", into = "StyleDefinition")]
pub struct StyleProfile {
    definition: StyleDefinition,
}

impl StyleProfile {
    pub const BUILTIN: [&'static str; 4] = ["classical", "jazz", "pop", "gospel"];

    pub fn new(definition: StyleDefinition) -> Result<Self> {
        for (field, value) in definition.numeric_fields() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidStyle {
                    style: definition.name.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(Self { definition })
    }

    /// A built-in profile by name.
    pub fn named(name: &str) -> Result<Self> {
        builtin_definition(name)
            .ok_or_else(|| Error::UnknownStyle(name.to_string()))
            .and_then(Self::new)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn strategy_weight(&self, kind: StrategyKind) -> f64 {
        self.definition.strategy_weights.get(kind)
    }

    pub fn strategy_weights(&self) -> &StrategyWeights {
        &self.definition.strategy_weights
    }

    pub fn scoring_weights(&self) -> &ScoringWeights {
        &self.definition.scoring_weights
    }

    pub fn melodic_clash_penalty(&self) -> f64 {
        self.definition.melodic_clash_penalty
    }

    pub fn repetition_penalty(&self) -> f64 {
        self.definition.repetition_penalty
    }

    pub fn rules(&self) -> StyleRules {
        self.definition.rules
    }

    pub fn definition(&self) -> &StyleDefinition {
        &self.definition
    }
}

impl TryFrom<StyleDefinition> for StyleProfile {
    type Error = Error;

    fn try_from(definition: StyleDefinition) -> Result<Self> {
        Self::new(definition)
    }
}

impl From<StyleProfile> for StyleDefinition {
    fn from(profile: StyleProfile) -> Self {
        profile.definition
    }
}

fn builtin_definition(name: &str) -> Option<StyleDefinition> {
    let definition = match name {
        "classical" => StyleDefinition {
            name: "classical".to_string(),
            strategy_weights: StrategyWeights {
                functional_movement: 1.0,
                modal_borrowing: 0.6,
                neapolitan: 0.8,
                tritone_substitution: 0.0,
                suspension: 0.5,
                chromatic_approach: 0.4,
            },
            scoring_weights: ScoringWeights {
                confidence: 0.15,
                voice_leading: 0.3,
                functional_progression: 0.35,
                melodic_consonance: 0.15,
                variety: 0.05,
            },
            melodic_clash_penalty: 1.0,
            repetition_penalty: 0.3,
            rules: StyleRules {
                allow_dominant_to_subdominant: false,
                prefer_neapolitan_inversion: true,
                extended_harmony: false,
            },
        },
        "jazz" => StyleDefinition {
            name: "jazz".to_string(),
            strategy_weights: StrategyWeights {
                functional_movement: 0.7,
                modal_borrowing: 0.8,
                neapolitan: 0.3,
                tritone_substitution: 1.0,
                suspension: 0.8,
                chromatic_approach: 0.9,
            },
            scoring_weights: ScoringWeights {
                confidence: 0.2,
                voice_leading: 0.3,
                functional_progression: 0.2,
                melodic_consonance: 0.15,
                variety: 0.15,
            },
            melodic_clash_penalty: 0.7,
            repetition_penalty: 0.4,
            rules: StyleRules {
                allow_dominant_to_subdominant: true,
                prefer_neapolitan_inversion: false,
                extended_harmony: true,
            },
        },
        "pop" => StyleDefinition {
            name: "pop".to_string(),
            strategy_weights: StrategyWeights {
                functional_movement: 0.8,
                modal_borrowing: 0.9,
                neapolitan: 0.1,
                tritone_substitution: 0.3,
                suspension: 1.0,
                chromatic_approach: 0.3,
            },
            scoring_weights: ScoringWeights {
                confidence: 0.25,
                voice_leading: 0.25,
                functional_progression: 0.2,
                melodic_consonance: 0.2,
                variety: 0.1,
            },
            melodic_clash_penalty: 0.9,
            repetition_penalty: 0.2,
            rules: StyleRules {
                allow_dominant_to_subdominant: true,
                prefer_neapolitan_inversion: false,
                extended_harmony: false,
            },
        },
        "gospel" => StyleDefinition {
            name: "gospel".to_string(),
            strategy_weights: StrategyWeights {
                functional_movement: 0.8,
                modal_borrowing: 0.8,
                neapolitan: 0.2,
                tritone_substitution: 0.7,
                suspension: 0.9,
                chromatic_approach: 1.0,
            },
            scoring_weights: ScoringWeights {
                confidence: 0.2,
                voice_leading: 0.25,
                functional_progression: 0.25,
                melodic_consonance: 0.15,
                variety: 0.15,
            },
            melodic_clash_penalty: 0.8,
            repetition_penalty: 0.3,
            rules: StyleRules {
                allow_dominant_to_subdominant: true,
                prefer_neapolitan_inversion: false,
                extended_harmony: true,
            },
        },
        _ => return None,
    };
    Some(definition)
}

/// Complexity budget in [0, 1]: 0 suppresses every chromatic suggestion.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Complexity(f64);

impl Complexity {
    pub const MIN: Complexity = Complexity(0.0);
    pub const MAX: Complexity = Complexity(1.0);

    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidComplexity(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self(0.5)
    }
}

impl TryFrom<f64> for Complexity {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Complexity> for f64 {
    fn from(c: Complexity) -> Self {
        c.0
    }
}

/// Built-in profiles plus any defined under `[styles.<name>]`.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    profiles: BTreeMap<String, StyleProfile>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StyleRegistry {
    pub fn builtin() -> Self {
        let profiles = StyleProfile::BUILTIN
            .iter()
            .filter_map(|name| StyleProfile::named(name).ok())
            .map(|p| (p.name().to_string(), p))
            .collect();
        Self { profiles }
    }

    /// Resolve config-defined styles, following `base` chains.
    pub fn from_config(config: &ReharmConfig) -> Result<Self> {
        let mut registry = Self::builtin();
        let mut resolved: BTreeMap<String, StyleProfile> = BTreeMap::new();
        for name in config.styles.keys() {
            let mut visiting = BTreeSet::new();
            resolve(name, &config.styles, &mut resolved, &mut visiting)?;
        }
        for (name, profile) in resolved {
            registry.profiles.insert(name, profile);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<&StyleProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| Error::UnknownStyle(name.to_string()))
    }

    pub fn insert(&mut self, profile: StyleProfile) {
        self.profiles.insert(profile.name().to_string(), profile);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleProfile> + '_ {
        self.profiles.values()
    }
}

fn resolve(
    name: &str,
    overrides: &BTreeMap<String, StyleOverride>,
    resolved: &mut BTreeMap<String, StyleProfile>,
    visiting: &mut BTreeSet<String>,
) -> Result<StyleProfile> {
    if let Some(profile) = resolved.get(name) {
        return Ok(profile.clone());
    }
    let Some(style) = overrides.get(name) else {
        return StyleProfile::named(name);
    };
    if !visiting.insert(name.to_string()) {
        return Err(Error::Config(ConfigError::Invalid {
            field: format!("styles.{}.base", name),
            message: "style inherits from itself".to_string(),
        }));
    }

    let base_name = match &style.base {
        Some(base) => base.clone(),
        None if StyleProfile::BUILTIN.contains(&name) => name.to_string(),
        None => "classical".to_string(),
    };
    let base = if base_name == name {
        StyleProfile::named(name)?
    } else {
        resolve(&base_name, overrides, resolved, visiting)?
    };

    let mut definition = base.definition().clone();
    definition.apply(name, style)?;
    let profile = StyleProfile::new(definition)?;
    resolved.insert(name.to_string(), profile.clone());
    Ok(profile)
}
