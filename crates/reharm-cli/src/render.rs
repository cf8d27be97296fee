//! Plain-text output for the subcommands.

use reharm::{
    ChordProgression, RankedSuggestion, SearchOutcome, StrategyKind, StyleRegistry, VoicingPlan,
};
use reharmconf::{ConfigSources, ReharmConfig};
use std::fmt::Write;

pub fn suggestions(progression: &ChordProgression, ranked: &[RankedSuggestion]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", progression);
    if ranked.is_empty() {
        out.push_str("no suggestions\n");
        return out;
    }
    for (i, r) in ranked.iter().enumerate() {
        let s = &r.suggestion;
        let _ = writeln!(
            out,
            "{:>3}. {:.3}  {:<40} {}",
            i + 1,
            r.score,
            s.to_string(),
            s.strategy_source().name()
        );
        if !s.reasoning().is_empty() {
            let _ = writeln!(out, "       {}", s.reasoning());
        }
    }
    out
}

pub fn outcome(
    original: &ChordProgression,
    outcome: &SearchOutcome,
    plan: Option<&VoicingPlan>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "before: {}", original);
    let _ = writeln!(out, "after:  {}", outcome.progression);
    let _ = writeln!(
        out,
        "score {:.3}, {} substitution(s), {} expansions{}",
        outcome.score,
        outcome.accepted.len(),
        outcome.expansions,
        if outcome.timed_out { ", timed out" } else { "" }
    );
    for s in &outcome.accepted {
        let _ = writeln!(out, "  {}", s);
    }

    if let Some(plan) = plan {
        let _ = writeln!(out, "voicing (quality {:.3}):", plan.total_quality);
        for v in &plan.voicings {
            let pitches: Vec<String> = v.pitches().iter().map(u8::to_string).collect();
            let _ = writeln!(out, "  {:<8} {}", v.chord().to_string(), pitches.join(" "));
        }
    }
    out
}

pub fn styles(registry: &StyleRegistry) -> String {
    let mut out = String::new();
    for profile in registry.iter() {
        let _ = writeln!(out, "{}", profile.name());
        for kind in StrategyKind::ALL {
            let _ = writeln!(out, "  {:<22} {:.2}", kind.name(), profile.strategy_weight(kind));
        }
    }
    out.push_str("\nstrategies:\n");
    for kind in StrategyKind::ALL {
        let _ = writeln!(out, "  {:<22} {}", kind.name(), kind.describe());
    }
    out
}

pub fn config(config: &ReharmConfig, sources: &ConfigSources) -> String {
    let mut out = String::new();
    if sources.files.is_empty() {
        out.push_str("# sources: compiled defaults\n");
    } else {
        for file in &sources.files {
            let _ = writeln!(out, "# source: {}", file.display());
        }
    }
    for var in &sources.env_overrides {
        let _ = writeln!(out, "# env: {}", var);
    }
    out.push_str(&config.to_toml());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_list_every_strategy() {
        let text = styles(&StyleRegistry::builtin());
        assert!(text.contains("jazz\n"));
        assert!(text.contains("tritone_substitution"));
        // once per builtin style, once in the legend
        assert_eq!(text.matches("chromatic_approach").count(), 5);
    }

    #[test]
    fn config_names_its_sources() {
        let text = config(&ReharmConfig::default(), &ConfigSources::default());
        assert!(text.starts_with("# sources: compiled defaults\n"));
        assert!(text.contains("[search]"));
    }

    #[test]
    fn empty_suggestions_say_so() {
        let progression = ChordProgression::parse("C", 4.0).unwrap();
        assert!(suggestions(&progression, &[]).ends_with("no suggestions\n"));
    }
}
