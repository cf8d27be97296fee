//! reharm - chord reharmonization from the command line
//!
//! Subcommands:
//! - `reharm suggest` - Ranked substitutions for a range of a progression
//! - `reharm optimize` - Beam search for a coherent reharmonization, optionally voiced
//! - `reharm styles` - List built-in and configured styles
//! - `reharm config` - Show the effective configuration and where it came from

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reharm::{
    ChordProgression, InteractiveSession, Key, MelodyNote, SearchConfig, StrategyKind,
    StyleRegistry, VoicingConstraints, VoicingGenerator,
};
use reharmconf::ReharmConfig;
use std::path::PathBuf;
use tracing::debug;

mod render;

#[derive(Parser)]
#[command(name = "reharm")]
#[command(about = "Suggest and apply chord reharmonizations")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./reharm.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Style name (classical, jazz, pop, gospel, or one from [styles])
    #[arg(long, global = true)]
    style: Option<String>,

    /// 0.0 keeps everything diatonic, 1.0 lets chromatic substitutions through
    #[arg(long, global = true)]
    complexity: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProgressionArgs {
    /// Chord symbols separated by spaces, e.g. "Cmaj7 Am7 Dm7 G7"
    #[arg(short, long)]
    chords: String,

    /// Key, e.g. "C major" or "A minor"
    #[arg(short, long, default_value = "C major")]
    key: String,

    /// Beats per chord
    #[arg(long, default_value = "4")]
    beats: f64,

    /// Melody as PITCH@START:DURATION in beats, comma separated, e.g. "72@0:1,74@1:1"
    #[arg(long)]
    melody: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ranked suggestions for a range of positions
    Suggest {
        #[command(flatten)]
        input: ProgressionArgs,

        /// First position (inclusive)
        #[arg(long, default_value = "0")]
        start: usize,

        /// Last position (exclusive), defaults to the end of the progression
        #[arg(long)]
        end: Option<usize>,

        /// Number of suggestions
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Only consult these strategies (repeatable)
        #[arg(long = "strategy")]
        strategies: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Pick a coherent set of substitutions with beam search
    Optimize {
        #[command(flatten)]
        input: ProgressionArgs,

        #[arg(long)]
        beam_width: Option<usize>,

        #[arg(long)]
        max_suggestions: Option<usize>,

        /// Fixes tie-breaking so runs are reproducible
        #[arg(long)]
        seed: Option<u64>,

        /// Also voice the result for the configured instrument
        #[arg(long)]
        voice: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List styles and their strategy weights
    Styles {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = ReharmConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(style) = &cli.style {
        config.session.style = style.clone();
    }
    if let Some(complexity) = cli.complexity {
        config.session.complexity = complexity;
    }
    config.validate().context("Invalid command-line overrides")?;

    init_tracing(&config.telemetry.log_level);
    debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Commands::Suggest {
            input,
            start,
            end,
            count,
            strategies,
            json,
        } => suggest(&config, &input, start, end, count, &strategies, json),
        Commands::Optimize {
            input,
            beam_width,
            max_suggestions,
            seed,
            voice,
            json,
        } => {
            let mut search = config.search.clone();
            if let Some(beam_width) = beam_width {
                search.beam_width = beam_width;
            }
            if let Some(max_suggestions) = max_suggestions {
                search.max_suggestions = max_suggestions;
            }
            if seed.is_some() {
                search.seed = seed;
            }
            let search = SearchConfig::from_settings(&search).context("Invalid search settings")?;
            optimize(&config, &input, &search, voice, json)
        }
        Commands::Styles { json } => styles(&config, json),
        Commands::Config => {
            print!("{}", render::config(&config, &sources));
            Ok(())
        }
    }
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_session(config: &ReharmConfig, input: &ProgressionArgs) -> Result<InteractiveSession> {
    let progression = ChordProgression::parse(&input.chords, input.beats)
        .with_context(|| format!("Failed to parse chords {:?}", input.chords))?;
    let key =
        Key::parse(&input.key).with_context(|| format!("Failed to parse key {:?}", input.key))?;
    let melody = match &input.melody {
        Some(text) => parse_melody(text)?,
        None => Vec::new(),
    };
    let session = InteractiveSession::with_config(progression, key, melody, config)
        .context("Failed to start session")?;
    Ok(session)
}

fn suggest(
    config: &ReharmConfig,
    input: &ProgressionArgs,
    start: usize,
    end: Option<usize>,
    count: usize,
    strategies: &[String],
    json: bool,
) -> Result<()> {
    let mut session = open_session(config, input)?;
    let end = end.unwrap_or_else(|| session.current_progression().len());

    let filter = strategies
        .iter()
        .map(|name| name.parse::<StrategyKind>())
        .collect::<reharm::Result<Vec<_>>>()
        .context("Unknown --strategy")?;
    let filter = (!filter.is_empty()).then_some(filter);

    let ranked = session
        .get_suggestions_for_range(start, end, count, None, filter.as_deref())
        .context("Failed to generate suggestions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        print!("{}", render::suggestions(session.current_progression(), &ranked));
    }
    Ok(())
}

fn optimize(
    config: &ReharmConfig,
    input: &ProgressionArgs,
    search: &SearchConfig,
    voice: bool,
    json: bool,
) -> Result<()> {
    let mut session = open_session(config, input)?;
    let outcome = session
        .auto_reharmonize(search)
        .context("Beam search failed")?;

    let plan = if voice {
        let constraints = VoicingConstraints::from_settings(&config.voicing)
            .context("Invalid voicing settings")?;
        Some(
            session
                .voice_current(&VoicingGenerator::new(constraints))
                .context("Failed to voice the result")?,
        )
    } else {
        None
    };

    if json {
        let doc = serde_json::json!({
            "original": session.original_progression(),
            "outcome": outcome,
            "voicing": plan,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print!(
            "{}",
            render::outcome(session.original_progression(), &outcome, plan.as_ref())
        );
    }
    Ok(())
}

fn styles(config: &ReharmConfig, json: bool) -> Result<()> {
    let registry = StyleRegistry::from_config(config).context("Invalid [styles] configuration")?;
    if json {
        let profiles: Vec<_> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else {
        print!("{}", render::styles(&registry));
    }
    Ok(())
}

/// Parse `PITCH@START:DURATION[,...]`.
fn parse_melody(text: &str) -> Result<Vec<MelodyNote>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|note| {
            let (pitch, timing) = note
                .split_once('@')
                .with_context(|| format!("Melody note {:?} is missing '@'", note))?;
            let (start, duration) = timing
                .split_once(':')
                .with_context(|| format!("Melody note {:?} is missing ':'", note))?;
            let pitch: u8 = pitch
                .trim()
                .parse()
                .with_context(|| format!("Bad pitch in melody note {:?}", note))?;
            let start: f64 = start
                .trim()
                .parse()
                .with_context(|| format!("Bad start in melody note {:?}", note))?;
            let duration: f64 = duration
                .trim()
                .parse()
                .with_context(|| format!("Bad duration in melody note {:?}", note))?;
            if pitch > 127 {
                bail!("Melody pitch {} is outside MIDI range", pitch);
            }
            Ok(MelodyNote::new(pitch, start, duration))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_melody_notes() {
        let notes = parse_melody("72@0:1, 74@1:0.5,76@1.5:2.5").unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[1], MelodyNote::new(74, 1.0, 0.5));
        assert_eq!(notes[2].duration, 2.5);
    }

    #[test]
    fn empty_melody_is_no_notes() {
        assert!(parse_melody("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_melody() {
        assert!(parse_melody("72").is_err());
        assert!(parse_melody("72@1").is_err());
        assert!(parse_melody("x@0:1").is_err());
        assert!(parse_melody("200@0:1").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
