//! minicsc CLI
//!
//! Runs the MiniCSC digi analysis over JSON-lines event files and
//! inspects the resulting aggregate containers.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand};
use log::{debug, info};
use rayon::prelude::*;

use minicsc_analysis::{Analyzer, RunSummary};
use minicsc_core::{AnalysisConfig, Layer, MissingPolicy, StoreOptions};
use minicsc_io::{open_container, write_store, EventReader};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    MinicscIo(#[from] minicsc_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] minicsc_core::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{input}: {source}")]
    Run {
        input: PathBuf,
        #[source]
        source: Box<CliError>,
    },

    #[error("Usage error: {0}")]
    Usage(String),
}

/// Offline digi analysis for the MiniCSC test stand.
#[derive(Parser)]
#[command(name = "minicsc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze event files and write aggregate containers
    Analyze {
        /// Input JSON-lines event file(s); each file is one run
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output container (single input only; defaults to the config output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON file with run parameters
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of highest strip charges summed per cluster
        #[arg(long)]
        strip_width_charges: Option<u32>,

        /// Signal threshold in ADC counts above pedestal
        #[arg(long)]
        adc_threshold: Option<u32>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the series stored in a container
    Info {
        /// Input container
        input: PathBuf,

        /// Only list series that were recorded
        #[arg(long)]
        strict: bool,
    },

    /// Write a template run-parameter file
    Config {
        /// Destination of the template
        path: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(
    path: Option<&Path>,
    strip_width_charges: Option<u32>,
    adc_threshold: Option<u32>,
) -> Result<AnalysisConfig> {
    let mut config = match path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };
    if let Some(k) = strip_width_charges {
        config = config.with_strip_width_charges(k);
    }
    if let Some(threshold) = adc_threshold {
        config = config.with_adc_threshold(threshold);
    }
    config.validate().map_err(minicsc_core::Error::from)?;
    Ok(config)
}

/// Output path of one run.
///
/// With several inputs every run writes `<stem>.minicsc.<ext>` next to its
/// input, `<ext>` being the configured output's extension.
fn output_for(input: &Path, config: &AnalysisConfig, several: bool) -> PathBuf {
    if several {
        let extension = config
            .output
            .extension()
            .map_or_else(|| "json".into(), |ext| ext.to_string_lossy().into_owned());
        let stem = input
            .file_stem()
            .map_or_else(|| "run".into(), |stem| stem.to_string_lossy().into_owned());
        input.with_file_name(format!("{stem}.minicsc.{extension}"))
    } else {
        config.output.clone()
    }
}

/// Absolute form of `path` when its directory exists, for comparisons.
fn comparable(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Output paths of every run, in input order.
///
/// Fails if a run would overwrite an input or two runs share an output.
fn plan_outputs(inputs: &[PathBuf], config: &AnalysisConfig) -> Result<Vec<PathBuf>> {
    let several = inputs.len() > 1;
    let outputs: Vec<PathBuf> = inputs
        .iter()
        .map(|input| output_for(input, config, several))
        .collect();

    let sources: BTreeMap<PathBuf, &PathBuf> = inputs
        .iter()
        .map(|input| (comparable(input), input))
        .collect();
    let mut claimed: BTreeMap<PathBuf, &PathBuf> = BTreeMap::new();
    for (input, output) in inputs.iter().zip(&outputs) {
        let key = comparable(output);
        if let Some(source) = sources.get(&key) {
            return Err(CliError::Usage(format!(
                "output {} would overwrite input {}",
                output.display(),
                source.display()
            )));
        }
        if let Some(other) = claimed.insert(key, input) {
            return Err(CliError::Usage(format!(
                "{} and {} would both write {}",
                other.display(),
                input.display(),
                output.display()
            )));
        }
    }
    Ok(outputs)
}

fn run(input: &Path, config: AnalysisConfig) -> Result<RunSummary> {
    let output = config.output.clone();
    let mut analyzer = Analyzer::new(config)?;
    info!("Reading: {}", input.display());
    for event in EventReader::open(input)? {
        analyzer.process_event(&event?)?;
    }
    let summary = analyzer.finalize()?;
    let events = analyzer.counters().events_processed;
    write_store(&output, analyzer.store(), events)?;
    Ok(summary)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            strip_width_charges,
            adc_threshold,
            verbose,
        } => {
            init_logging(verbose);
            let mut config = load_config(config.as_deref(), strip_width_charges, adc_threshold)?;
            let several = input.len() > 1;
            if let Some(output) = output {
                if several {
                    return Err(CliError::Usage(
                        "--output needs a single input; several inputs write next to each input"
                            .to_string(),
                    ));
                }
                config = config.with_output(output);
            }
            debug!(
                "Strip width charges: {}, ADC threshold: {}",
                config.strip_width_charges, config.adc_threshold
            );

            let outputs = plan_outputs(&input, &config)?;
            let start = Instant::now();
            let results: Vec<(PathBuf, Result<RunSummary>)> = input
                .par_iter()
                .zip(outputs)
                .map(|(path, output)| {
                    let run_config = config.clone().with_output(output.clone());
                    (output, run(path, run_config))
                })
                .collect();

            let mut total_events = 0u64;
            for (path, (output, result)) in input.iter().zip(results) {
                let summary = result.map_err(|source| CliError::Run {
                    input: path.clone(),
                    source: Box::new(source),
                })?;
                total_events += summary.events_processed;
                println!("{} -> {}", path.display(), output.display());
                println!("  Events processed: {}", summary.events_processed);
                println!("  Empty wire collections: {}", summary.empty_wire_collections);
                for layer in Layer::all() {
                    println!(
                        "  Charge entries layer {}: {}",
                        layer,
                        summary.charge_entries(layer)
                    );
                }
            }

            println!(
                "Processed {} runs ({} events) in {:.2}s",
                input.len(),
                total_events,
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Info { input, strict } => {
            init_logging(false);
            let policy = if strict {
                MissingPolicy::Strict
            } else {
                MissingPolicy::Tolerant
            };
            let (metadata, store) =
                open_container(&input, StoreOptions::default().with_policy(policy))?;

            println!("File: {}", store.source_name().unwrap_or_default());
            println!(
                "Producer: {} (format {})",
                metadata.producer, metadata.format_version
            );
            println!("Events processed: {}", metadata.events_processed);
            println!(
                "Strip width charges: {}, ADC threshold: {}, pedestal baseline: {}",
                metadata.strip_width_charges, metadata.adc_threshold, metadata.pedestal_baseline
            );
            println!("Series: {}", store.len());
            for (key, series) in store.iter() {
                println!(
                    "  {:<45} {:<13} {:>10} entries",
                    key.path(),
                    series.kind(),
                    series.entries()
                );
            }
        }

        Commands::Config { path } => {
            let template = serde_json::to_string_pretty(&AnalysisConfig::default())?;
            fs::write(&path, template + "\n")?;
            println!("Wrote template to {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_for_several_inputs() {
        let config = AnalysisConfig::default().with_output("out.h5");
        assert_eq!(
            output_for(Path::new("data/run1.jsonl"), &config, true),
            PathBuf::from("data/run1.minicsc.h5")
        );
        assert_eq!(
            output_for(Path::new("data/run1.jsonl"), &config, false),
            PathBuf::from("out.h5")
        );
    }

    #[test]
    fn test_plan_outputs_never_overwrites_inputs() {
        let config = AnalysisConfig::default().with_output("out.json");
        let inputs = vec![PathBuf::from("data/run1.json"), PathBuf::from("data/run2.json")];
        let outputs = plan_outputs(&inputs, &config).unwrap();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from("data/run1.minicsc.json"),
                PathBuf::from("data/run2.minicsc.json")
            ]
        );

        let single = AnalysisConfig::default().with_output("data/run1.json");
        assert!(matches!(
            plan_outputs(&inputs[..1], &single),
            Err(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_plan_outputs_rejects_shared_output() {
        let config = AnalysisConfig::default().with_output("out.json");
        let inputs = vec![PathBuf::from("a/x.jsonl"), PathBuf::from("a/x.ndjson")];
        assert!(matches!(
            plan_outputs(&inputs, &config),
            Err(CliError::Usage(message)) if message.contains("a/x.minicsc.json")
        ));
    }

    #[test]
    fn test_flags_override_config() {
        let config = load_config(None, Some(3), Some(20)).unwrap();
        assert_eq!(config.strip_width_charges, 3);
        assert_eq!(config.adc_threshold, 20);
        assert!(load_config(None, Some(0), None).is_err());
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "minicsc",
            "analyze",
            "a.jsonl",
            "b.jsonl",
            "--strip-width-charges",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                input,
                strip_width_charges,
                ..
            } => {
                assert_eq!(input.len(), 2);
                assert_eq!(strip_width_charges, Some(4));
            }
            _ => panic!("expected analyze"),
        }
    }
}
