use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use simcompare_common::{
    load_config, AppMode, CombinationLogic, CompareArgs, CompareMode, SimCompareError,
};
use simcompare_core::{
    sorted_files, CompareHost, CompareOrchestrator, Comparator, ComparatorFactory, MatchState,
    PrecomputedComparator,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for a run that completed without any match
const EXIT_NO_MATCHES: i32 = 2;

#[derive(Parser)]
#[command(name = "simcompare")]
#[command(author = "SimCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Composite similarity comparison over precomputed scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single-mode or composite comparison
    Run {
        /// Directory the scored files live in
        #[arg(short, long)]
        base_dir: PathBuf,

        /// Score file for a mode, as MODE=FILE (can be specified multiple times)
        #[arg(short, long = "scores", value_name = "MODE=FILE", required = true)]
        scores: Vec<String>,

        /// Weight for a mode under weighted combination, as MODE=WEIGHT
        #[arg(short, long = "weight", value_name = "MODE=WEIGHT")]
        weights: Vec<String>,

        /// Threshold override for a mode, as MODE=THRESHOLD
        #[arg(long = "threshold-override", value_name = "MODE=THRESHOLD")]
        threshold_overrides: Vec<String>,

        /// Mode whose results are navigated (defaults to the first mode given)
        #[arg(short, long)]
        primary: Option<String>,

        /// Combination logic for composite runs: and, or, weighted
        #[arg(short, long)]
        logic: Option<String>,

        /// Threshold applied to every mode without an override
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Drop scores on the wrong side of the threshold
        #[arg(long)]
        filter_by_threshold: bool,

        /// Group the directory instead of ranking it against a search
        #[arg(short, long)]
        group: bool,

        /// Report probable duplicate pairs (group runs only)
        #[arg(long, requires = "group")]
        find_duplicates: bool,

        /// Search text passed through to the comparators
        #[arg(long)]
        search_text: Option<String>,

        /// Files to drop from the results after the run (can be specified multiple times)
        #[arg(short, long)]
        remove: Vec<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Host that mirrors status lines on a spinner and notifications in the log
struct SpinnerHost {
    spinner: ProgressBar,
}

impl SpinnerHost {
    fn new() -> anyhow::Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { spinner })
    }
}

impl CompareHost for SpinnerHost {
    fn set_status(&mut self, text: &str) {
        self.spinner.set_message(text.to_string());
    }

    fn alert(&mut self, title: &str, message: &str) {
        warn!("{}: {}", title, message);
    }

    fn toast(&mut self, message: &str) {
        info!("{}", message);
    }
}

#[derive(Serialize)]
struct JsonReport {
    primary_mode: CompareMode,
    combination_logic: CombinationLogic,
    composite: bool,
    app_mode: AppMode,
    total_matches: usize,
    mode_matches: BTreeMap<CompareMode, usize>,
    groups: Vec<JsonGroup>,
}

#[derive(Serialize)]
struct JsonGroup {
    index: usize,
    files: Vec<JsonMatch>,
}

#[derive(Serialize)]
struct JsonMatch {
    path: String,
    score: f64,
}

struct RunOptions {
    base_dir: PathBuf,
    scores: Vec<String>,
    weights: Vec<String>,
    threshold_overrides: Vec<String>,
    primary: Option<String>,
    logic: Option<String>,
    threshold: Option<f64>,
    filter_by_threshold: bool,
    group: bool,
    find_duplicates: bool,
    search_text: Option<String>,
    remove: Vec<PathBuf>,
    json: bool,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            base_dir,
            scores,
            weights,
            threshold_overrides,
            primary,
            logic,
            threshold,
            filter_by_threshold,
            group,
            find_duplicates,
            search_text,
            remove,
            json,
        } => {
            let options = RunOptions {
                base_dir,
                scores,
                weights,
                threshold_overrides,
                primary,
                logic,
                threshold,
                filter_by_threshold,
                group,
                find_duplicates,
                search_text,
                remove,
                json,
            };
            match run_compare(options) {
                Ok(true) => {}
                Ok(false) => std::process::exit(EXIT_NO_MATCHES),
                Err(e) => {
                    error!("Comparison failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Split a `MODE=VALUE` argument
fn parse_assignment(raw: &str) -> anyhow::Result<(CompareMode, &str)> {
    let (mode, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected MODE=VALUE, got '{}'", raw))?;
    let mode = mode.parse::<CompareMode>()?;
    Ok((mode, value.trim()))
}

fn parse_numbers(raw: &[String], what: &str) -> anyhow::Result<HashMap<CompareMode, f64>> {
    let mut values = HashMap::new();
    for entry in raw {
        let (mode, value) = parse_assignment(entry)?;
        let number = value
            .parse::<f64>()
            .with_context(|| format!("Invalid {} for {}: '{}'", what, mode, value))?;
        values.insert(mode, number);
    }
    Ok(values)
}

fn build_factory(
    score_files: HashMap<CompareMode, PathBuf>,
    filter_by_threshold: bool,
) -> ComparatorFactory {
    Box::new(
        move |mode: CompareMode, args: &CompareArgs| -> simcompare_common::Result<Box<dyn Comparator>> {
            let score_file = score_files.get(&mode).cloned().ok_or_else(|| {
                SimCompareError::Config(format!("No score file given for mode {}", mode.name()))
            })?;
            let comparator = PrecomputedComparator::new(mode, &args.base_dir, score_file)
                .with_threshold_filter(filter_by_threshold);
            Ok(Box::new(comparator))
        },
    )
}

fn run_compare(options: RunOptions) -> anyhow::Result<bool> {
    if !options.base_dir.is_dir() {
        bail!("Base directory does not exist: {}", options.base_dir.display());
    }

    let mut modes = Vec::new();
    let mut score_files = HashMap::new();
    for entry in &options.scores {
        let (mode, file) = parse_assignment(entry)?;
        let file = PathBuf::from(file);
        if !file.is_file() {
            bail!("Score file does not exist: {}", file.display());
        }
        if score_files.insert(mode, file).is_none() {
            modes.push(mode);
        }
    }
    let weights = parse_numbers(&options.weights, "weight")?;
    let threshold_overrides = parse_numbers(&options.threshold_overrides, "threshold")?;

    let loaded = load_config(false)?;
    let mut config = loaded.config;
    config.default_compare_mode = None;
    if let Some(logic) = &options.logic {
        config.combination_logic = logic.parse()?;
    }

    let host = SpinnerHost::new()?;
    let spinner = host.spinner.clone();
    let mut orchestrator =
        CompareOrchestrator::new(&config, build_factory(score_files, options.filter_by_threshold))
            .with_host(host);

    for mode in &modes {
        let weight = weights.get(mode).copied().unwrap_or(1.0);
        orchestrator.add_mode(*mode, weight, threshold_overrides.get(mode).copied());
    }
    if let Some(primary) = &options.primary {
        let primary: CompareMode = primary.parse()?;
        if !modes.contains(&primary) {
            bail!("Primary mode {} has no score file", primary.name());
        }
        orchestrator.set_primary_mode(primary);
    }
    orchestrator.set_threshold(options.threshold);

    let primary = orchestrator
        .primary_mode()
        .ok_or_else(|| anyhow!("No compare mode configured"))?;
    let mut args = CompareArgs::new(&options.base_dir);
    args.mode = primary;
    args.searching_image = !options.group;
    args.search_text = options.search_text.clone();
    args.find_duplicates = options.find_duplicates;
    orchestrator.apply_settings_to_args(&mut args);
    // Composite runs apply overrides per mode
    if !orchestrator.is_composite() {
        if let Some(threshold) = threshold_overrides.get(&primary) {
            args.threshold = *threshold;
        }
    }

    let result = orchestrator.run(Some(args));
    spinner.finish_and_clear();
    result.context("Comparison run failed")?;

    if !options.remove.is_empty() {
        let removed: Vec<PathBuf> = options
            .remove
            .iter()
            .map(|file| resolve(&options.base_dir, file))
            .collect();
        let count = orchestrator.remove_from_groups(&removed);
        info!("Removed {} entries from the results", count);
    }

    let state = orchestrator
        .current_match_state()
        .ok_or_else(|| anyhow!("No match state for primary mode"))?;
    let groups = collect_groups(state);
    let total_matches: usize = groups.iter().map(|(_, files)| files.len()).sum();

    if options.json {
        let mode_matches = orchestrator
            .last_results()
            .map(|results| {
                results
                    .iter()
                    .map(|(mode, scores)| (*mode, scores.len()))
                    .collect()
            })
            .unwrap_or_default();
        let report = JsonReport {
            primary_mode: primary,
            combination_logic: orchestrator.combination_logic(),
            composite: orchestrator.is_composite(),
            app_mode: state.app_mode,
            total_matches,
            mode_matches,
            groups: groups
                .into_iter()
                .map(|(index, files)| JsonGroup {
                    index,
                    files: files
                        .into_iter()
                        .map(|(path, score)| JsonMatch {
                            path: path.display().to_string(),
                            score,
                        })
                        .collect(),
                })
                .collect(),
        };
        let output = serde_json::to_string_pretty(&report)?;
        println!("{output}");
        return Ok(total_matches > 0);
    }

    println!("\n{}", "=".repeat(80));
    if orchestrator.is_composite() {
        println!(
            "Composite results ({} logic, primary {})",
            orchestrator.combination_logic(),
            primary
        );
    } else {
        println!("Results ({})", primary);
    }
    println!("{}", "=".repeat(80));
    for (index, files) in &groups {
        if groups.len() > 1 {
            println!("Group {}:", index);
        }
        for (path, score) in files {
            println!("  {:>10.4}  {}", score, path.display());
        }
    }
    println!("{}", "=".repeat(80));
    println!("Total matches: {}", total_matches);

    Ok(total_matches > 0)
}

fn resolve(base_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base_dir.join(file)
    }
}

/// Every group in navigation order with its files in display order
fn collect_groups(state: &MatchState) -> Vec<(usize, Vec<(PathBuf, f64)>)> {
    let direction = state.view_direction(state.app_mode);
    state
        .group_indexes
        .iter()
        .filter_map(|key| state.file_groups.get(key).map(|group| (*key, group)))
        .filter(|(_, group)| !group.is_empty())
        .map(|(key, group)| {
            let files = sorted_files(group, direction)
                .into_iter()
                .map(|path| {
                    let score = group.get(&path).copied().unwrap_or_default();
                    (path, score)
                })
                .collect();
            (key, files)
        })
        .collect()
}
