use crate::combiner::{combine, ModeResults};
use crate::comparator::{Comparator, ComparatorFactory};
use crate::host::{CompareHost, FileBrowser, NullHost};
use crate::match_state::MatchState;
use crate::session::ModeSession;
use simcompare_common::{
    AppConfig, AppMode, CombinationLogic, CompareArgs, CompareMode, ModeConfig, Result, ScoreMap,
    SimCompareError, ThresholdCategory,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

const SETTINGS_RULE: &str = "|--------------------------------------------------------------------|";

/// Drives single-mode and composite comparisons and exposes the primary
/// mode's match state for navigation.
///
/// Mode configs are kept in a map keyed by mode, so per-mode iteration and the
/// fallback primary after `remove_mode` follow `CompareMode` order.
pub struct CompareOrchestrator {
    config: AppConfig,
    factory: ComparatorFactory,
    host: Box<dyn CompareHost>,
    primary_mode: Option<CompareMode>,
    mode_configs: BTreeMap<CompareMode, ModeConfig>,
    sessions: BTreeMap<CompareMode, ModeSession>,
    combination_logic: CombinationLogic,
    threshold: Option<f64>,
    counter_limit: Option<usize>,
    compare_faces: bool,
    overwrite: bool,
    store_checkpoints: bool,
    last_results: Option<ModeResults>,
    combined_results: Option<ScoreMap>,
    cancel: Arc<AtomicBool>,
}

impl CompareOrchestrator {
    pub fn new(config: &AppConfig, factory: ComparatorFactory) -> Self {
        let mut orchestrator = Self {
            config: config.clone(),
            factory,
            host: Box::new(NullHost),
            primary_mode: None,
            mode_configs: BTreeMap::new(),
            sessions: BTreeMap::new(),
            combination_logic: config.combination_logic,
            threshold: None,
            counter_limit: None,
            compare_faces: false,
            overwrite: false,
            store_checkpoints: config.store_checkpoints,
            last_results: None,
            combined_results: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        if let Some(mode) = config.default_compare_mode {
            orchestrator.set_primary_mode(mode);
        }
        orchestrator
    }

    pub fn with_host(mut self, host: impl CompareHost + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    // ========== Mode management ==========

    fn ensure_session(&mut self, mode: CompareMode) -> &mut ModeSession {
        self.sessions
            .entry(mode)
            .or_insert_with(|| ModeSession::new(mode))
    }

    pub fn set_primary_mode(&mut self, mode: CompareMode) {
        self.primary_mode = Some(mode);
        self.mode_configs
            .entry(mode)
            .or_insert_with(|| ModeConfig::new(mode));
        self.ensure_session(mode);
        info!("Primary compare mode set to {}", mode.name());
    }

    /// Add or replace a mode. The first mode added becomes primary.
    pub fn add_mode(&mut self, mode: CompareMode, weight: f64, threshold: Option<f64>) {
        self.add_mode_config(
            ModeConfig::new(mode)
                .with_weight(weight)
                .with_threshold(threshold),
        );
    }

    pub fn add_mode_config(&mut self, mode_config: ModeConfig) {
        let mode = mode_config.mode;
        if self.primary_mode.is_none() {
            self.primary_mode = Some(mode);
        }
        info!(
            "Added compare mode {} (weight={}, threshold={:?})",
            mode.name(),
            mode_config.weight,
            mode_config.threshold
        );
        self.mode_configs.insert(mode, mode_config);
        self.ensure_session(mode);
    }

    /// Remove a mode's config. Its session and comparator are kept for reuse.
    pub fn remove_mode(&mut self, mode: CompareMode) -> bool {
        if self.mode_configs.remove(&mode).is_none() {
            return false;
        }
        if self.primary_mode == Some(mode) {
            self.primary_mode = self.mode_configs.keys().next().copied();
            info!(
                "Removed primary mode {}, primary is now {:?}",
                mode.name(),
                self.primary_mode.map(CompareMode::name)
            );
        } else {
            info!("Removed compare mode {}", mode.name());
        }
        true
    }

    /// Make `mode` the only configured mode
    pub fn set_compare_mode(&mut self, mode: CompareMode) {
        self.mode_configs.retain(|configured, _| *configured == mode);
        self.set_primary_mode(mode);
    }

    pub fn set_combination_logic(&mut self, logic: CombinationLogic) {
        self.combination_logic = logic;
        info!("Combination logic set to {}", logic);
    }

    pub fn combination_logic(&self) -> CombinationLogic {
        self.combination_logic
    }

    pub fn set_mode_weight(&mut self, mode: CompareMode, weight: f64) {
        match self.mode_configs.get_mut(&mode) {
            Some(config) => config.weight = weight,
            None => warn!("Mode {} is not active, weight not set", mode.name()),
        }
    }

    pub fn set_mode_enabled(&mut self, mode: CompareMode, enabled: bool) {
        match self.mode_configs.get_mut(&mode) {
            Some(config) => config.enabled = enabled,
            None => warn!("Mode {} is not active, enabled flag not set", mode.name()),
        }
    }

    /// Enabled modes in `CompareMode` order
    pub fn active_modes(&self) -> Vec<CompareMode> {
        self.mode_configs
            .values()
            .filter(|config| config.enabled)
            .map(|config| config.mode)
            .collect()
    }

    pub fn mode_configs(&self) -> &BTreeMap<CompareMode, ModeConfig> {
        &self.mode_configs
    }

    pub fn mode_config(&self, mode: CompareMode) -> Option<&ModeConfig> {
        self.mode_configs.get(&mode)
    }

    pub fn primary_mode(&self) -> Option<CompareMode> {
        self.primary_mode
    }

    pub fn is_composite(&self) -> bool {
        self.mode_configs.len() > 1
    }

    // ========== Settings ==========

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: Option<f64>) {
        self.threshold = threshold;
        info!("Compare threshold set to {:?}", threshold);
    }

    pub fn counter_limit(&self) -> Option<usize> {
        self.counter_limit
    }

    pub fn set_counter_limit(&mut self, counter_limit: Option<usize>) {
        self.counter_limit = counter_limit;
        info!("Compare counter limit set to {:?}", counter_limit);
    }

    pub fn compare_faces(&self) -> bool {
        self.compare_faces
    }

    pub fn set_compare_faces(&mut self, compare_faces: bool) {
        self.compare_faces = compare_faces;
        info!("Compare faces set to {}", compare_faces);
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
        info!("Overwrite set to {}", overwrite);
    }

    pub fn store_checkpoints(&self) -> bool {
        self.store_checkpoints
    }

    pub fn set_store_checkpoints(&mut self, store_checkpoints: bool) {
        self.store_checkpoints = store_checkpoints;
        info!("Store checkpoints set to {}", store_checkpoints);
    }

    fn fallback_threshold(&self) -> f64 {
        let category = self
            .primary_mode
            .map(|mode| mode.metadata().threshold_category);
        match category {
            Some(ThresholdCategory::ColorDistance) => self.config.color_diff_threshold,
            _ => self.config.embedding_similarity_threshold,
        }
    }

    /// Copy the orchestrator settings onto `args`, falling back to the
    /// configured defaults for unset threshold and counter limit.
    pub fn apply_settings_to_args(&self, args: &mut CompareArgs) {
        args.threshold = self.threshold.unwrap_or_else(|| self.fallback_threshold());
        args.counter_limit = self.counter_limit.unwrap_or(self.config.file_counter_limit);
        args.compare_faces = self.compare_faces;
        args.overwrite = self.overwrite;
        args.store_checkpoints = self.store_checkpoints;
        self.log_settings(args);
    }

    fn describe_config(&self, config: &ModeConfig) -> String {
        let mut description = format!(
            "{}: threshold={}",
            config.mode.name(),
            config
                .threshold
                .map_or_else(|| "default".to_string(), |t| t.to_string())
        );
        if self.combination_logic == CombinationLogic::Weighted {
            description.push_str(&format!(", weight={}", config.weight));
        }
        if let Some(text) = &config.search_text {
            description.push_str(&format!(", search_text='{}'", text));
        }
        if let Some(text) = &config.search_text_negative {
            description.push_str(&format!(", search_text_negative='{}'", text));
        }
        description
    }

    fn log_settings(&self, args: &CompareArgs) {
        info!("{}", SETTINGS_RULE);
        info!(" COMPARE SETTINGS:");
        info!(
            " primary compare mode: {}",
            self.primary_mode.map_or("None", CompareMode::name)
        );
        info!(" composite mode: {}", self.is_composite());
        if self.is_composite() {
            let names: Vec<&str> = self.active_modes().into_iter().map(CompareMode::name).collect();
            info!(" active modes: {:?}", names);
            info!(" combination logic: {}", self.combination_logic);
            for config in self.mode_configs.values().filter(|config| config.enabled) {
                info!("   {}", self.describe_config(config));
            }
        }
        info!(" comparison files base directory: {}", args.base_dir.display());
        info!(" compare faces: {}", args.compare_faces);
        let threshold_label = self
            .primary_mode
            .map_or("embedding similarity threshold", |mode| {
                mode.metadata().threshold_label
            });
        info!(" {}: {}", threshold_label, args.threshold);
        info!(" max file process limit: {}", args.counter_limit);
        info!(" recursive: {}", args.recursive);
        info!(" file glob pattern: {:?}", args.inclusion_pattern);
        info!(" include videos: {}", args.include_videos);
        info!(" overwrite image data: {}", args.overwrite);
        info!(" store checkpoints: {}", args.store_checkpoints);
        info!("{}", SETTINGS_RULE);
    }

    // ========== Running ==========

    /// Token that cancels the current run when set
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        info!("Cancelling comparison");
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            info!("Comparison cancelled, discarding partial results");
            return Err(SimCompareError::Cancelled);
        }
        Ok(())
    }

    /// Run a comparison. With `None`, fresh args are built from the
    /// orchestrator settings.
    pub fn run(&mut self, args: Option<CompareArgs>) -> Result<()> {
        let primary = self
            .primary_mode
            .ok_or_else(|| SimCompareError::InvalidState("No compare mode set".to_string()))?;
        self.cancel.store(false, Ordering::Relaxed);

        let args = match args {
            Some(args) => args,
            None => {
                let mut args = CompareArgs {
                    mode: primary,
                    ..CompareArgs::default()
                };
                self.apply_settings_to_args(&mut args);
                args
            }
        };

        if !self.is_composite() {
            info!("Running single-mode comparison: {}", primary.name());
            let session = self
                .sessions
                .entry(primary)
                .or_insert_with(|| ModeSession::new(primary));
            return session.run(&self.factory, &args, self.host.as_mut(), Some(self.cancel.as_ref()));
        }

        self.run_composite(&args)
    }

    fn run_composite(&mut self, args: &CompareArgs) -> Result<()> {
        if self.mode_configs.is_empty() {
            return Err(SimCompareError::InvalidState(
                "No compare modes configured for composite search".to_string(),
            ));
        }
        let snapshot: Vec<ModeConfig> = self
            .mode_configs
            .values()
            .filter(|config| config.enabled)
            .cloned()
            .collect();
        if snapshot.is_empty() {
            return Err(SimCompareError::InvalidState(
                "No enabled compare modes for composite search".to_string(),
            ));
        }

        info!(
            "Running composite comparison with {} modes, combination logic {}",
            snapshot.len(),
            self.combination_logic
        );
        for config in &snapshot {
            info!("  {}", self.describe_config(config));
        }
        self.host.set_status(&format!(
            "Running composite comparison with {} modes...",
            snapshot.len()
        ));

        let mut results = ModeResults::new();
        for config in &snapshot {
            self.check_cancelled()?;

            let mut mode_args = args.clone();
            mode_args.mode = config.mode;
            if let Some(threshold) = config.threshold {
                mode_args.threshold = threshold;
            }
            if let Some(text) = &config.search_text {
                mode_args.search_text = Some(text.clone());
            }
            if let Some(text) = &config.search_text_negative {
                mode_args.search_text_negative = Some(text.clone());
            }

            let session = self
                .sessions
                .entry(config.mode)
                .or_insert_with(|| ModeSession::new(config.mode));
            let scores = match session.execute(&self.factory, &mode_args, Some(self.cancel.as_ref())) {
                Ok(outcome) => outcome.into_flat_scores(),
                Err(err) if err.is_cancelled() => {
                    info!("Comparison cancelled during {}", config.mode.name());
                    return Err(err);
                }
                Err(err) => {
                    let err = SimCompareError::mode_execution(config.mode, err.to_string());
                    error!("{}", err);
                    ScoreMap::new()
                }
            };
            info!("Mode {} found {} matches", config.mode.name(), scores.len());
            results.insert(config.mode, scores);
        }
        self.check_cancelled()?;

        let weights: HashMap<CompareMode, f64> = snapshot
            .iter()
            .map(|config| (config.mode, config.weight))
            .collect();
        let combined = combine(self.combination_logic, &results, &weights);
        info!(
            "Combined results using {} logic: {} matches",
            self.combination_logic,
            combined.len()
        );

        self.last_results = Some(results);
        self.combined_results = Some(combined);
        self.apply_combined_results_to_primary();
        Ok(())
    }

    fn apply_combined_results_to_primary(&mut self) {
        let Some(primary) = self.primary_mode else {
            return;
        };
        let combined = match &self.combined_results {
            Some(combined) if !combined.is_empty() => combined.clone(),
            _ => {
                self.host.set_status("No matches found");
                self.host.alert(
                    "No Match Found",
                    "None of the files match the composite search criteria.",
                );
                return;
            }
        };

        let session = self
            .sessions
            .entry(primary)
            .or_insert_with(|| ModeSession::new(primary));
        let state = session.state_mut();
        let count = state.apply_search_results(combined);

        self.host.set_app_mode(AppMode::Search);
        self.host
            .set_status(&format!("{} matches found (composite search)", count));
        self.host.announce_buttons_for_current_mode();
        if let Some(first) = state.current_match() {
            self.host.display_file(first);
        }
    }

    pub fn last_results(&self) -> Option<&ModeResults> {
        self.last_results.as_ref()
    }

    pub fn combined_results(&self) -> Option<&ScoreMap> {
        self.combined_results.as_ref()
    }

    // ========== Accessors ==========

    pub fn session(&self, mode: CompareMode) -> Option<&ModeSession> {
        self.sessions.get(&mode)
    }

    fn primary_session(&self) -> Option<&ModeSession> {
        self.primary_mode.and_then(|mode| self.sessions.get(&mode))
    }

    fn primary_session_and_host(&mut self) -> Option<(&mut ModeSession, &mut dyn CompareHost)> {
        let mode = self.primary_mode?;
        let session = self.sessions.get_mut(&mode)?;
        let host: &mut dyn CompareHost = self.host.as_mut();
        Some((session, host))
    }

    /// Match state of the primary mode
    pub fn current_match_state(&self) -> Option<&MatchState> {
        self.primary_session().map(ModeSession::state)
    }

    pub fn current_match_state_mut(&mut self) -> Option<&mut MatchState> {
        let mode = self.primary_mode?;
        self.sessions.get_mut(&mode).map(ModeSession::state_mut)
    }

    pub fn has_compare(&self) -> bool {
        self.primary_session()
            .map_or(false, ModeSession::has_comparator)
    }

    pub fn compare(&self) -> Result<&dyn Comparator> {
        self.primary_session()
            .and_then(ModeSession::comparator)
            .ok_or(SimCompareError::NoCompare)
    }

    pub fn clear_compare(&mut self) {
        let Some(mode) = self.primary_mode else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(&mode) {
            session.clear_comparator();
        }
    }

    // ========== Navigation ==========

    pub fn current_match(&self) -> Option<PathBuf> {
        self.current_match_state()
            .and_then(MatchState::current_match)
            .map(Path::to_path_buf)
    }

    pub fn skip_image(&self, path: &Path) -> bool {
        self.current_match_state()
            .map_or(false, |state| state.skip_image(path))
    }

    pub fn show_next_media(&mut self, show_alert: bool) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.show_next_media(show_alert, host)
    }

    pub fn show_prev_media(&mut self, show_alert: bool) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.show_prev_media(show_alert, host)
    }

    pub fn show_next_group(&mut self, file_browser: Option<&mut dyn FileBrowser>) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.show_next_group(file_browser, host)
    }

    pub fn show_prev_group(&mut self, file_browser: Option<&mut dyn FileBrowser>) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.show_prev_group(file_browser, host)
    }

    pub fn set_current_group(&mut self, start_match_index: usize) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.set_current_group(start_match_index, host)
    }

    pub fn page_down(&mut self, half_length: bool) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.page_down(half_length, host)
    }

    pub fn page_up(&mut self, half_length: bool) -> Option<PathBuf> {
        let (session, host) = self.primary_session_and_host()?;
        session.page_up(half_length, host)
    }

    // ========== Lookup and mutation ==========

    fn require_state(&self) -> Result<&MatchState> {
        self.current_match_state()
            .ok_or_else(|| SimCompareError::InvalidState("No compare mode set".to_string()))
    }

    pub fn select_series(&self, start_file: &Path, end_file: &Path) -> Result<Vec<PathBuf>> {
        self.require_state()?.select_series(start_file, end_file)
    }

    pub fn find_file_after_comparison(
        &self,
        search_text: &str,
        exact_match: bool,
    ) -> Option<(PathBuf, (usize, usize))> {
        self.current_match_state()?
            .find_file_after_comparison(search_text, exact_match)
    }

    pub fn file_group_map(&self, app_mode: AppMode) -> Result<HashMap<PathBuf, (usize, usize)>> {
        self.require_state()?.file_group_map(app_mode)
    }

    /// Remove files that left the disk from every mode's groups. Returns the
    /// number of entries removed from the primary mode's groups.
    pub fn remove_from_groups(&mut self, removed_files: &[PathBuf]) -> usize {
        let mut primary_removed = 0;
        for (mode, session) in self.sessions.iter_mut() {
            let removed = session.remove_from_groups(removed_files);
            if Some(*mode) == self.primary_mode {
                primary_removed = removed;
            }
        }
        primary_removed
    }

    /// Restore a file that came back to disk in every mode that knew it
    pub fn update_compare_for_readded_file(&mut self, file: &Path) -> bool {
        let mut restored = false;
        for session in self.sessions.values_mut() {
            restored |= session.update_compare_for_readded_file(file);
        }
        restored
    }

    pub fn update_groups_for_removed_file(
        &mut self,
        app_mode: AppMode,
        group_index: usize,
        match_index: usize,
        set_group: bool,
        show_next_media: bool,
    ) -> Result<()> {
        let (session, host) = self
            .primary_session_and_host()
            .ok_or_else(|| SimCompareError::InvalidState("No compare mode set".to_string()))?;
        session.update_groups_for_removed_file(
            app_mode,
            group_index,
            match_index,
            set_group,
            show_next_media,
            host,
        )
    }
}
