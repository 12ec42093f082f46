use crate::comparator::{Comparator, ComparatorFactory, CompareOutcome};
use crate::host::{CompareHost, FileBrowser};
use crate::match_state::{MatchState, RemovalOutcome};
use simcompare_common::{AppMode, CompareArgs, CompareMode, Result, ScoreMap, SimCompareError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// One compare mode's comparator together with its match state.
///
/// The comparator is created on first use and replaced when a run targets a
/// different base directory. Sessions are never discarded, so a mode that is
/// removed and added again keeps its comparator caches.
pub struct ModeSession {
    mode: CompareMode,
    comparator: Option<Box<dyn Comparator>>,
    state: MatchState,
}

impl std::fmt::Debug for ModeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeSession")
            .field("mode", &self.mode)
            .field("has_comparator", &self.comparator.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl ModeSession {
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            comparator: None,
            state: MatchState::new(mode),
        }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    pub fn has_comparator(&self) -> bool {
        self.comparator.is_some()
    }

    pub fn comparator(&self) -> Option<&dyn Comparator> {
        self.comparator.as_deref()
    }

    /// Drop the comparator; the next run creates a fresh one
    pub fn clear_comparator(&mut self) {
        self.comparator = None;
    }

    fn ensure_comparator(
        &mut self,
        factory: &ComparatorFactory,
        args: &CompareArgs,
    ) -> Result<&mut dyn Comparator> {
        let stale = match &self.comparator {
            Some(comparator) => comparator.base_dir() != args.base_dir,
            None => true,
        };
        if stale {
            info!(
                "Creating {} comparator for {}",
                self.mode,
                args.base_dir.display()
            );
            self.comparator = Some(factory(self.mode, args)?);
        }
        match self.comparator.as_mut() {
            Some(comparator) => Ok(comparator.as_mut()),
            None => Err(SimCompareError::NoCompare),
        }
    }

    /// Run the comparator without touching the match state
    pub fn execute(
        &mut self,
        factory: &ComparatorFactory,
        args: &CompareArgs,
        cancel: Option<&AtomicBool>,
    ) -> Result<CompareOutcome> {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(SimCompareError::Cancelled);
            }
        }
        let comparator = self.ensure_comparator(factory, args)?;
        comparator.run(args, cancel)
    }

    /// Single-mode run: execute the comparator and replace the match state
    /// with its results. The state is left alone if the comparator fails.
    pub fn run(
        &mut self,
        factory: &ComparatorFactory,
        args: &CompareArgs,
        host: &mut dyn CompareHost,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        if args.is_search() {
            host.set_status("Running image comparison with search...");
        } else {
            host.set_status("Running image comparisons...");
        }

        let outcome = self.execute(factory, args, cancel)?;
        host.set_app_mode(if args.is_search() {
            AppMode::Search
        } else {
            AppMode::Group
        });
        self.state.search_image_full_path = args.search_file_path.clone();

        if args.is_search() {
            self.apply_search(outcome.into_flat_scores(), host);
        } else {
            match outcome {
                CompareOutcome::Search(scores) => {
                    self.apply_groups(BTreeMap::from([(0, scores)]), &[], false, host)
                }
                CompareOutcome::Groups { groups, duplicates } => {
                    self.apply_groups(groups, &duplicates, args.find_duplicates, host)
                }
            }
        }
        Ok(())
    }

    fn apply_search(&mut self, scores: ScoreMap, host: &mut dyn CompareHost) {
        let count = self.state.apply_search_results(scores);
        if count == 0 {
            host.set_status("Set a directory and search file.");
            host.alert(
                "No Match Found",
                "None of the files match the search with current settings.",
            );
            return;
        }
        host.set_status(&format!("{} possibly related images found.", count));
        host.announce_buttons_for_current_mode();
        if let Some(first) = self.state.current_match() {
            host.display_file(first);
        }
    }

    fn apply_groups(
        &mut self,
        mut groups: BTreeMap<usize, ScoreMap>,
        duplicates: &[(PathBuf, PathBuf)],
        find_duplicates: bool,
        host: &mut dyn CompareHost,
    ) {
        groups.retain(|_, group| !group.is_empty());
        if groups.is_empty() {
            self.state.clear_results();
            host.set_status("Set a directory and search file.");
            host.alert(
                "No Groups Found",
                "None of the files can be grouped with current settings.",
            );
            return;
        }

        if find_duplicates {
            if duplicates.is_empty() {
                self.state.clear_results();
                host.set_status("Set a directory and search file.");
                host.alert(
                    "No Duplicates Found",
                    "None of the files appear to be duplicates based on the current settings.",
                );
                return;
            }
            info!("Found {} probable duplicate pairs", duplicates.len());
            self.state.apply_duplicates(duplicates);
            host.set_app_mode(AppMode::Duplicates);
        } else if self.state.apply_groups(groups) {
            host.alert(
                "Stranded Group Members Found",
                "Some group members were left stranded by the grouping process.",
            );
        }

        host.announce_buttons_for_current_mode();
        self.announce_group(host);
    }

    fn announce_group(&self, host: &mut dyn CompareHost) {
        host.set_status(&format!(
            "Group {} ({} files)",
            self.state.current_group_index + 1,
            self.state.files_matched.len()
        ));
        if let Some(file) = self.state.current_match() {
            host.display_file(file);
        }
    }

    // ========== Navigation ==========

    fn require_matches(&self, show_alert: bool, host: &mut dyn CompareHost) -> bool {
        if !self.state.files_matched.is_empty() {
            return true;
        }
        if show_alert {
            host.alert(
                "Search required",
                "No matches found. Search again to find potential matches.",
            );
        }
        false
    }

    pub fn show_next_media(&mut self, show_alert: bool, host: &mut dyn CompareHost) -> Option<PathBuf> {
        if !self.require_matches(show_alert, host) {
            return None;
        }
        let file = self.state.next_media()?;
        host.display_file(&file);
        Some(file)
    }

    pub fn show_prev_media(&mut self, show_alert: bool, host: &mut dyn CompareHost) -> Option<PathBuf> {
        if !self.require_matches(show_alert, host) {
            return None;
        }
        let file = self.state.prev_media()?;
        host.display_file(&file);
        Some(file)
    }

    pub fn show_next_group(
        &mut self,
        file_browser: Option<&mut dyn FileBrowser>,
        host: &mut dyn CompareHost,
    ) -> Option<PathBuf> {
        if let Some(browser) = file_browser {
            return self.find_next_unrelated(browser, true, host);
        }
        if self.state.next_group().is_none() {
            host.toast("No Groups Found");
            return None;
        }
        self.announce_group(host);
        self.state.current_match().map(Path::to_path_buf)
    }

    pub fn show_prev_group(
        &mut self,
        file_browser: Option<&mut dyn FileBrowser>,
        host: &mut dyn CompareHost,
    ) -> Option<PathBuf> {
        if let Some(browser) = file_browser {
            return self.find_next_unrelated(browser, false, host);
        }
        if self.state.prev_group().is_none() {
            host.toast("No Groups Found");
            return None;
        }
        self.announce_group(host);
        self.state.current_match().map(Path::to_path_buf)
    }

    pub fn set_current_group(&mut self, start_match_index: usize, host: &mut dyn CompareHost) -> Option<PathBuf> {
        if self.state.group_indexes.is_empty() {
            host.toast("No Groups Found");
            return None;
        }
        let file = self.state.set_current_group(start_match_index);
        self.announce_group(host);
        file
    }

    pub fn page_down(&mut self, half_length: bool, host: &mut dyn CompareHost) -> Option<PathBuf> {
        let file = self.state.page_down(half_length)?;
        host.display_file(&file);
        Some(file)
    }

    pub fn page_up(&mut self, half_length: bool, host: &mut dyn CompareHost) -> Option<PathBuf> {
        let file = self.state.page_up(half_length)?;
        host.display_file(&file);
        Some(file)
    }

    /// Walk the browser until a file the comparator does not consider related
    /// to its predecessor. Stops after one full cycle.
    fn find_next_unrelated(
        &self,
        browser: &mut dyn FileBrowser,
        forward: bool,
        host: &mut dyn CompareHost,
    ) -> Option<PathBuf> {
        let original = browser.current_file()?;
        let mut previous = original.clone();
        let mut skip_count = 0usize;

        for _ in 0..browser.files().len() {
            let next = if forward {
                browser.next_file()
            } else {
                browser.previous_file()
            }?;
            if next == original {
                break;
            }
            let related = self
                .comparator
                .as_ref()
                .map_or(false, |comparator| comparator.is_related(&previous, &next));
            if !related {
                host.display_file(&next);
                host.toast(&format!("Skipped {} images.", skip_count));
                return Some(next);
            }
            skip_count += 1;
            previous = next;
        }

        debug!("No unrelated file after skipping {}", skip_count);
        host.alert("No Unrelated Images", "No unrelated images found.");
        None
    }

    // ========== Mutation ==========

    /// Drop files removed from disk from the groups and the comparator
    pub fn remove_from_groups(&mut self, files: &[PathBuf]) -> usize {
        if let Some(comparator) = self.comparator.as_mut() {
            comparator.remove_files(files);
        }
        self.state.remove_from_groups(files)
    }

    /// Restore a file that came back to disk into its former group
    pub fn update_compare_for_readded_file(&mut self, file: &Path) -> bool {
        if let Some(comparator) = self.comparator.as_mut() {
            comparator.readd_files(&[file.to_path_buf()]);
        }
        self.state.readd_file(file)
    }

    pub fn update_groups_for_removed_file(
        &mut self,
        app_mode: AppMode,
        group_index: usize,
        match_index: usize,
        set_group: bool,
        show_next_media: bool,
        host: &mut dyn CompareHost,
    ) -> Result<()> {
        let file = self.state.file_at(app_mode, group_index, match_index)?;
        let outcome =
            self.state
                .update_groups_for_removed_file(app_mode, group_index, match_index, set_group)?;
        if let Some(comparator) = self.comparator.as_mut() {
            comparator.remove_files(&[file]);
        }
        match outcome {
            RemovalOutcome::GroupsExhausted => {
                host.alert(
                    "No More Groups",
                    "There are no more image groups remaining for this directory and current filter settings.",
                );
                host.set_app_mode(AppMode::Browse);
                host.set_status("Set a directory to run comparison.");
            }
            RemovalOutcome::GroupRemoved { current } | RemovalOutcome::FileRemoved { current } => {
                if let (true, Some(file)) = (show_next_media, current) {
                    host.display_file(&file);
                }
            }
        }
        Ok(())
    }
}
