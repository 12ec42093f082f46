use simcompare_common::{AppMode, CompareMode, Result, ScoreMap, SimCompareError, SortDirection};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper bound on a single page jump
const MAX_PAGING_LENGTH: usize = 200;

/// Group a removed file came from, kept so it can be restored later
#[derive(Debug, Clone, Copy, PartialEq)]
struct RemovedOrigin {
    group: usize,
    score: f64,
}

/// What `update_groups_for_removed_file` did to the group structure
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    /// The file was dropped from its group; `current` is the new current
    /// match when the affected group is the one being viewed
    FileRemoved { current: Option<PathBuf> },
    /// The group fell below its minimum size and was dropped
    GroupRemoved { current: Option<PathBuf> },
    /// The last group was dropped and the results are now empty
    GroupsExhausted,
}

/// Match and group state of one compare mode.
///
/// `files_matched` is the sorted member list of the current group; for flat
/// search results (a single group 0) it is every matched file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    mode: CompareMode,
    pub app_mode: AppMode,
    /// Groups of the last run, kept in step with file removals
    pub files_grouped: BTreeMap<usize, ScoreMap>,
    /// Working copy of the groups used for navigation
    pub file_groups: BTreeMap<usize, ScoreMap>,
    pub files_matched: Vec<PathBuf>,
    /// Valid group keys in navigation order
    pub group_indexes: Vec<usize>,
    /// Position in `group_indexes`
    pub current_group_index: usize,
    /// Position in `files_matched`
    pub match_index: usize,
    pub max_group_index: usize,
    pub has_image_matches: bool,
    pub hidden_images: Vec<PathBuf>,
    pub search_image_full_path: Option<PathBuf>,
    removed_origins: HashMap<PathBuf, RemovedOrigin>,
    /// Members still on disk of groups dropped for falling below two files
    dropped_members: HashMap<usize, ScoreMap>,
}

/// Sort a group's files best-first, ties broken by ascending path
pub fn sorted_files(group: &ScoreMap, direction: SortDirection) -> Vec<PathBuf> {
    let mut entries: Vec<(&PathBuf, f64)> = group.iter().map(|(path, score)| (path, *score)).collect();
    entries.sort_by(|a, b| direction.compare_scores(a.1, b.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().map(|(path, _)| path.clone()).collect()
}

impl MatchState {
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            app_mode: AppMode::Browse,
            files_grouped: BTreeMap::new(),
            file_groups: BTreeMap::new(),
            files_matched: Vec::new(),
            group_indexes: Vec::new(),
            current_group_index: 0,
            match_index: 0,
            max_group_index: 0,
            has_image_matches: false,
            hidden_images: Vec::new(),
            search_image_full_path: None,
            removed_origins: HashMap::new(),
            dropped_members: HashMap::new(),
        }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    /// Direction files are listed in for the given navigation context.
    /// Search results follow the mode's ranking; group members are listed by
    /// ascending in-group score.
    pub fn view_direction(&self, app_mode: AppMode) -> SortDirection {
        match app_mode {
            AppMode::Search => self.mode.sort_direction(),
            _ => SortDirection::Ascending,
        }
    }

    /// Drop all results and cursors. Hidden files and removal history survive.
    pub fn clear_results(&mut self) {
        self.files_grouped.clear();
        self.file_groups.clear();
        self.files_matched.clear();
        self.group_indexes.clear();
        self.current_group_index = 0;
        self.match_index = 0;
        self.max_group_index = 0;
        self.has_image_matches = false;
    }

    /// Replace the state with flat search results held in group 0.
    pub fn apply_search_results(&mut self, scores: ScoreMap) -> usize {
        self.removed_origins.clear();
        self.dropped_members.clear();
        self.app_mode = AppMode::Search;
        self.files_matched = sorted_files(&scores, self.mode.sort_direction());
        self.files_grouped = BTreeMap::from([(0, scores)]);
        self.file_groups = self.files_grouped.clone();
        self.group_indexes = vec![0];
        self.current_group_index = 0;
        self.max_group_index = 0;
        self.match_index = 0;
        self.has_image_matches = !self.files_matched.is_empty();
        self.files_matched.len()
    }

    /// Replace the state with a partition into groups.
    ///
    /// Groups are navigated smallest first. Leading single-member groups are
    /// skipped; returns true when any were found.
    pub fn apply_groups(&mut self, groups: BTreeMap<usize, ScoreMap>) -> bool {
        self.removed_origins.clear();
        self.dropped_members.clear();
        self.clear_results();
        self.app_mode = AppMode::Group;

        let mut indexes: Vec<usize> = groups.keys().copied().collect();
        indexes.sort_by_key(|key| (groups[key].len(), *key));
        self.max_group_index = groups.keys().max().copied().unwrap_or(0);
        self.group_indexes = indexes;
        self.files_grouped = groups;
        self.file_groups = self.files_grouped.clone();

        let mut stranded = false;
        while let Some(key) = self.group_indexes.get(self.current_group_index) {
            if self.file_groups[key].len() != 1 {
                break;
            }
            stranded = true;
            self.current_group_index += 1;
        }
        if self.current_group_index >= self.group_indexes.len() {
            self.current_group_index = 0;
        }

        self.set_current_group(0);
        stranded
    }

    /// Replace the groups with one two-file group per probable duplicate pair
    pub fn apply_duplicates(&mut self, duplicates: &[(PathBuf, PathBuf)]) {
        self.removed_origins.clear();
        self.dropped_members.clear();
        self.clear_results();
        self.app_mode = AppMode::Duplicates;

        for (index, (first, second)) in duplicates.iter().enumerate() {
            let group = ScoreMap::from([(first.clone(), 0.0), (second.clone(), 0.0)]);
            self.file_groups.insert(index, group);
            self.group_indexes.push(index);
        }
        self.max_group_index = duplicates.len().saturating_sub(1);
        self.files_grouped = self.file_groups.clone();
        self.set_current_group(0);
    }

    pub fn current_match(&self) -> Option<&Path> {
        self.files_matched.get(self.match_index).map(PathBuf::as_path)
    }

    /// Key of the current group
    pub fn actual_group_index(&self) -> Option<usize> {
        self.group_indexes.get(self.current_group_index).copied()
    }

    fn sorted_group(&self, key: usize, app_mode: AppMode) -> Vec<PathBuf> {
        self.file_groups
            .get(&key)
            .map(|group| sorted_files(group, self.view_direction(app_mode)))
            .unwrap_or_default()
    }

    /// Rebuild `files_matched` from the current group, starting at
    /// `start_match_index`. Returns the new current match.
    pub fn set_current_group(&mut self, start_match_index: usize) -> Option<PathBuf> {
        let Some(key) = self.actual_group_index() else {
            self.files_matched.clear();
            self.match_index = 0;
            self.has_image_matches = false;
            return None;
        };
        self.files_matched = self.sorted_group(key, self.app_mode);
        self.match_index = start_match_index.min(self.files_matched.len().saturating_sub(1));
        self.has_image_matches = !self.files_matched.is_empty();
        self.current_match().map(Path::to_path_buf)
    }

    /// Rebuild the current group's file list, keeping the cursor on `keep`
    /// when it is still a member.
    fn refresh_current_group(&mut self, keep: Option<&Path>, fallback_index: usize) {
        let Some(key) = self.actual_group_index() else {
            self.files_matched.clear();
            self.match_index = 0;
            self.has_image_matches = false;
            return;
        };
        self.files_matched = self.sorted_group(key, self.app_mode);
        let last = self.files_matched.len().saturating_sub(1);
        self.match_index = keep
            .and_then(|file| self.files_matched.iter().position(|f| f == file))
            .unwrap_or_else(|| fallback_index.min(last));
        self.has_image_matches = !self.files_matched.is_empty();
    }

    // ========== Hidden files ==========

    pub fn skip_image(&self, path: &Path) -> bool {
        self.hidden_images.iter().any(|hidden| hidden == path)
    }

    pub fn hide_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.skip_image(&path) {
            self.hidden_images.push(path);
        }
    }

    pub fn unhide_file(&mut self, path: &Path) -> bool {
        let before = self.hidden_images.len();
        self.hidden_images.retain(|hidden| hidden != path);
        before != self.hidden_images.len()
    }

    pub fn clear_hidden(&mut self) {
        self.hidden_images.clear();
    }

    // ========== Navigation ==========

    fn step_media(&mut self, forward: bool) -> Option<PathBuf> {
        let len = self.files_matched.len();
        if len == 0 {
            return None;
        }
        let start = self.match_index.min(len - 1);
        let mut index = start;
        for _ in 0..len {
            index = if forward { (index + 1) % len } else { (index + len - 1) % len };
            if !self.skip_image(&self.files_matched[index]) {
                self.match_index = index;
                return Some(self.files_matched[index].clone());
            }
        }
        // Every file is hidden: one full cycle ends back on the start file
        self.match_index = start;
        Some(self.files_matched[start].clone())
    }

    pub fn next_media(&mut self) -> Option<PathBuf> {
        self.step_media(true)
    }

    pub fn prev_media(&mut self) -> Option<PathBuf> {
        self.step_media(false)
    }

    pub fn next_group(&mut self) -> Option<PathBuf> {
        let len = self.group_indexes.len();
        if len == 0 {
            return None;
        }
        self.current_group_index = (self.current_group_index + 1) % len;
        self.set_current_group(0)
    }

    pub fn prev_group(&mut self) -> Option<PathBuf> {
        let len = self.group_indexes.len();
        if len == 0 {
            return None;
        }
        self.current_group_index = if self.current_group_index == 0 || self.current_group_index >= len {
            len - 1
        } else {
            self.current_group_index - 1
        };
        self.set_current_group(0)
    }

    fn paging_length(&self, half_length: bool) -> usize {
        let divisor = if half_length { 20 } else { 10 };
        (self.files_matched.len() / divisor).clamp(1, MAX_PAGING_LENGTH)
    }

    pub fn page_down(&mut self, half_length: bool) -> Option<PathBuf> {
        if self.files_matched.is_empty() {
            return None;
        }
        let target = self.match_index + self.paging_length(half_length);
        self.match_index = if target >= self.files_matched.len() { 0 } else { target };
        self.current_match().map(Path::to_path_buf)
    }

    pub fn page_up(&mut self, half_length: bool) -> Option<PathBuf> {
        if self.files_matched.is_empty() {
            return None;
        }
        let length = self.paging_length(half_length);
        self.match_index = match self.match_index.checked_sub(length) {
            Some(target) => target,
            None => self.files_matched.len() - 1,
        };
        self.current_match().map(Path::to_path_buf)
    }

    // ========== Lookup ==========

    /// Contiguous run of matches between two files, inclusive, in list order
    pub fn select_series(&self, start_file: &Path, end_file: &Path) -> Result<Vec<PathBuf>> {
        let position = |file: &Path| {
            self.files_matched
                .iter()
                .position(|f| f == file)
                .ok_or_else(|| SimCompareError::NotInMatches(file.display().to_string()))
        };
        let start = position(start_file)?;
        let end = position(end_file)?;
        let (low, high) = if start > end { (end, start) } else { (start, end) };
        Ok(self.files_matched[low..=high].to_vec())
    }

    fn file_locations(&self, app_mode: AppMode) -> Vec<(PathBuf, (usize, usize))> {
        let mut locations = Vec::new();
        for (group_position, key) in self.group_indexes.iter().enumerate() {
            for (match_index, file) in self.sorted_group(*key, app_mode).into_iter().enumerate() {
                locations.push((file, (group_position, match_index)));
            }
        }
        locations
    }

    /// Every matched file mapped to its `(group position, match index)`
    pub fn file_group_map(&self, app_mode: AppMode) -> Result<HashMap<PathBuf, (usize, usize)>> {
        if app_mode == AppMode::Browse {
            return Err(SimCompareError::InvalidState(
                "Cannot get file group map in Browse mode".to_string(),
            ));
        }
        Ok(self.file_locations(app_mode).into_iter().collect())
    }

    /// Locate a file in the current results by exact path, exact file name,
    /// case-insensitive name prefix, then case-insensitive name substring.
    pub fn find_file_after_comparison(
        &self,
        search_text: &str,
        exact_match: bool,
    ) -> Option<(PathBuf, (usize, usize))> {
        if search_text.trim().is_empty() || self.app_mode == AppMode::Browse {
            return None;
        }
        let locations = self.file_locations(self.app_mode);
        let file_name = |path: &Path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let by_path = locations.iter().find(|(path, _)| path.as_path() == Path::new(search_text));
        let by_name = || locations.iter().find(|(path, _)| file_name(path) == search_text);
        if let Some(found) = by_path.or_else(by_name) {
            return Some(found.clone());
        }
        if exact_match {
            return None;
        }

        let needle = search_text.to_lowercase();
        locations
            .iter()
            .find(|(path, _)| file_name(path).to_lowercase().starts_with(&needle))
            .or_else(|| {
                locations
                    .iter()
                    .find(|(path, _)| file_name(path).to_lowercase().contains(&needle))
            })
            .cloned()
    }

    // ========== Mutation ==========

    fn record_origin(&mut self, key: usize, file: &Path) {
        if let Some(score) = self.file_groups.get(&key).and_then(|group| group.get(file)) {
            self.removed_origins
                .insert(file.to_path_buf(), RemovedOrigin { group: key, score: *score });
        }
    }

    /// Whether a removed file can be restored by `readd_file`
    pub fn has_removed_origin(&self, file: &Path) -> bool {
        self.removed_origins.contains_key(file)
    }

    /// Remove files from every group without re-running the comparison.
    ///
    /// Emptied groups are dropped. The cursors stay on the same group and
    /// file when those survive and are clamped otherwise. Returns the number
    /// of group entries removed.
    pub fn remove_from_groups(&mut self, removed_files: &[PathBuf]) -> usize {
        let removed: HashSet<&Path> = removed_files.iter().map(PathBuf::as_path).collect();
        for members in self.dropped_members.values_mut() {
            members.retain(|file, _| !removed.contains(file.as_path()));
        }
        self.dropped_members.retain(|_, members| !members.is_empty());
        if removed.is_empty() || self.file_groups.is_empty() {
            return 0;
        }

        let current_key = self.actual_group_index();
        let current_file = self.current_match().map(Path::to_path_buf);
        let old_match_index = self.match_index;
        let old_group_position = self.current_group_index;
        let old_indexes = self.group_indexes.clone();

        let mut removed_count = 0;
        for (key, group) in self.file_groups.iter_mut() {
            group.retain(|file, score| {
                if removed.contains(file.as_path()) {
                    self.removed_origins
                        .insert(file.clone(), RemovedOrigin { group: *key, score: *score });
                    removed_count += 1;
                    false
                } else {
                    true
                }
            });
        }
        if removed_count == 0 {
            return 0;
        }
        for group in self.files_grouped.values_mut() {
            group.retain(|file, _| !removed.contains(file.as_path()));
        }
        self.file_groups.retain(|_, group| !group.is_empty());
        self.files_grouped.retain(|_, group| !group.is_empty());
        self.group_indexes.retain(|key| self.file_groups.contains_key(key));
        debug!(
            "Removed {} entries, {} groups remain",
            removed_count,
            self.group_indexes.len()
        );

        if self.group_indexes.is_empty() {
            self.clear_results();
            return removed_count;
        }

        self.max_group_index = self.group_indexes.iter().max().copied().unwrap_or(0);
        self.current_group_index = match current_key
            .and_then(|key| self.group_indexes.iter().position(|k| *k == key))
        {
            Some(position) => position,
            None => {
                let surviving_before = old_indexes
                    .iter()
                    .take(old_group_position)
                    .filter(|key| self.file_groups.contains_key(key))
                    .count();
                surviving_before.min(self.group_indexes.len() - 1)
            }
        };

        let same_group = current_key == self.actual_group_index();
        let keep = if same_group { current_file.as_deref() } else { None };
        let fallback = if same_group { old_match_index } else { 0 };
        self.refresh_current_group(keep, fallback);
        removed_count
    }

    /// Restore a file removed earlier into the group it came from, with its
    /// last known score. Files with no known origin are ignored.
    pub fn readd_file(&mut self, file: &Path) -> bool {
        let Some(origin) = self.removed_origins.remove(file) else {
            return false;
        };
        let had_matches = !self.files_matched.is_empty();
        let current_file = self.current_match().map(Path::to_path_buf);

        self.file_groups
            .entry(origin.group)
            .or_default()
            .insert(file.to_path_buf(), origin.score);
        self.files_grouped
            .entry(origin.group)
            .or_default()
            .insert(file.to_path_buf(), origin.score);
        if let Some(members) = self.dropped_members.remove(&origin.group) {
            debug!("Restoring {} dropped members of group {}", members.len(), origin.group);
            for (member, score) in members {
                self.removed_origins.remove(&member);
                self.file_groups
                    .entry(origin.group)
                    .or_default()
                    .insert(member.clone(), score);
                self.files_grouped
                    .entry(origin.group)
                    .or_default()
                    .insert(member, score);
            }
        }
        if !self.group_indexes.contains(&origin.group) {
            // Without a surviving group the cursor lands on the restored one
            if !had_matches {
                self.current_group_index = self.group_indexes.len();
            }
            self.group_indexes.push(origin.group);
            self.max_group_index = self.max_group_index.max(origin.group);
        }
        debug!("Re-added {} to group {}", file.display(), origin.group);

        if !had_matches || self.actual_group_index() == Some(origin.group) {
            self.refresh_current_group(current_file.as_deref(), self.match_index);
        }
        true
    }

    fn group_files_at(&self, app_mode: AppMode, group_index: usize) -> Result<(usize, Vec<PathBuf>)> {
        let actual_index = *self.group_indexes.get(group_index).ok_or_else(|| {
            SimCompareError::InvalidState(format!("Group position {} out of range", group_index))
        })?;
        let files = if group_index == self.current_group_index {
            self.files_matched.clone()
        } else {
            self.sorted_group(actual_index, app_mode)
        };
        Ok((actual_index, files))
    }

    fn file_in(files: &[PathBuf], group_index: usize, match_index: usize) -> Result<PathBuf> {
        files.get(match_index).cloned().ok_or_else(|| {
            SimCompareError::InvalidState(format!(
                "Match index {} out of range for group {}",
                match_index, group_index
            ))
        })
    }

    /// File shown at `(group_index, match_index)` in `app_mode`
    pub fn file_at(&self, app_mode: AppMode, group_index: usize, match_index: usize) -> Result<PathBuf> {
        let (_, files) = self.group_files_at(app_mode, group_index)?;
        Self::file_in(&files, group_index, match_index)
    }

    /// Interactive single-file removal at `(group_index, match_index)`, where
    /// `group_index` is a position in `group_indexes`.
    ///
    /// In group and duplicate views a group left with a single file is
    /// dropped entirely; in search views the group is dropped only once empty.
    pub fn update_groups_for_removed_file(
        &mut self,
        app_mode: AppMode,
        group_index: usize,
        match_index: usize,
        set_group: bool,
    ) -> Result<RemovalOutcome> {
        debug!("Updating groups for removed file {} in group {}", match_index, group_index);
        let (actual_index, files) = self.group_files_at(app_mode, group_index)?;
        let is_current = group_index == self.current_group_index;
        let filepath = Self::file_in(&files, group_index, match_index)?;
        self.record_origin(actual_index, &filepath);

        let min_remaining = match app_mode {
            AppMode::Group | AppMode::Duplicates => 2,
            AppMode::Search | AppMode::Browse => 1,
        };
        if files.len() - 1 < min_remaining {
            if let Some(mut members) = self.file_groups.remove(&actual_index) {
                members.remove(&filepath);
                if !members.is_empty() {
                    self.dropped_members.insert(actual_index, members);
                }
            }
            self.files_grouped.remove(&actual_index);
            self.group_indexes.remove(group_index);
            if group_index < self.current_group_index {
                self.current_group_index -= 1;
            }
            if self.group_indexes.is_empty() {
                self.clear_results();
                return Ok(RemovalOutcome::GroupsExhausted);
            }
            if self.current_group_index >= self.group_indexes.len() {
                self.current_group_index = 0;
            }
            self.max_group_index = self.group_indexes.iter().max().copied().unwrap_or(0);
            let current = if set_group || is_current {
                self.set_current_group(0)
            } else {
                None
            };
            return Ok(RemovalOutcome::GroupRemoved { current });
        }

        if let Some(group) = self.file_groups.get_mut(&actual_index) {
            group.remove(&filepath);
        }
        if let Some(group) = self.files_grouped.get_mut(&actual_index) {
            group.remove(&filepath);
        }

        if !is_current {
            return Ok(RemovalOutcome::FileRemoved { current: None });
        }
        self.files_matched.remove(match_index);
        if self.match_index > match_index {
            self.match_index -= 1;
        }
        if self.match_index >= self.files_matched.len() {
            self.match_index = 0;
        }
        self.has_image_matches = !self.files_matched.is_empty();
        Ok(RemovalOutcome::FileRemoved {
            current: self.current_match().map(Path::to_path_buf),
        })
    }
}
