//! Scripted collaborators shared by the unit tests.

use crate::comparator::{Comparator, ComparatorFactory, CompareOutcome};
use crate::host::CompareHost;
use simcompare_common::{AppMode, CompareArgs, CompareMode, Result, ScoreMap, SimCompareError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Status(String),
    Buttons,
    Display(PathBuf),
    Alert(String),
    Toast(String),
    AppMode(AppMode),
}

/// Host that records every callback into a shared log
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pub events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Alert(title) => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn displayed(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Display(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn push(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl CompareHost for RecordingHost {
    fn set_status(&mut self, text: &str) {
        self.push(HostEvent::Status(text.to_string()));
    }

    fn announce_buttons_for_current_mode(&mut self) {
        self.push(HostEvent::Buttons);
    }

    fn display_file(&mut self, path: &Path) {
        self.push(HostEvent::Display(path.to_path_buf()));
    }

    fn alert(&mut self, title: &str, _message: &str) {
        self.push(HostEvent::Alert(title.to_string()));
    }

    fn toast(&mut self, message: &str) {
        self.push(HostEvent::Toast(message.to_string()));
    }

    fn set_app_mode(&mut self, mode: AppMode) {
        self.push(HostEvent::AppMode(mode));
    }
}

/// What a scripted comparator does when run
#[derive(Debug, Clone)]
pub enum Script {
    Returns(CompareOutcome),
    Fails(String),
    /// Returns the outcome after raising the given cancel flag
    CancelsAfter(CompareOutcome, Arc<AtomicBool>),
}

/// Shared record of the args each mode was run with
pub type RunLog = Arc<Mutex<Vec<(CompareMode, CompareArgs)>>>;

pub struct ScriptedComparator {
    mode: CompareMode,
    base_dir: PathBuf,
    script: Script,
    log: RunLog,
    related: Vec<(PathBuf, PathBuf)>,
    removed: Arc<Mutex<Vec<PathBuf>>>,
}

impl Comparator for ScriptedComparator {
    fn mode(&self) -> CompareMode {
        self.mode
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn run(&mut self, args: &CompareArgs, _cancel: Option<&AtomicBool>) -> Result<CompareOutcome> {
        self.log.lock().unwrap().push((self.mode, args.clone()));
        match &self.script {
            Script::Returns(outcome) => Ok(outcome.clone()),
            Script::Fails(message) => Err(SimCompareError::InvalidState(message.clone())),
            Script::CancelsAfter(outcome, flag) => {
                flag.store(true, Ordering::Relaxed);
                Ok(outcome.clone())
            }
        }
    }

    fn remove_files(&mut self, files: &[PathBuf]) {
        self.removed.lock().unwrap().extend_from_slice(files);
    }

    fn is_related(&self, first: &Path, second: &Path) -> bool {
        self.related
            .iter()
            .any(|(a, b)| (a == first && b == second) || (a == second && b == first))
    }
}

/// Builds a factory out of per-mode scripts
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: HashMap<CompareMode, Script>,
    related: Vec<(PathBuf, PathBuf)>,
    pub log: RunLog,
    pub created: Arc<Mutex<Vec<CompareMode>>>,
    /// Files passed to `remove_files` on any comparator built by the factory
    pub removed: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mode: CompareMode, script: Script) -> Self {
        self.scripts.insert(mode, script);
        self
    }

    pub fn with_search(self, mode: CompareMode, scores: ScoreMap) -> Self {
        self.with(mode, Script::Returns(CompareOutcome::Search(scores)))
    }

    pub fn with_related(mut self, first: &str, second: &str) -> Self {
        self.related.push((PathBuf::from(first), PathBuf::from(second)));
        self
    }

    pub fn build(self) -> ComparatorFactory {
        let ScriptedFactory {
            scripts,
            related,
            log,
            created,
            removed,
        } = self;
        Box::new(move |mode: CompareMode, args: &CompareArgs| {
            created.lock().unwrap().push(mode);
            let script = scripts
                .get(&mode)
                .cloned()
                .unwrap_or_else(|| Script::Returns(CompareOutcome::empty_search()));
            Ok(Box::new(ScriptedComparator {
                mode,
                base_dir: args.base_dir.clone(),
                script,
                log: Arc::clone(&log),
                related: related.clone(),
                removed: Arc::clone(&removed),
            }) as Box<dyn Comparator>)
        })
    }
}

pub fn scores(entries: &[(&str, f64)]) -> ScoreMap {
    entries
        .iter()
        .map(|(name, score)| (PathBuf::from(name), *score))
        .collect()
}
