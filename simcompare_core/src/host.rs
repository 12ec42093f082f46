use simcompare_common::AppMode;
use std::path::{Path, PathBuf};

/// Callbacks into the application hosting the engine.
///
/// Every method has a no-op default so headless callers only implement what
/// they display.
pub trait CompareHost: Send {
    /// Replace the status line
    fn set_status(&mut self, _text: &str) {}

    /// Refresh the action buttons for the current app mode
    fn announce_buttons_for_current_mode(&mut self) {}

    /// Show a file to the user
    fn display_file(&mut self, _path: &Path) {}

    /// Surface a blocking notification
    fn alert(&mut self, _title: &str, _message: &str) {}

    /// Surface a transient notification
    fn toast(&mut self, _message: &str) {}

    /// Switch the application's navigation context
    fn set_app_mode(&mut self, _mode: AppMode) {}
}

/// Host that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl CompareHost for NullHost {}

/// Ordered file list supplied by the application's browser.
///
/// The engine never walks directories itself; it only steps through what the
/// browser hands it.
pub trait FileBrowser {
    fn files(&self) -> &[PathBuf];

    fn current_file(&self) -> Option<PathBuf>;

    /// Advance and return the new current file, wrapping at the end
    fn next_file(&mut self) -> Option<PathBuf>;

    /// Step back and return the new current file, wrapping at the start
    fn previous_file(&mut self) -> Option<PathBuf>;

    fn is_slow(&self, threshold: usize) -> bool {
        self.files().len() > threshold
    }
}

/// In-memory [`FileBrowser`] over a fixed file list
#[derive(Debug, Clone, Default)]
pub struct ListBrowser {
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ListBrowser {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files, cursor: 0 }
    }

    pub fn select(&mut self, path: &Path) -> bool {
        match self.files.iter().position(|f| f == path) {
            Some(index) => {
                self.cursor = index;
                true
            }
            None => false,
        }
    }
}

impl FileBrowser for ListBrowser {
    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn current_file(&self) -> Option<PathBuf> {
        self.files.get(self.cursor).cloned()
    }

    fn next_file(&mut self) -> Option<PathBuf> {
        if self.files.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.files.len();
        self.current_file()
    }

    fn previous_file(&mut self) -> Option<PathBuf> {
        if self.files.is_empty() {
            return None;
        }
        self.cursor = if self.cursor == 0 {
            self.files.len() - 1
        } else {
            self.cursor - 1
        };
        self.current_file()
    }
}
