pub mod combiner;
pub mod comparator;
pub mod host;
pub mod match_state;
pub mod orchestrator;
pub mod precomputed;
pub mod session;

#[cfg(test)]
mod test_support;

pub use combiner::{combine, combine_and, combine_or, combine_weighted, ModeResults};
pub use comparator::{Comparator, ComparatorFactory, CompareOutcome};
pub use host::{CompareHost, FileBrowser, ListBrowser, NullHost};
pub use match_state::{sorted_files, MatchState, RemovalOutcome};
pub use orchestrator::CompareOrchestrator;
pub use precomputed::PrecomputedComparator;
pub use session::ModeSession;
