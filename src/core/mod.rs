pub mod comparator;
pub mod engine;
pub mod entity;
pub mod filter;
pub mod progress;
pub mod report;

pub use comparator::{compare_trees, DifferenceKind, DifferenceSummary, TreeDifference};
pub use engine::{synchronize, synchronize_paths, MirrorEngine, SyncConfig};
pub use entity::{normalize_path, Directory, FileEntry};
pub use filter::{IgnoreRules, DEFAULT_IGNORED_NAMES};
pub use progress::{ProgressEvent, ProgressSink, TracingProgress};
pub use report::{ItemAction, ItemOutcome, ItemReport, SyncReport, SyncStatus};
