//! Labeled commits in, labeled Java declarations out.
//!
//! An inventory row names a commit and carries its labels. The joiner fetches
//! the commit's source, strips comments, parses it, and emits one record per
//! top-level declaration, each carrying the row's labels.

pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod inventory;
pub mod joiner;
pub mod metrics;
pub mod normalize;
pub mod output;
pub mod parser;

pub use error::{FetchError, ParseError, RowError};
pub use fetcher::{DocumentSource, FetchedDocument, LinkPolicy};
pub use inventory::{CommitRecord, Inventory};
pub use joiner::{join, process_row, JoinOptions, JoinedRecord};
pub use metrics::JoinStats;
pub use normalize::normalize;
pub use parser::{parse, Representation, SourceTree, StructuralUnit};
