pub mod http;
pub mod links;
pub mod local;

use std::time::Duration;

use serde::Deserialize;

use crate::error::FetchError;
pub use http::HttpSource;
pub use local::LocalSource;

/// Which suffix-matching files of a commit get fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkPolicy {
    /// Only the first matching file in document order.
    #[default]
    First,
    /// Every distinct matching file, in document order.
    All,
}

/// Raw text of one file at one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub path: String,
    pub text: String,
}

/// Anything that can hand back a commit's source files.
///
/// On success the result holds at least one document.
pub trait DocumentSource: Send + Sync {
    fn fetch(&self, project: &str, commit_id: &str) -> Result<Vec<FetchedDocument>, FetchError>;
}

impl<S: DocumentSource + ?Sized> DocumentSource for Box<S> {
    fn fetch(&self, project: &str, commit_id: &str) -> Result<Vec<FetchedDocument>, FetchError> {
        (**self).fetch(project, commit_id)
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// `https` unless pointed at a plain-HTTP mirror.
    pub scheme: String,
    pub host: String,
    pub raw_host: String,
    pub file_suffix: String,
    pub link_policy: LinkPolicy,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            scheme: "https".to_string(),
            host: "github.com".to_string(),
            raw_host: "raw.githubusercontent.com".to_string(),
            file_suffix: ".java".to_string(),
            link_policy: LinkPolicy::First,
            timeout: Duration::from_secs(30),
        }
    }
}
