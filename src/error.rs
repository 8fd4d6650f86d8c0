use std::path::PathBuf;

use thiserror::Error;

/// Why a commit's source could not be retrieved.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid project identifier '{0}'")]
    InvalidProject(String),

    #[error("empty commit id for project '{0}'")]
    EmptyCommit(String),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no '{suffix}' file found at {location}")]
    NoMatchingFile { location: String, suffix: String },

    #[error("{0} does not exist")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why normalized source could not be turned into a tree.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to load Java grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("parser produced no tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
}

/// A per-row failure. The joiner drops the row and keeps going.
#[derive(Error, Debug)]
pub enum RowError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
}

impl RowError {
    pub fn kind(&self) -> SkipKind {
        match self {
            RowError::Fetch(_) => SkipKind::Fetch,
            RowError::Parse { .. } => SkipKind::Parse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipKind {
    Fetch,
    Parse,
}

impl SkipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipKind::Fetch => "fetch",
            SkipKind::Parse => "parse",
        }
    }
}
