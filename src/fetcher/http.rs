use anyhow::{Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use tracing::{debug, info};

use super::links;
use super::{DocumentSource, FetchOptions, FetchedDocument};
use crate::error::FetchError;

// One is picked per session; it only changes the request header.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Fetches commit pages and raw files from a GitHub-style host.
///
/// Requests are blocking and strictly sequential: the diff page first, then
/// each selected raw file.
pub struct HttpSource {
    client: Client,
    options: FetchOptions,
    user_agent: &'static str,
}

impl HttpSource {
    pub fn new(options: FetchOptions) -> Result<Self> {
        Self::with_builder(options, Client::builder())
    }

    fn with_builder(options: FetchOptions, builder: ClientBuilder) -> Result<Self> {
        let user_agent = pick_user_agent();
        let client = builder
            .user_agent(user_agent)
            .timeout(options.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        info!(
            host = %options.host,
            timeout_secs = options.timeout.as_secs(),
            "HTTP source ready"
        );
        Ok(HttpSource {
            client,
            options,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }

    /// Paths of the files the commit page links to, per the link policy.
    pub fn matching_paths(&self, project_path: &str, commit_id: &str) -> Result<Vec<String>, FetchError> {
        let url = links::diff_url(&self.options.scheme, &self.options.host, project_path, commit_id);
        let html = self.get_text(&url)?;
        let found = links::extract_links(&html);
        let paths = links::select_paths(&found, &self.options.file_suffix, self.options.link_policy);
        debug!(url = %url, anchors = found.len(), matched = paths.len(), "scanned commit page");
        if paths.is_empty() {
            return Err(FetchError::NoMatchingFile {
                location: url,
                suffix: self.options.file_suffix.clone(),
            });
        }
        Ok(paths)
    }

    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }
}

impl DocumentSource for HttpSource {
    fn fetch(&self, project: &str, commit_id: &str) -> Result<Vec<FetchedDocument>, FetchError> {
        let commit_id = commit_id.trim();
        if commit_id.is_empty() {
            return Err(FetchError::EmptyCommit(project.to_string()));
        }
        let project_path = links::project_path(project)?;

        let paths = self.matching_paths(&project_path, commit_id)?;
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let url = links::raw_url(
                &self.options.scheme,
                &self.options.raw_host,
                &project_path,
                commit_id,
                &path,
            );
            let text = self.get_text(&url)?;
            documents.push(FetchedDocument { path, text });
        }
        Ok(documents)
    }
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS[fastrand::usize(..USER_AGENTS.len())]
}

// ── Tests ──
