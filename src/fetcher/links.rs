use std::sync::LazyLock;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::Regex;

use super::LinkPolicy;
use crate::error::FetchError;

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\btitle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:blob|raw)/[^/]+/([^?#]+)").unwrap());

/// One `<a>` element from a commit page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub title: Option<String>,
    /// Visible text with nested markup removed.
    pub text: String,
}

impl Link {
    fn mentions(&self, suffix: &str) -> bool {
        self.text.contains(suffix)
            || self.href.contains(suffix)
            || self.title.as_deref().is_some_and(|t| t.contains(suffix))
    }

    /// Repository path of the file this link points at.
    ///
    /// The visible label wins, then the `title`, then a `/blob/<sha>/<path>` href.
    pub fn file_path(&self, suffix: &str) -> Option<String> {
        label_path(&self.text, suffix)
            .or_else(|| self.title.as_deref().and_then(|t| label_path(t, suffix)))
            .or_else(|| href_path(&self.href, suffix))
    }
}

/// All anchors in document order.
pub fn extract_links(html: &str) -> Vec<Link> {
    ANCHOR_RE
        .captures_iter(html)
        .map(|caps| {
            let attrs = &caps[1];
            let href = attribute(&HREF_RE, attrs).unwrap_or_default();
            let title = attribute(&TITLE_RE, attrs);
            let text = decode_entities(TAG_RE.replace_all(&caps[2], "").trim());
            Link { href, title, text }
        })
        .collect()
}

/// Paths of the files to fetch, in document order, per `policy`.
pub fn select_paths(links: &[Link], suffix: &str, policy: LinkPolicy) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for link in links.iter().filter(|l| l.mentions(suffix)) {
        let Some(path) = link.file_path(suffix) else {
            continue;
        };
        if paths.contains(&path) {
            continue;
        }
        paths.push(path);
        if policy == LinkPolicy::First {
            break;
        }
    }
    paths
}

/// `owner-repo` → `owner/repo` (first hyphen only); `owner/repo` passes through.
pub fn project_path(project: &str) -> Result<String, FetchError> {
    let project = project.trim();
    let invalid = || FetchError::InvalidProject(project.to_string());

    let (owner, repo) = if project.contains('/') {
        project.split_once('/').ok_or_else(invalid)?
    } else {
        project.split_once('-').ok_or_else(invalid)?
    };
    if owner.is_empty() || repo.is_empty() || repo.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(format!("{}/{}", owner, repo))
}

pub fn diff_url(scheme: &str, host: &str, project_path: &str, commit_id: &str) -> String {
    format!(
        "{}://{}/{}/commit/{}?diff=unified",
        scheme, host, project_path, commit_id
    )
}

pub fn raw_url(
    scheme: &str,
    raw_host: &str,
    project_path: &str,
    commit_id: &str,
    file_path: &str,
) -> String {
    format!(
        "{}://{}/{}/{}/{}",
        scheme,
        raw_host,
        project_path,
        commit_id,
        file_path.trim_start_matches('/')
    )
}

fn attribute(re: &Regex, attrs: &str) -> Option<String> {
    let caps = re.captures(attrs)?;
    let value = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(decode_entities(value))
}

fn label_path(label: &str, suffix: &str) -> Option<String> {
    // Renames render as "old/Path.java → new/Path.java"; the new side is what exists at the commit.
    let candidate = label.rsplit('→').next().unwrap_or(label).trim();
    let candidate = candidate.trim_start_matches("./");
    if candidate.is_empty()
        || !candidate.ends_with(suffix)
        || candidate.contains(char::is_whitespace)
        || candidate.contains("://")
    {
        return None;
    }
    Some(candidate.to_string())
}

fn href_path(href: &str, suffix: &str) -> Option<String> {
    let path = BLOB_RE.captures(href)?.get(1)?.as_str();
    path.ends_with(suffix).then(|| path.to_string())
}

/// Resolve named (HTML5) and numeric character references.
///
/// Text with a malformed reference, such as a bare `&`, is kept as written.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    match unescape_with(s, resolve_html5_entity) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

// ── Tests ──
