use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{DocumentSource, FetchedDocument, LinkPolicy};
use crate::error::FetchError;

/// Serves commits from a directory mirror laid out as
/// `<root>/<project>/<commit_id>/<path>`.
///
/// Files are taken in sorted path order so reruns are deterministic.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    file_suffix: String,
    link_policy: LinkPolicy,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, file_suffix: &str, link_policy: LinkPolicy) -> Self {
        LocalSource {
            root: root.into(),
            file_suffix: file_suffix.to_string(),
            link_policy,
        }
    }

    fn commit_dir(&self, project: &str, commit_id: &str) -> PathBuf {
        self.root.join(project.trim()).join(commit_id.trim())
    }

    fn matching_files(&self, dir: &Path) -> Result<Vec<PathBuf>, FetchError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| FetchError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().ends_with(&self.file_suffix)
            {
                files.push(entry.into_path());
            }
        }
        if self.link_policy == LinkPolicy::First {
            files.truncate(1);
        }
        Ok(files)
    }
}

impl DocumentSource for LocalSource {
    fn fetch(&self, project: &str, commit_id: &str) -> Result<Vec<FetchedDocument>, FetchError> {
        if commit_id.trim().is_empty() {
            return Err(FetchError::EmptyCommit(project.to_string()));
        }
        let dir = self.commit_dir(project, commit_id);
        if !dir.is_dir() {
            return Err(FetchError::Missing(dir));
        }

        let files = self.matching_files(&dir)?;
        if files.is_empty() {
            return Err(FetchError::NoMatchingFile {
                location: dir.display().to_string(),
                suffix: self.file_suffix.clone(),
            });
        }

        files
            .into_iter()
            .map(|file| {
                // Decoded lossily, like HTTP response bodies.
                let bytes = fs::read(&file).map_err(|source| FetchError::Io {
                    path: file.clone(),
                    source,
                })?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let path = file
                    .strip_prefix(&dir)
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .replace('\\', "/");
                Ok(FetchedDocument { path, text })
            })
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let commit = dir.path().join("org-repo").join("abc123");
        fs::create_dir_all(commit.join("src/b")).unwrap();
        fs::create_dir_all(commit.join("src/a")).unwrap();
        fs::write(commit.join("src/b/B.java"), "class B {}").unwrap();
        fs::write(commit.join("src/a/A.java"), "class A {}").unwrap();
        fs::write(commit.join("README.md"), "# readme").unwrap();
        dir
    }

    #[test]
    fn first_policy_returns_first_sorted_file() {
        let dir = mirror();
        let source = LocalSource::new(dir.path(), ".java", LinkPolicy::First);
        let docs = source.fetch("org-repo", "abc123").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "src/a/A.java");
        assert_eq!(docs[0].text, "class A {}");
    }

    #[test]
    fn all_policy_returns_every_match() {
        let dir = mirror();
        let source = LocalSource::new(dir.path(), ".java", LinkPolicy::All);
        let paths: Vec<String> = source
            .fetch("org-repo", "abc123")
            .unwrap()
            .into_iter()
            .map(|d| d.path)
            .collect();
        assert_eq!(paths, vec!["src/a/A.java", "src/b/B.java"]);
    }

    #[test]
    fn missing_commit_is_an_error() {
        let dir = mirror();
        let source = LocalSource::new(dir.path(), ".java", LinkPolicy::First);
        assert!(matches!(
            source.fetch("org-repo", "ffff"),
            Err(FetchError::Missing(_))
        ));
    }

    #[test]
    fn no_matching_suffix() {
        let dir = mirror();
        let source = LocalSource::new(dir.path(), ".kt", LinkPolicy::First);
        assert!(matches!(
            source.fetch("org-repo", "abc123"),
            Err(FetchError::NoMatchingFile { .. })
        ));
    }

    #[test]
    fn non_utf8_file_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let commit = dir.path().join("org-repo").join("latin1");
        fs::create_dir_all(&commit).unwrap();
        fs::write(commit.join("A.java"), b"class Caf\xE9 {}").unwrap();

        let source = LocalSource::new(dir.path(), ".java", LinkPolicy::First);
        let docs = source.fetch("org-repo", "latin1").unwrap();
        assert_eq!(docs[0].text, "class Caf\u{FFFD} {}");
    }
}
