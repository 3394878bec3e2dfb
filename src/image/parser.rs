//! Mirror list parsing
//!
//! One entry per line in the form `[namespace/]image[:tag1,tag2,...]`. Blank lines and
//! `#` comments are ignored, trailing comments are stripped. A missing namespace means the
//! default namespace, a missing tag list means "discover every tag".

use crate::error::{MirrorError, Result};
use crate::image::reference::RepositoryRef;
use std::path::Path;

pub const DEFAULT_NAMESPACE: &str = "library";

const MAX_TAG_LEN: usize = 128;

/// One parsed line of the mirror list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub repository: RepositoryRef,
    /// Explicitly pinned tags; `None` means list the source repository
    pub tags: Option<Vec<String>>,
    pub line: usize,
}

impl MirrorEntry {
    pub fn is_pinned(&self) -> bool {
        self.tags.is_some()
    }
}

/// A line that could not be parsed
#[derive(Debug, Clone)]
pub struct RejectedLine {
    pub line: usize,
    pub content: String,
    pub error: MirrorError,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorList {
    pub entries: Vec<MirrorEntry>,
    pub rejected: Vec<RejectedLine>,
}

pub struct MirrorListParser {
    default_namespace: String,
}

impl MirrorListParser {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<MirrorList> {
        if !path.is_file() {
            return Err(MirrorError::Config(format!(
                "Mirror list not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(self.parse_str(&contents))
    }

    pub fn parse_str(&self, contents: &str) -> MirrorList {
        let mut list = MirrorList::default();

        for (index, raw) in contents.lines().enumerate() {
            let line = index + 1;
            match self.parse_line(raw, line) {
                Ok(Some(entry)) => list.entries.push(entry),
                Ok(None) => {}
                Err(error) => list.rejected.push(RejectedLine {
                    line,
                    content: raw.trim().to_string(),
                    error,
                }),
            }
        }

        list
    }

    /// Parse a single line; `Ok(None)` for blanks and comments
    pub fn parse_line(&self, raw: &str, line: usize) -> Result<Option<MirrorEntry>> {
        let content = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();

        if content.is_empty() {
            return Ok(None);
        }

        let (repo_part, tag_part) = match content.split_once(':') {
            Some((repo, tags)) => (repo.trim(), Some(tags)),
            None => (content, None),
        };

        let (namespace, image) = match repo_part.split_once('/') {
            Some((ns, img)) => (ns.trim(), img.trim()),
            None => (self.default_namespace.as_str(), repo_part),
        };

        validate_component("namespace", namespace, line)?;
        validate_component("image", image, line)?;

        let tags = match tag_part {
            Some(list) => {
                let mut tags: Vec<String> = Vec::new();
                for tag in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    validate_tag(tag, line)?;
                    if !tags.iter().any(|t| t == tag) {
                        tags.push(tag.to_string());
                    }
                }
                if tags.is_empty() {
                    return Err(MirrorError::Parse(format!(
                        "line {}: tag list after ':' is empty",
                        line
                    )));
                }
                Some(tags)
            }
            None => None,
        };

        Ok(Some(MirrorEntry {
            repository: RepositoryRef::new(namespace, image),
            tags,
            line,
        }))
    }
}

impl Default for MirrorListParser {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

fn validate_component(kind: &str, value: &str, line: usize) -> Result<()> {
    if value.is_empty() {
        return Err(MirrorError::Parse(format!("line {}: {} is empty", line, kind)));
    }

    let valid = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    let edges_ok = value
        .chars()
        .next()
        .zip(value.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if !valid || !edges_ok {
        return Err(MirrorError::Parse(format!(
            "line {}: invalid {} '{}'",
            line, kind, value
        )));
    }
    Ok(())
}

fn validate_tag(tag: &str, line: usize) -> Result<()> {
    let valid = tag.len() <= MAX_TAG_LEN
        && tag
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if !valid {
        return Err(MirrorError::Parse(format!("line {}: invalid tag '{}'", line, tag)));
    }
    Ok(())
}
