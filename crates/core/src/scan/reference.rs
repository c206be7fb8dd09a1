//! Pull request references in free text.
//!
//! Three literal styles are recognised for a target `org/repo`:
//! `org/repo#N`, `github.com/org/repo/pull/N` and `[org#N]`.

use regex_lite::Regex;

use crate::errors::ScanError;
use crate::models::RepoName;

/// One reference found in a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub number: u64,
    /// Byte offset of the number in the searched text.
    pub offset: usize,
}

/// Compiled matchers for references to one repository.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    styles: Vec<Regex>,
}

impl ReferenceExtractor {
    pub fn new(target: &RepoName) -> Result<Self, ScanError> {
        let org = regex_lite::escape(&target.owner);
        let repo = regex_lite::escape(&target.repo);
        let patterns = [
            format!(r"{}/{}#(\d+)", org, repo),
            format!(r"github\.com/{}/{}/pull/(\d+)", org, repo),
            format!(r"\[{}#(\d+)\]", org),
        ];
        let styles = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ScanError::InvalidRequest(format!("bad reference pattern: {}", e)))?;
        Ok(Self { styles })
    }

    /// All references in `text`, in order of appearance.
    pub fn extract(&self, text: &str) -> Result<Vec<Reference>, ScanError> {
        let mut refs = Vec::new();
        for style in &self.styles {
            for caps in style.captures_iter(text) {
                let Some(m) = caps.get(1) else { continue };
                let number = m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| ScanError::MalformedReference(m.as_str().to_string()))?;
                refs.push(Reference {
                    number,
                    offset: m.start(),
                });
            }
        }
        refs.sort_by_key(|r| r.offset);
        Ok(refs)
    }
}

/// Whether the references point at more than one distinct pull request.
/// Repeating the same number is not ambiguous.
pub fn is_ambiguous(refs: &[Reference]) -> bool {
    match refs.split_first() {
        Some((first, rest)) => rest.iter().any(|r| r.number != first.number),
        None => false,
    }
}
