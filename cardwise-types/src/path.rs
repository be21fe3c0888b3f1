//! Document paths.
//!
//! A path alternates collection names and document identifiers:
//! `users.<uid>.cards.<docId>`. Even-indexed segments name collections,
//! odd-indexed segments name documents, so a path with an odd number of
//! segments addresses a collection and an even number addresses a document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing a [`DocPath`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path {0:?} contains an empty segment")]
    EmptySegment(String),

    #[error("path {0:?} does not address a document")]
    NotADocument(String),

    #[error("path {0:?} does not address a collection")]
    NotACollection(String),
}

/// A parsed collection/document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// Parses a dot-delimited path. `/` is accepted as an alternative separator.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim_matches(|c| c == '.' || c == '/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = trimmed
            .split(['.', '/'])
            .map(str::to_string)
            .collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Builds a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if segments.iter().any(|s| s.is_empty() || s.contains(['.', '/'])) {
            return Err(PathError::EmptySegment(segments.join(".")));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; a parsed path has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path ends in a document identifier.
    pub fn is_document(&self) -> bool {
        self.segments.len() % 2 == 0
    }

    /// True when the path ends in a collection name.
    pub fn is_collection(&self) -> bool {
        !self.is_document()
    }

    /// The final segment (document id or collection name).
    pub fn last(&self) -> &str {
        // Non-empty by construction.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The path without its final segment, or `None` for a single segment.
    pub fn parent(&self) -> Option<DocPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Appends a segment.
    pub fn child(&self, segment: &str) -> Result<DocPath, PathError> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    /// The collection that holds this path: itself for a collection path,
    /// its parent for a document path.
    pub fn collection(&self) -> DocPath {
        if self.is_collection() {
            self.clone()
        } else {
            // A document path has at least two segments.
            self.parent().unwrap_or_else(|| self.clone())
        }
    }

    /// Splits a document path into its collection and document id.
    pub fn split_document(&self) -> Result<(DocPath, &str), PathError> {
        if !self.is_document() {
            return Err(PathError::NotADocument(self.to_string()));
        }
        Ok((self.collection(), self.last()))
    }

    /// Requires the path to name a collection.
    pub fn expect_collection(&self) -> Result<&DocPath, PathError> {
        if self.is_collection() {
            Ok(self)
        } else {
            Err(PathError::NotACollection(self.to_string()))
        }
    }

    /// Slash-delimited form, used by REST adapters.
    pub fn to_slash_string(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for DocPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}
