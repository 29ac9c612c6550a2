//! Workspace knowledge retrieval used by `/search`, `/open` and `/status`.
//!
//! The gateway only formats results; indexing and storage live behind
//! [`Retriever`].

use async_trait::async_trait;
use relay_core::Timestamp;
use thiserror::Error;

/// Retrieval failures the gateway turns into fixed replies. `Backend` is
/// propagated as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid document target: {0}")]
    InvalidTarget(String),

    #[error("retrieval failed: {0}")]
    Backend(String),
}

/// One ranked search match.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    /// Workspace-relative path; may be empty when only `doc_id` is known.
    pub path: String,
    pub doc_id: String,
    /// Relevance in `0.0..=1.0`.
    pub score: f64,
    pub snippet: String,
}

impl SearchHit {
    /// Path when present, else the document id.
    pub fn location(&self) -> &str {
        let path = self.path.trim();
        if path.is_empty() {
            self.doc_id.trim()
        } else {
            path
        }
    }

    /// Whole-percent score, `None` when it rounds down to zero.
    pub fn percent(&self) -> Option<u32> {
        let percent = (self.score * 100.0) as i64;
        (percent > 0).then(|| percent.min(100) as u32)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedDocument {
    pub path: String,
    pub content: String,
    /// Content was cut to a safe output size.
    pub truncated: bool,
}

/// Index state of one workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexStatus {
    pub workspace_id: String,
    pub workspace_exists: bool,
    pub indexed: bool,
    pub pending_reindex: bool,
    pub index_exists: bool,
    pub last_indexed_at: Option<Timestamp>,
    /// Free-form backend summary.
    pub summary: String,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        workspace_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RetrievalError>;

    /// Open a markdown document by relative `.md` path or `#docid`.
    async fn open(&self, workspace_id: &str, target: &str) -> Result<OpenedDocument, RetrievalError>;

    async fn status(&self, workspace_id: &str) -> Result<IndexStatus, RetrievalError>;
}
