use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::traits::CommentSource;
use crate::types::{Comment, CommentId};

/// Read-only in-memory snapshot of the comment corpus, indexed by id.
///
/// Loaded once at startup and shared across requests; insertion order is kept
/// so that downstream indexes are built deterministically.
#[derive(Debug, Default, Clone)]
pub struct CommentStore {
    by_id: HashMap<CommentId, usize>,
    comments: Vec<Comment>,
}

impl CommentStore {
    pub fn new() -> Self { Self::default() }

    /// Build from comments; a later duplicate id replaces the earlier record.
    pub fn from_comments(comments: impl IntoIterator<Item = Comment>) -> Self {
        let mut store = Self::default();
        for c in comments {
            store.insert(c);
        }
        store
    }

    fn insert(&mut self, comment: Comment) {
        match self.by_id.get(&comment.id) {
            Some(&pos) => self.comments[pos] = comment,
            None => {
                self.by_id.insert(comment.id.clone(), self.comments.len());
                self.comments.push(comment);
            }
        }
    }

    /// Load a JSON array of comments from disk.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading comment snapshot {}", path.display()))?;
        let comments: Vec<Comment> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing comment snapshot {}", path.display()))?;
        let store = Self::from_comments(comments);
        tracing::info!(path = %path.display(), comments = store.len(), "loaded comment snapshot");
        Ok(store)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(&self.comments)?)
            .with_context(|| format!("writing comment snapshot {}", path.display()))
    }

    /// Page through a remote source until a short page is returned.
    pub async fn load_paged(source: &dyn CommentSource, page_size: usize) -> Result<Self> {
        let page_size = page_size.max(1);
        let mut store = Self::default();
        let mut offset = 0;
        loop {
            let page = source.fetch_page(offset, page_size).await
                .with_context(|| format!("fetching comments at offset {}", offset))?;
            let fetched = page.len();
            for c in page {
                store.insert(c);
            }
            tracing::debug!(offset, fetched, "fetched comment page");
            if fetched < page_size {
                break;
            }
            offset += fetched;
        }
        tracing::info!(comments = store.len(), "loaded comments from remote store");
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Option<&Comment> {
        self.by_id.get(id).map(|&pos| &self.comments[pos])
    }

    pub fn contains(&self, id: &str) -> bool { self.by_id.contains_key(id) }

    pub fn len(&self) -> usize { self.comments.len() }

    pub fn is_empty(&self) -> bool { self.comments.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Comment> { self.comments.iter() }

    /// Comments carrying the given category tag, best quality first.
    pub fn by_category(&self, category: &str, limit: usize) -> Vec<&Comment> {
        let mut matched: Vec<&Comment> = self.comments.iter().filter(|c| c.has_category(category)).collect();
        matched.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score).then_with(|| a.id.cmp(&b.id)));
        matched.truncate(limit);
        matched
    }
}
