//! Read-only view of a hierarchical coordination store.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connect to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("reading {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: zookeeper_client::Error,
    },
}

impl StoreError {
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// The two queries resolution needs from a tree-shaped store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Child names of `path`, or `None` when the node does not exist.
    async fn children(&self, path: &str) -> Result<Option<Vec<String>>, StoreError>;
}

/// In-process store holding a fixed tree. Paths listed with
/// [`MemoryStore::fail_on`] return an I/O error when read.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    nodes: BTreeMap<String, Vec<String>>,
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` with the given children, creating every ancestor.
    pub fn with_node(mut self, path: &str, children: &[&str]) -> Self {
        self.ensure_path(path);
        for child in children {
            let child_path = join_path(path, child);
            self.ensure_path(&child_path);
        }
        self
    }

    pub fn fail_on(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    fn ensure_path(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let parent = if current.is_empty() { "/".to_string() } else { current.clone() };
            current = join_path(&parent, segment);
            let siblings = self.nodes.entry(parent).or_default();
            if !siblings.iter().any(|existing| existing == segment) {
                siblings.push(segment.to_string());
            }
            self.nodes.entry(current.clone()).or_default();
        }
    }

    fn check(&self, path: &str) -> Result<(), StoreError> {
        if self.failing.contains(path) {
            return Err(StoreError::Io(std::io::Error::other(format!("injected read failure at {path}"))));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.check(path)?;
        Ok(self.nodes.contains_key(path))
    }

    async fn children(&self, path: &str) -> Result<Option<Vec<String>>, StoreError> {
        self.check(path)?;
        Ok(self.nodes.get(path).cloned())
    }
}

pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_creates_ancestors() {
        let store = MemoryStore::new().with_node("/dubbo/com.acme.A/providers", &["p1"]);
        assert!(store.exists("/dubbo").await.expect("exists"));
        assert_eq!(store.children("/dubbo").await.expect("children"), Some(vec!["com.acme.A".to_string()]));
        assert_eq!(
            store.children("/dubbo/com.acme.A/providers").await.expect("children"),
            Some(vec!["p1".to_string()])
        );
        assert_eq!(store.children("/missing").await.expect("children"), None);
    }

    #[tokio::test]
    async fn failing_paths_return_errors() {
        let store = MemoryStore::new().with_node("/dubbo/x", &[]).fail_on("/dubbo/x");
        assert!(store.children("/dubbo/x").await.is_err());
    }
}
