//! Display name to namespace id mapping for REST registries.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

/// Namespace every Nacos server has; never translated.
pub const PUBLIC_NAMESPACE: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub display_name: String,
    pub id: String,
}

/// Cached snapshot of the server's namespaces. Reads share the lock; a
/// refresh replaces the whole snapshot.
#[derive(Debug, Default)]
pub struct NamespaceIndex {
    by_display_name: RwLock<HashMap<String, String>>,
}

impl NamespaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, display_name: &str) -> Option<String> {
        self.by_display_name.read().await.get(display_name).cloned()
    }

    pub async fn replace(&self, entries: Vec<NamespaceEntry>) {
        let snapshot = entries.into_iter().map(|entry| (entry.display_name, entry.id)).collect();
        *self.by_display_name.write().await = snapshot;
    }

    pub async fn entry_count(&self) -> usize {
        self.by_display_name.read().await.len()
    }
}

/// `true` when `namespace` needs no translation: empty, `public`, or already
/// shaped like a generated id (long and hyphenated).
pub fn is_literal_namespace(namespace: &str) -> bool {
    namespace.is_empty() || namespace == PUBLIC_NAMESPACE || (namespace.len() > 30 && namespace.contains('-'))
}

/// Reads a namespace listing in either the `{code, data: [...]}` envelope or
/// as a bare array. `None` when the body matches neither.
pub fn parse_namespace_list(body: &Value) -> Option<Vec<NamespaceEntry>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.get("data")?.as_array()?,
        _ => return None,
    };
    Some(
        items
            .iter()
            .filter_map(|item| {
                let id = item.get("namespace")?.as_str()?;
                let display_name = item.get("namespaceShowName").and_then(Value::as_str).unwrap_or(id);
                let id = if id.is_empty() { PUBLIC_NAMESPACE } else { id };
                Some(NamespaceEntry {
                    display_name: display_name.to_string(),
                    id: id.to_string(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_namespaces() {
        assert!(is_literal_namespace(""));
        assert!(is_literal_namespace("public"));
        assert!(is_literal_namespace("4f1c2a8e-9b7d-4c3e-a1f0-123456789abc"));
        assert!(!is_literal_namespace("dev"));
        assert!(!is_literal_namespace("a-short-name"));
    }

    #[test]
    fn parses_both_envelopes() {
        let wrapped = json!({"code": 200, "data": [
            {"namespace": "", "namespaceShowName": "public"},
            {"namespace": "ns-dev-id", "namespaceShowName": "dev"}
        ]});
        let entries = parse_namespace_list(&wrapped).expect("wrapped envelope");
        assert_eq!(entries[0].id, "public");
        assert_eq!(entries[1], NamespaceEntry { display_name: "dev".into(), id: "ns-dev-id".into() });

        let bare = json!([{"namespace": "ns-prod-id", "namespaceShowName": "prod"}]);
        assert_eq!(parse_namespace_list(&bare).expect("bare array").len(), 1);

        assert!(parse_namespace_list(&json!({"message": "nope"})).is_none());
        assert!(parse_namespace_list(&json!("text")).is_none());
    }

    #[tokio::test]
    async fn index_replaces_snapshot() {
        let index = NamespaceIndex::new();
        assert_eq!(index.lookup("dev").await, None);
        index
            .replace(vec![NamespaceEntry { display_name: "dev".into(), id: "ns-dev-id".into() }])
            .await;
        assert_eq!(index.lookup("dev").await.as_deref(), Some("ns-dev-id"));
        index.replace(Vec::new()).await;
        assert_eq!(index.entry_count().await, 0);
    }
}
