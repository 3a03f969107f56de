//! Listing helpers for `_info` modules

use futures::stream::{BoxStream, TryStreamExt};
use serde_json::Value;

use crate::error::Result;
use crate::otc::http::ApiError;

/// Internal link metadata dropped from every emitted item
const LINK_KEYS: &[&str] = &["links", "link"];

/// Client-side equality filter on one top-level field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFilter {
    pub field: &'static str,
    pub value: String,
}

impl PostFilter {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub fn matches(&self, item: &Value) -> bool {
        match item.get(self.field) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

/// Remove link metadata from a resource representation
pub fn strip_links(mut item: Value) -> Value {
    if let Value::Object(map) = &mut item {
        for key in LINK_KEYS {
            map.remove(*key);
        }
    }
    item
}

/// Drain a lazy listing, keeping items that pass every filter
pub async fn collect(
    stream: BoxStream<'_, std::result::Result<Value, ApiError>>,
    filters: &[PostFilter],
) -> Result<Vec<Value>> {
    let items: Vec<Value> = stream
        .try_filter(|item| futures::future::ready(filters.iter().all(|f| f.matches(item))))
        .map_ok(strip_links)
        .try_collect()
        .await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};
    use serde_json::json;

    #[tokio::test]
    async fn test_collect_filters_and_strips() {
        let items = vec![
            Ok(json!({"id": "1", "name": "sg-a", "links": [{"rel": "self"}]})),
            Ok(json!({"id": "2", "name": "sg-b"})),
        ];
        let result = collect(stream::iter(items).boxed(), &[PostFilter::new("name", "sg-a")])
            .await
            .unwrap();
        assert_eq!(result, vec![json!({"id": "1", "name": "sg-a"})]);
    }

    #[tokio::test]
    async fn test_remote_error_is_connectivity() {
        let items = vec![Ok(json!({"id": "1"})), Err(ApiError::Transport("reset".to_string()))];
        let err = collect(stream::iter(items).boxed(), &[]).await.unwrap_err();
        assert_eq!(err.taxon(), "connectivity");
    }

    #[test]
    fn test_post_filter_numbers() {
        assert!(PostFilter::new("ttl", "300").matches(&json!({"ttl": 300})));
        assert!(!PostFilter::new("ttl", "300").matches(&json!({})));
    }
}
