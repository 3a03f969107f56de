//! DNS (Designate v2) namespace

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::Value;

use crate::otc::client::{single, Collection, OtcClient, Paging};
use crate::otc::http::ApiError;

pub const ZONES: Collection = Collection {
    service: "dns",
    path: "/zones",
    items_key: "zones",
    item_key: None,
    paging: Paging::Marker,
    name_query: Some("name"),
    kind: "dns zone",
};

/// Zone names are fully qualified: `example.com.`
pub fn normalize_zone_name(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    fn zones(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>>;

    /// Zone by name (trailing dot optional) or id, within `zone_type`
    async fn find_zone(&self, name_or_id: &str, zone_type: &str) -> Result<Option<Value>, ApiError>;

    async fn get_zone(&self, id: &str) -> Result<Option<Value>, ApiError>;

    async fn create_zone(&self, attrs: Value) -> Result<Value, ApiError>;

    async fn update_zone(&self, id: &str, attrs: Value) -> Result<Value, ApiError>;

    async fn delete_zone(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl DnsApi for OtcClient {
    fn zones(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(&ZONES, query)
    }

    async fn find_zone(&self, name_or_id: &str, zone_type: &str) -> Result<Option<Value>, ApiError> {
        let type_filter = vec![("type".to_string(), zone_type.to_string())];
        if !name_or_id.contains('.') {
            if let Some(zone) = self.find(&ZONES, name_or_id, type_filter.clone()).await? {
                return Ok(Some(zone));
            }
        }

        let name = normalize_zone_name(name_or_id);
        let mut query = type_filter;
        query.push(("name".to_string(), name.clone()));
        let matches: Vec<Value> = self
            .list(&ZONES, query)
            .try_filter(|zone| futures::future::ready(zone.get("name").and_then(Value::as_str) == Some(name.as_str())))
            .try_collect()
            .await?;

        single(ZONES.kind, &name, matches)
    }

    async fn get_zone(&self, id: &str) -> Result<Option<Value>, ApiError> {
        self.show(&ZONES, id).await
    }

    async fn create_zone(&self, attrs: Value) -> Result<Value, ApiError> {
        self.create(&ZONES, attrs).await
    }

    async fn update_zone(&self, id: &str, attrs: Value) -> Result<Value, ApiError> {
        let url = self.item_url(&ZONES, id)?;
        self.patch(&url, Some(&attrs)).await
    }

    async fn delete_zone(&self, id: &str) -> Result<(), ApiError> {
        self.remove(&ZONES, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zone_name() {
        assert_eq!(normalize_zone_name("example.com"), "example.com.");
        assert_eq!(normalize_zone_name("example.com."), "example.com.");
    }
}
