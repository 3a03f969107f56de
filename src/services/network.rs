//! Network (Neutron v2.0) namespace

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};

use crate::otc::client::{Collection, OtcClient, Paging};
use crate::otc::http::ApiError;

pub const SECURITY_GROUPS: Collection = Collection {
    service: "network",
    path: "/security-groups",
    items_key: "security_groups",
    item_key: Some("security_group"),
    paging: Paging::Marker,
    name_query: Some("name"),
    kind: "security group",
};

pub const NETWORKS: Collection = Collection {
    service: "network",
    path: "/networks",
    items_key: "networks",
    item_key: Some("network"),
    paging: Paging::Marker,
    name_query: Some("name"),
    kind: "network",
};

#[async_trait]
pub trait NetworkApi: Send + Sync {
    fn security_groups(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>>;

    async fn find_security_group(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;

    async fn create_security_group(&self, attrs: Value) -> Result<Value, ApiError>;

    async fn update_security_group(&self, id: &str, attrs: Value) -> Result<Value, ApiError>;

    async fn delete_security_group(&self, id: &str) -> Result<(), ApiError>;

    async fn find_network(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;
}

#[async_trait]
impl NetworkApi for OtcClient {
    fn security_groups(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(&SECURITY_GROUPS, query)
    }

    async fn find_security_group(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&SECURITY_GROUPS, name_or_id, Vec::new()).await
    }

    async fn create_security_group(&self, attrs: Value) -> Result<Value, ApiError> {
        self.create(&SECURITY_GROUPS, attrs).await
    }

    async fn update_security_group(&self, id: &str, attrs: Value) -> Result<Value, ApiError> {
        let url = self.item_url(&SECURITY_GROUPS, id)?;
        let body = json!({ "security_group": attrs });
        let response = self.put(&url, Some(&body)).await?;
        Ok(SECURITY_GROUPS.unwrap_item(response))
    }

    async fn delete_security_group(&self, id: &str) -> Result<(), ApiError> {
        self.remove(&SECURITY_GROUPS, id).await
    }

    async fn find_network(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&NETWORKS, name_or_id, Vec::new()).await
    }
}
