//! RDS v3 namespace

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};

use crate::otc::client::{Collection, OtcClient, Paging};
use crate::otc::http::ApiError;

pub const INSTANCES: Collection = Collection {
    service: "rds",
    path: "/instances",
    items_key: "instances",
    item_key: Some("instance"),
    paging: Paging::Offset,
    name_query: Some("name"),
    kind: "rds instance",
};

#[async_trait]
pub trait RdsApi: Send + Sync {
    fn instances(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>>;

    async fn find_instance(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;

    async fn get_instance(&self, id: &str) -> Result<Option<Value>, ApiError>;

    async fn create_instance(&self, attrs: Value) -> Result<Value, ApiError>;

    async fn resize_flavor(&self, id: &str, flavor: &str) -> Result<(), ApiError>;

    async fn enlarge_volume(&self, id: &str, size: i64) -> Result<(), ApiError>;

    async fn delete_instance(&self, id: &str) -> Result<(), ApiError>;
}

impl OtcClient {
    async fn instance_action(&self, id: &str, body: Value) -> Result<(), ApiError> {
        let url = format!("{}/action", self.item_url(&INSTANCES, id)?);
        self.post(&url, Some(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl RdsApi for OtcClient {
    fn instances(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(&INSTANCES, query)
    }

    async fn find_instance(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&INSTANCES, name_or_id, Vec::new()).await
    }

    /// RDS has no show call; instances are listed with an `id` filter
    async fn get_instance(&self, id: &str) -> Result<Option<Value>, ApiError> {
        use futures::TryStreamExt;

        let matches: Vec<Value> = self
            .list(&INSTANCES, vec![("id".to_string(), id.to_string())])
            .try_collect()
            .await?;
        Ok(matches
            .into_iter()
            .find(|item| item.get("id").and_then(Value::as_str) == Some(id)))
    }

    /// Create responses carry the instance next to a `job_id`
    async fn create_instance(&self, attrs: Value) -> Result<Value, ApiError> {
        let url = self.url(INSTANCES.service, INSTANCES.path)?;
        let response = self.post(&url, Some(&attrs)).await?;
        Ok(INSTANCES.unwrap_item(response))
    }

    async fn resize_flavor(&self, id: &str, flavor: &str) -> Result<(), ApiError> {
        self.instance_action(id, json!({ "resize_flavor": { "spec_code": flavor } }))
            .await
    }

    async fn enlarge_volume(&self, id: &str, size: i64) -> Result<(), ApiError> {
        self.instance_action(id, json!({ "enlarge_volume": { "size": size } }))
            .await
    }

    async fn delete_instance(&self, id: &str) -> Result<(), ApiError> {
        self.remove(&INSTANCES, id).await
    }
}
