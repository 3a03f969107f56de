//! WAF namespace

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::otc::client::{Collection, OtcClient, Paging};
use crate::otc::http::ApiError;

pub const CERTIFICATES: Collection = Collection {
    service: "waf",
    path: "/certificate",
    items_key: "items",
    item_key: None,
    paging: Paging::Page,
    name_query: Some("name"),
    kind: "waf certificate",
};

#[async_trait]
pub trait WafApi: Send + Sync {
    fn certificates(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>>;

    async fn find_certificate(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;

    async fn create_certificate(&self, attrs: Value) -> Result<Value, ApiError>;

    async fn delete_certificate(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl WafApi for OtcClient {
    fn certificates(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(&CERTIFICATES, query)
    }

    async fn find_certificate(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&CERTIFICATES, name_or_id, Vec::new()).await
    }

    async fn create_certificate(&self, attrs: Value) -> Result<Value, ApiError> {
        self.create(&CERTIFICATES, attrs).await
    }

    async fn delete_certificate(&self, id: &str) -> Result<(), ApiError> {
        self.remove(&CERTIFICATES, id).await
    }
}
