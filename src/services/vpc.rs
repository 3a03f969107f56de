//! VPC namespace: routers (VPC v1) and peerings (served under Neutron)

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::otc::client::{Collection, OtcClient, Paging};
use crate::otc::http::ApiError;

pub const ROUTERS: Collection = Collection {
    service: "vpc",
    path: "/vpcs",
    items_key: "vpcs",
    item_key: Some("vpc"),
    paging: Paging::Marker,
    name_query: None,
    kind: "router",
};

pub const PEERINGS: Collection = Collection {
    service: "network",
    path: "/vpc/peerings",
    items_key: "peerings",
    item_key: Some("peering"),
    paging: Paging::Marker,
    name_query: Some("name"),
    kind: "vpc peering",
};

/// Peering waiting for the peer project to accept
pub const PEERING_PENDING: &str = "PENDING_ACCEPTANCE";
pub const PEERING_ACTIVE: &str = "ACTIVE";
pub const PEERING_REJECTED: &str = "REJECTED";

#[async_trait]
pub trait VpcApi: Send + Sync {
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;

    fn peerings(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>>;

    async fn find_peering(&self, name_or_id: &str) -> Result<Option<Value>, ApiError>;

    async fn accept_peering(&self, id: &str) -> Result<Value, ApiError>;

    async fn reject_peering(&self, id: &str) -> Result<Value, ApiError>;
}

impl OtcClient {
    async fn peering_action(&self, id: &str, action: &str) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.item_url(&PEERINGS, id)?, action);
        let response = self.put(&url, None).await?;
        Ok(PEERINGS.unwrap_item(response))
    }
}

#[async_trait]
impl VpcApi for OtcClient {
    async fn find_router(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&ROUTERS, name_or_id, Vec::new()).await
    }

    fn peerings(&self, query: Vec<(String, String)>) -> BoxStream<'_, Result<Value, ApiError>> {
        self.list(&PEERINGS, query)
    }

    async fn find_peering(&self, name_or_id: &str) -> Result<Option<Value>, ApiError> {
        self.find(&PEERINGS, name_or_id, Vec::new()).await
    }

    async fn accept_peering(&self, id: &str) -> Result<Value, ApiError> {
        self.peering_action(id, "accept").await
    }

    async fn reject_peering(&self, id: &str) -> Result<Value, ApiError> {
        self.peering_action(id, "reject").await
    }
}
