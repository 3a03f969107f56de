//! OTC Client
//!
//! Authenticated, region-bound client combining Keystone credentials,
//! endpoint resolution and the HTTP wrapper. Collections are described
//! declaratively by [`Collection`]; listing is exposed as a lazy stream that
//! fetches pages on demand.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;

use super::auth::{AuthType, OtcCredentials};
use super::catalog::EndpointResolver;
use super::http::{add_query_params, ApiError, HttpOptions, OtcHttpClient};
use super::profile::CloudConfig;

/// Items requested per page
pub const PAGE_SIZE: usize = 100;

/// How a collection paginates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Everything in one response
    None,
    /// `limit` plus `marker=<id of last item>`
    Marker,
    /// `limit` plus `offset=<items seen>`
    Offset,
    /// `pagesize` plus 1-based `page`
    Page,
}

/// A REST collection on one service namespace
#[derive(Debug, Clone, Copy)]
pub struct Collection {
    pub service: &'static str,
    /// Path relative to the service endpoint, starting with `/`
    pub path: &'static str,
    /// Key of the item array in list responses
    pub items_key: &'static str,
    /// Key wrapping a single item in show/create responses, if any
    pub item_key: Option<&'static str>,
    pub paging: Paging,
    /// Query parameter that filters by name server-side, if supported
    pub name_query: Option<&'static str>,
    /// Human name for messages
    pub kind: &'static str,
}

impl Collection {
    /// Unwrap `{"<item_key>": {...}}` responses
    pub fn unwrap_item(&self, body: Value) -> Value {
        match self.item_key {
            Some(key) => match body {
                Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
                other => other,
            },
            None => body,
        }
    }
}

#[derive(Debug, Clone)]
enum Cursor {
    Start,
    Marker(String),
    Offset(usize),
    Page(usize),
}

/// Main OTC client
#[derive(Clone)]
pub struct OtcClient {
    credentials: OtcCredentials,
    http: OtcHttpClient,
    endpoints: EndpointResolver,
    project_id: String,
}

impl OtcClient {
    /// Authenticate against Keystone and resolve endpoints for `config`
    pub async fn connect(config: &CloudConfig, options: &HttpOptions) -> Result<Self, ApiError> {
        let http = OtcHttpClient::new(options)?;
        let auth_type = AuthType::parse(config.auth_type.as_deref())?;
        let credentials = OtcCredentials::new(config.auth.clone(), auth_type, http.clone())?;

        let project_id = credentials.project_id().await?;
        let catalog = credentials.catalog().await?;
        if catalog.is_empty() {
            tracing::warn!("Keystone returned an empty service catalog, using regional endpoints");
        }

        let endpoints = EndpointResolver::new(
            catalog,
            config.endpoint_overrides(),
            config.interface(),
            config.region(),
            &project_id,
        );

        tracing::info!("Connected to project {} in {}", project_id, config.region());

        Ok(Self {
            credentials,
            http,
            endpoints,
            project_id,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn region(&self) -> &str {
        self.endpoints.region()
    }

    /// Full URL of `path` on a service namespace
    pub fn url(&self, service: &str, path: &str) -> Result<String, ApiError> {
        Ok(format!("{}{}", self.endpoints.endpoint(service)?, path))
    }

    pub fn item_url(&self, collection: &Collection, id: &str) -> Result<String, ApiError> {
        self.url(
            collection.service,
            &format!("{}/{}", collection.path, urlencoding::encode(id)),
        )
    }

    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, token.expose()).await
    }

    /// GET that maps 404 to `None`
    pub async fn get_opt(&self, url: &str) -> Result<Option<Value>, ApiError> {
        match self.get(url).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        self.http.post(url, token.expose(), body).await
    }

    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        self.http.put(url, token.expose(), body).await
    }

    pub async fn patch(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        self.http.patch(url, token.expose(), body).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.credentials.get_token().await?;
        self.http.delete(url, token.expose()).await
    }

    /// Show one item by id; `None` if it does not exist
    pub async fn show(&self, collection: &Collection, id: &str) -> Result<Option<Value>, ApiError> {
        let url = self.item_url(collection, id)?;
        Ok(self.get_opt(&url).await?.map(|body| collection.unwrap_item(body)))
    }

    /// Create an item, wrapping the body in `item_key` when the collection
    /// uses one
    pub async fn create(&self, collection: &Collection, attrs: Value) -> Result<Value, ApiError> {
        let url = self.url(collection.service, collection.path)?;
        let body = match collection.item_key {
            Some(key) => {
                let mut wrapped = serde_json::Map::new();
                wrapped.insert(key.to_string(), attrs);
                Value::Object(wrapped)
            }
            None => attrs,
        };
        let response = self.post(&url, Some(&body)).await?;
        Ok(collection.unwrap_item(response))
    }

    /// Delete an item; an already missing item is not an error
    pub async fn remove(&self, collection: &Collection, id: &str) -> Result<(), ApiError> {
        let url = self.item_url(collection, id)?;
        match self.delete(&url).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} {} already gone", collection.kind, id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Lazily list a collection. Pages are fetched as the stream is polled.
    pub fn list<'a>(
        &'a self,
        collection: &'a Collection,
        query: Vec<(String, String)>,
    ) -> BoxStream<'a, Result<Value, ApiError>> {
        stream::try_unfold(Some(Cursor::Start), move |cursor| {
            let query = query.clone();
            async move { self.next_page(collection, &query, cursor).await }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, ApiError>)))
        .try_flatten()
        .boxed()
    }

    async fn next_page(
        &self,
        collection: &Collection,
        query: &[(String, String)],
        cursor: Option<Cursor>,
    ) -> Result<Option<(Vec<Value>, Option<Cursor>)>, ApiError> {
        let Some(cursor) = cursor else {
            return Ok(None);
        };

        let mut params = query.to_vec();
        let limit = PAGE_SIZE.to_string();
        let seen = match (collection.paging, &cursor) {
            (Paging::None, _) => 0,
            (Paging::Marker, Cursor::Marker(marker)) => {
                params.push(("limit".to_string(), limit));
                params.push(("marker".to_string(), marker.clone()));
                0
            }
            (Paging::Marker, _) => {
                params.push(("limit".to_string(), limit));
                0
            }
            (Paging::Offset, Cursor::Offset(offset)) => {
                params.push(("limit".to_string(), limit));
                params.push(("offset".to_string(), offset.to_string()));
                *offset
            }
            (Paging::Offset, _) => {
                params.push(("limit".to_string(), limit));
                params.push(("offset".to_string(), "0".to_string()));
                0
            }
            (Paging::Page, Cursor::Page(page)) => {
                params.push(("pagesize".to_string(), limit));
                params.push(("page".to_string(), page.to_string()));
                *page
            }
            (Paging::Page, _) => {
                params.push(("pagesize".to_string(), limit));
                params.push(("page".to_string(), "1".to_string()));
                1
            }
        };

        let url = add_query_params(&self.url(collection.service, collection.path)?, &params);
        let body = self.get(&url).await?;

        let items = match body.get(collection.items_key) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ApiError::Decode(format!(
                    "'{}' in {} listing is not an array",
                    collection.items_key, collection.kind
                )))
            }
        };

        let next = if items.len() < PAGE_SIZE {
            None
        } else {
            match collection.paging {
                Paging::None => None,
                Paging::Marker => items
                    .last()
                    .and_then(|item| item.get("id"))
                    .and_then(Value::as_str)
                    .map(|id| Cursor::Marker(id.to_string())),
                Paging::Offset => Some(Cursor::Offset(seen + items.len())),
                Paging::Page => Some(Cursor::Page(seen + 1)),
            }
        };

        tracing::debug!("Fetched {} {} (more: {})", items.len(), collection.kind, next.is_some());

        Ok(Some((items, next)))
    }

    /// Find by name or id. Ids are tried directly first; names are looked
    /// up by listing. More than one match is an error.
    pub async fn find(
        &self,
        collection: &Collection,
        name_or_id: &str,
        query: Vec<(String, String)>,
    ) -> Result<Option<Value>, ApiError> {
        if uuid::Uuid::parse_str(name_or_id).is_ok() {
            if let Some(item) = self.show(collection, name_or_id).await? {
                return Ok(Some(item));
            }
        }

        let mut query = query;
        if let Some(param) = collection.name_query {
            query.push((param.to_string(), name_or_id.to_string()));
        }

        let matches: Vec<Value> = self
            .list(collection, query)
            .try_filter(|item| {
                let hit = item.get("name").and_then(Value::as_str) == Some(name_or_id)
                    || item.get("id").and_then(Value::as_str) == Some(name_or_id);
                futures::future::ready(hit)
            })
            .try_collect()
            .await?;

        single(collection.kind, name_or_id, matches)
    }
}

/// Zero or one match, or [`ApiError::Duplicate`]
pub fn single(kind: &str, name: &str, mut matches: Vec<Value>) -> Result<Option<Value>, ApiError> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(ApiError::Duplicate {
            kind: kind.to_string(),
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PEERINGS: Collection = Collection {
        service: "network",
        path: "/vpc/peerings",
        items_key: "peerings",
        item_key: Some("peering"),
        paging: Paging::Marker,
        name_query: Some("name"),
        kind: "vpc peering",
    };

    #[test]
    fn test_unwrap_item() {
        let body = json!({"peering": {"id": "p1"}});
        assert_eq!(PEERINGS.unwrap_item(body), json!({"id": "p1"}));
        // Flat responses pass through
        assert_eq!(PEERINGS.unwrap_item(json!({"id": "p2"})), json!({"id": "p2"}));
    }

    #[test]
    fn test_single_rejects_duplicates() {
        assert_eq!(single("zone", "a", vec![]).unwrap(), None);
        assert_eq!(single("zone", "a", vec![json!(1)]).unwrap(), Some(json!(1)));
        assert_eq!(
            single("zone", "a", vec![json!(1), json!(2)]).unwrap_err(),
            ApiError::Duplicate {
                kind: "zone".to_string(),
                name: "a".to_string()
            }
        );
    }
}
