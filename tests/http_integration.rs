//! Integration tests for the OTC client using wiremock
//!
//! A mock server plays both Keystone and the network service: the token
//! response carries a catalog pointing back at the mock, so every request
//! of a real module run lands on the mocked endpoints.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use otcmod::envelope::Envelope;
use otcmod::module::{find_module, Harness};
use otcmod::otc::OtcConnector;

const TOKEN: &str = "gAAAAAB-test-token";
const PASSWORD: &str = "pw-Kx92-secret";

fn token_body(server: &MockServer) -> Value {
    json!({
        "token": {
            "expires_at": "2099-01-01T00:00:00.000000Z",
            "project": {"id": "0a1b2c3d4e5f", "name": "eu-de_demo"},
            "catalog": [
                {
                    "type": "network",
                    "endpoints": [
                        {"interface": "public", "region": "eu-de", "url": server.uri()}
                    ]
                }
            ]
        }
    })
}

async fn mount_keystone(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(json!({"auth": {"identity": {"methods": ["password"]}}})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(token_body(server)),
        )
        .mount(server)
        .await;
}

fn cloud(server: &MockServer) -> Value {
    json!({
        "auth_url": format!("{}/v3", server.uri()),
        "username": "demo",
        "password": PASSWORD,
        "project_name": "eu-de_demo",
        "user_domain_name": "OTC-EU-DE-00000000001000000001"
    })
}

async fn run(module: &str, args: Value) -> Envelope {
    let harness = Harness::new(OtcConnector::new(None)).with_poll_interval(Duration::from_millis(5));
    harness.invoke(find_module(module).unwrap(), &args).await
}

fn assert_no_secret(envelope: &Envelope) {
    let serialized = serde_json::to_string(envelope).unwrap();
    assert!(!serialized.contains(PASSWORD), "password leaked: {}", serialized);
    assert!(!serialized.contains(TOKEN), "token leaked: {}", serialized);
}

mod listing_tests {
    use super::*;

    /// A listing authenticates once and filters client-side
    #[tokio::test]
    async fn test_security_group_info_end_to_end() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security_groups": [
                    {"id": "1", "name": "sg-a", "links": [{"rel": "self", "href": "http://x"}]},
                    {"id": "2", "name": "sg-b"},
                    {"id": "3", "name": "sg-c"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = run("security_group_info", json!({"cloud": cloud(&server), "name": "sg-a"})).await;

        assert!(!envelope.failed, "{:?}", envelope.msg);
        assert!(!envelope.changed);
        assert_eq!(envelope.data["security_groups"], json!([{"id": "1", "name": "sg-a"}]));
        assert_no_secret(&envelope);
    }

    /// Full pages are followed with the last id as marker
    #[tokio::test]
    async fn test_marker_pagination() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        let first_page: Vec<Value> = (0..100)
            .map(|i| json!({"id": format!("sg-{:03}", i), "name": format!("group-{}", i)}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .and(query_param("limit", "100"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"security_groups": first_page})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .and(query_param("marker", "sg-099"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security_groups": [{"id": "sg-100", "name": "group-100"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = run("security_group_info", json!({"cloud": cloud(&server)})).await;

        assert!(!envelope.failed, "{:?}", envelope.msg);
        let groups = envelope.data["security_groups"].as_array().unwrap();
        assert_eq!(groups.len(), 101);
        assert_eq!(groups[100]["name"], "group-100");
    }

    /// Remote errors surface verbatim as connectivity failures
    #[tokio::test]
    async fn test_listing_error_is_connectivity() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "NeutronError": {"message": "Request Failed: internal server error", "type": "HTTPInternalServerError"}
            })))
            .mount(&server)
            .await;

        let envelope = run("security_group_info", json!({"cloud": cloud(&server)})).await;

        assert!(envelope.failed);
        let msg = envelope.msg.as_deref().unwrap();
        assert!(msg.starts_with("connectivity:"), "{}", msg);
        assert!(msg.contains("internal server error"));
    }
}

mod auth_tests {
    use super::*;

    /// Rejected credentials fail before any service call
    #[tokio::test]
    async fn test_401_is_connectivity() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "code": 401,
                    "message": "The request you have made requires authentication.",
                    "title": "Unauthorized"
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"security_groups": []})))
            .expect(0)
            .mount(&server)
            .await;

        let envelope = run("security_group_info", json!({"cloud": cloud(&server)})).await;

        assert!(envelope.failed);
        let msg = envelope.msg.as_deref().unwrap();
        assert!(msg.starts_with("connectivity:"), "{}", msg);
        assert!(msg.contains("requires authentication"));
        assert_no_secret(&envelope);
    }

    /// Keystone answering without a token header is a decode failure
    #[tokio::test]
    async fn test_missing_subject_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(token_body(&server)))
            .mount(&server)
            .await;

        let envelope = run("security_group_info", json!({"cloud": cloud(&server)})).await;

        assert!(envelope.failed);
        assert!(envelope.msg.as_deref().unwrap().contains("X-Subject-Token"));
    }
}

mod mutation_tests {
    use super::*;

    /// A security group deleted concurrently is not an error
    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security_groups": [{"id": "sg-1", "name": "web"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/v2.0/security-groups/sg-1"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "NeutronError": {"message": "Security group sg-1 does not exist"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = run(
            "security_group",
            json!({"cloud": cloud(&server), "name": "web", "state": "absent", "wait": false}),
        )
        .await;

        assert!(!envelope.failed, "{:?}", envelope.msg);
        assert!(envelope.changed);
    }

    /// Create wraps the body in the collection's item key
    #[tokio::test]
    async fn test_create_security_group() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"security_groups": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2.0/security-groups"))
            .and(body_partial_json(json!({"security_group": {"name": "web", "description": "frontends"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "security_group": {"id": "sg-9", "name": "web", "description": "frontends"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = run(
            "security_group",
            json!({"cloud": cloud(&server), "name": "web", "description": "frontends", "wait": false}),
        )
        .await;

        assert!(!envelope.failed, "{:?}", envelope.msg);
        assert!(envelope.changed);
        assert_eq!(envelope.data["security_group"]["id"], "sg-9");
    }

    /// Two remote groups with one name cannot be told apart
    #[tokio::test]
    async fn test_duplicate_name_is_precondition() {
        let server = MockServer::start().await;
        mount_keystone(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/security-groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "security_groups": [{"id": "a", "name": "web"}, {"id": "b", "name": "web"}]
            })))
            .mount(&server)
            .await;

        let envelope = run("security_group", json!({"cloud": cloud(&server), "name": "web"})).await;

        assert!(envelope.failed);
        assert!(envelope.msg.as_deref().unwrap().starts_with("precondition-failed:"));
    }
}
