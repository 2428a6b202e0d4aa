// Integration tests for `HttpClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use converge_api::types::{ClusterPatch, NodePoolCreateRequest, TaintSpec};
use converge_api::{
    Clusters, Error, HttpClient, ListFilter, NodePools, RemoteApi, ResourceKind, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpClient) {
    let server = MockServer::start().await;
    let client = HttpClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn cluster_body(status: &str) -> serde_json::Value {
    json!({
        "id": "c-1",
        "name": "prod",
        "region": "fra1",
        "version": "1.30",
        "status": status,
        "auditLog": { "enabled": true },
        "acl": { "enabled": false, "rules": [] },
        "oidc": { "enabled": false }
    })
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_cluster() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters/c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("RUNNING")))
        .mount(&server)
        .await;

    let cluster = client
        .get::<Clusters>(&Clusters::item_path(&["c-1"]))
        .await
        .unwrap();

    assert_eq!(cluster.id, "c-1");
    assert_eq!(cluster.status, "RUNNING");
    assert!(cluster.audit_log.enabled);
}

#[tokio::test]
async fn test_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    let token = SecretString::from("s3cr3t".to_owned());
    let client =
        HttpClient::from_token(&server.uri(), &token, &TransportConfig::default()).unwrap();

    Mock::given(method("GET"))
        .and(path("/v1/clusters/c-1"))
        .and(header("authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("RUNNING")))
        .expect(1)
        .mount(&server)
        .await;

    client.get::<Clusters>("v1/clusters/c-1").await.unwrap();
}

#[tokio::test]
async fn test_create_node_pool_omits_unset_fields() {
    let (server, client) = setup().await;

    let request = NodePoolCreateRequest {
        name: "pool-a".into(),
        flavor: "g2-standard-4".into(),
        node_count: 3,
        autoscaling: None,
        labels: None,
        taints: Some(vec![TaintSpec {
            key: "dedicated".into(),
            value: "gpu".into(),
            effect: "NoSchedule".into(),
        }]),
        availability_zones: None,
    };

    Mock::given(method("POST"))
        .and(path("/v1/clusters/c-1/node-pools"))
        .and(body_json(json!({
            "name": "pool-a",
            "flavor": "g2-standard-4",
            "nodeCount": 3,
            "taints": [{ "key": "dedicated", "value": "gpu", "effect": "NoSchedule" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "np-1",
            "clusterId": "c-1",
            "name": "pool-a",
            "flavor": "g2-standard-4",
            "nodeCount": 3,
            "status": "CREATING"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pool = client
        .create::<NodePools>(&NodePools::collection_path(&["c-1"]), &request)
        .await
        .unwrap();

    assert_eq!(pool.status, "CREATING");
    assert!(pool.labels.is_empty());
}

#[tokio::test]
async fn test_update_sends_only_patched_fields() {
    let (server, client) = setup().await;

    let patch = ClusterPatch {
        version: Some("1.31".into()),
        ..ClusterPatch::default()
    };

    Mock::given(method("PATCH"))
        .and(path("/v1/clusters/c-1"))
        .and(body_json(json!({ "version": "1.31" })))
        .respond_with(ResponseTemplate::new(202).set_body_json(cluster_body("UPDATING")))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = client
        .update::<Clusters>("v1/clusters/c-1", &patch)
        .await
        .unwrap();
    assert_eq!(cluster.status, "UPDATING");
}

#[tokio::test]
async fn test_delete() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/clusters/c-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.delete::<Clusters>("v1/clusters/c-1").await.unwrap();
}

#[tokio::test]
async fn test_list_walks_all_pages() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 0, "limit": 1, "count": 1, "totalCount": 2,
            "data": [cluster_body("RUNNING")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters"))
        .and(query_param("offset", "1"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 1, "limit": 1, "count": 1, "totalCount": 2,
            "data": [cluster_body("NO_NODE")]
        })))
        .mount(&server)
        .await;

    let filter = ListFilter {
        page_size: 1,
        ..ListFilter::default()
    };
    let clusters = client.list::<Clusters>("v1/clusters", &filter).await.unwrap();

    let statuses: Vec<&str> = clusters.iter().map(|c| c.status.as_str()).collect();
    assert_eq!(statuses, vec!["RUNNING", "NO_NODE"]);
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_not_found_is_classified() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "cluster gone not found",
            "code": "not_found"
        })))
        .mount(&server)
        .await;

    let err = client.get::<Clusters>("v1/clusters/gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.api_error_code(), Some("not_found"));
}

#[tokio::test]
async fn test_conflict_keeps_raw_body_message() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/clusters/c-1"))
        .respond_with(ResponseTemplate::new(409).set_body_string("cluster is upgrading"))
        .mount(&server)
        .await;

    let err = client
        .update::<Clusters>("v1/clusters/c-1", &ClusterPatch::default())
        .await
        .unwrap_err();

    match err {
        Error::Api {
            status, message, ..
        } => {
            assert_eq!(status, 409);
            assert_eq!(message, "cluster is upgrading");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters/c-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.get::<Clusters>("v1/clusters/c-1").await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_bad_json_reports_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/clusters/c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.get::<Clusters>("v1/clusters/c-1").await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}
