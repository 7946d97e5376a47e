//! Integration tests for the route table adapter against a mocked ARM API
//!
//! These exercise the full CRUD protocol: existence probe, create with an
//! asynchronous operation, read-back, import conflicts, and tolerant
//! deletes.

use azrec::azure::auth::StaticToken;
use azrec::azure::client::ArmClient;
use azrec::resource::route_table::{NextHopType, RouteConfig, RouteTableConfig, RouteTables};
use azrec::resource::{ImportAsExistsError, Reconcile};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

const RT_PATH: &str = "/subscriptions/00000000-0000-0000-0000-000000000000\
                       /resourceGroups/group1/providers/Microsoft.Network/routeTables/rt1";

fn arm_client(server: &MockServer) -> ArmClient {
    ArmClient::with_endpoint(
        Arc::new(StaticToken("test-token".to_string())),
        SUBSCRIPTION,
        &server.uri(),
    )
    .unwrap()
    .with_poll_interval(Duration::from_millis(10))
}

fn desired_rt1() -> RouteTableConfig {
    RouteTableConfig {
        name: "rt1".to_string(),
        resource_group: "group1".to_string(),
        location: "westus".to_string(),
        disable_bgp_route_propagation: false,
        routes: vec![RouteConfig {
            name: "r1".to_string(),
            address_prefix: "10.0.0.0/16".to_string(),
            next_hop_type: NextHopType::VnetLocal,
            next_hop_ip: None,
        }],
        tags: BTreeMap::new(),
    }
}

fn rt1_response_body() -> Value {
    json!({
        "id": RT_PATH,
        "name": "rt1",
        "location": "westus",
        "properties": {
            "provisioningState": "Succeeded",
            "disableBgpRoutePropagation": false,
            "routes": [{
                "name": "r1",
                "properties": {
                    "addressPrefix": "10.0.0.0/16",
                    "nextHopType": "VnetLocal"
                }
            }],
            "subnets": []
        },
        "tags": {}
    })
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {"code": "ResourceNotFound", "message": "the resource was not found"}
    }))
}

/// The scenario from the adapter contract: creating a table with one route
/// and no next-hop address issues exactly one route entry, omitting the
/// address field; the subsequent read returns exactly that route.
#[tokio::test]
async fn create_issues_one_route_without_next_hop_address() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    // Existence probe misses
    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(not_found())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // PUT kicks off an asynchronous operation
    Mock::given(method("PUT"))
        .and(path(RT_PATH))
        .and(bearer_token("test-token"))
        .and(query_param("api-version", "2018-04-01"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header(
                    "Azure-AsyncOperation",
                    format!("{}/operations/op-1", server.uri()).as_str(),
                )
                .set_body_json(json!({"name": "rt1"})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;

    // Re-read after the operation finishes
    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(rt1_response_body()))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);

    let id = handler.create(&desired_rt1()).await.unwrap();
    assert_eq!(id, RT_PATH);

    // Inspect what actually went over the wire
    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .expect("a PUT should have been issued");
    let body: Value = serde_json::from_slice(&put.body).unwrap();

    let routes = body["properties"]["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["name"], "r1");
    assert_eq!(routes[0]["properties"]["addressPrefix"], "10.0.0.0/16");
    assert_eq!(routes[0]["properties"]["nextHopType"], "VnetLocal");
    assert!(
        routes[0]["properties"].get("nextHopIpAddress").is_none(),
        "absent next hop address must be omitted, not sent empty"
    );
    assert!(
        body["properties"].get("subnets").is_none(),
        "derived subnet list must never be part of a request"
    );

    // Read back: exactly the one route
    let state = handler.read(&id).await.unwrap().unwrap();
    assert_eq!(state.name, "rt1");
    assert_eq!(state.location, "westus");
    assert_eq!(state.routes.len(), 1);
    assert_eq!(state.routes[0].name, "r1");
    assert_eq!(state.routes[0].address_prefix, "10.0.0.0/16");
    assert_eq!(state.routes[0].next_hop_type, NextHopType::VnetLocal);
    assert_eq!(state.routes[0].next_hop_ip, None);
    assert!(state.subnets.is_empty());
}

#[tokio::test]
async fn create_fails_with_import_conflict_when_counterpart_exists() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(rt1_response_body()))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let err = handler.create(&desired_rt1()).await.unwrap_err();

    let conflict = err
        .downcast_ref::<ImportAsExistsError>()
        .expect("conflict must surface as ImportAsExistsError");
    assert_eq!(conflict.id, RT_PATH);

    // Nothing was mutated
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}

#[tokio::test]
async fn probe_failure_other_than_not_found_is_fatal() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": "InternalServerError", "message": "boom"}
        })))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let err = handler.create(&desired_rt1()).await.unwrap_err();

    assert!(err.to_string().contains("existence"));
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
}

#[tokio::test]
async fn update_is_idempotent() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    // Synchronous completion: 200 with no operation header
    Mock::given(method("PUT"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(rt1_response_body()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(rt1_response_body()))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let desired = desired_rt1();

    let first = handler.update(&desired).await.unwrap();
    let second = handler.update(&desired).await.unwrap();
    assert_eq!(first, second);

    let state_a = handler.read(&first).await.unwrap().unwrap();
    let state_b = handler.read(&second).await.unwrap().unwrap();
    assert_eq!(state_a, state_b);

    // Both PUT bodies were identical
    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<Value> = requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn read_of_vanished_resource_returns_none() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let state = handler.read(RT_PATH).await.unwrap();
    assert!(state.is_none());
}

#[tokio::test]
async fn read_flattens_tags_flag_and_subnets() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    let subnet_id = "/subscriptions/s/resourceGroups/g/providers/Microsoft.Network\
                     /virtualNetworks/vn1/subnets/front";

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": RT_PATH,
            "name": "rt1",
            "location": "West US",
            "properties": {
                "disableBgpRoutePropagation": true,
                "routes": [],
                "subnets": [{"id": subnet_id}]
            },
            "tags": {"env": "prod", "team": "network"}
        })))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let state = handler.read(RT_PATH).await.unwrap().unwrap();

    assert_eq!(state.location, "westus", "location is normalized on read");
    assert!(state.disable_bgp_route_propagation);
    assert_eq!(state.subnets, vec![subnet_id.to_string()]);
    assert_eq!(state.tags.get("env").map(String::as_str), Some("prod"));
    assert_eq!(state.tags.len(), 2);
}

#[tokio::test]
async fn delete_of_absent_resource_succeeds() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("DELETE"))
        .and(path(RT_PATH))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    handler.delete(RT_PATH).await.unwrap();
}

#[tokio::test]
async fn delete_waits_for_the_asynchronous_operation() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("DELETE"))
        .and(path(RT_PATH))
        .respond_with(
            ResponseTemplate::new(202).insert_header(
                "Azure-AsyncOperation",
                format!("{}/operations/del-1", server.uri()).as_str(),
            ),
        )
        .mount(&server)
        .await;

    // Still running on the first poll, finished on the second
    Mock::given(method("GET"))
        .and(path("/operations/del-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/operations/del-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    handler.delete(RT_PATH).await.unwrap();

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/operations/del-1")
        .count();
    assert_eq!(polls, 2);
}

#[tokio::test]
async fn failed_operation_surfaces_the_service_error() {
    let server = MockServer::start().await;
    let client = arm_client(&server);

    Mock::given(method("GET"))
        .and(path(RT_PATH))
        .respond_with(not_found())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(RT_PATH))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "Azure-AsyncOperation",
            format!("{}/operations/op-bad", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/operations/op-bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"message": "quota exceeded"}
        })))
        .mount(&server)
        .await;

    let handler = RouteTables::new(client);
    let err = handler.create(&desired_rt1()).await.unwrap_err();

    let chain = format!("{err:#}");
    assert!(chain.contains("quota exceeded"), "got: {chain}");
}
