//! Unit tests for the Rackspace client.

use super::*;
use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};


use serde_json::json;
use stub::{COMPUTE_PATH, STUB_TOKEN, StubApi, StubResponse, TOKENS_PATH, VOLUME_PATH};

#[fixture]
fn provider() -> RackspaceProvider {
    RackspaceProvider::new(
        "rackspace@dfw",
        RackspaceCredentials {
            username: String::from("user"),
            key: String::from("key"),
            region: String::from("dfw"),
            auth_url: String::from("https://identity.example/v2.0/tokens"),
        },
        Duration::from_secs(5),
    )
    .expect("client should build")
}

fn auth_fixture() -> AuthResponse {
    serde_json::from_str(
        r#"{
            "access": {
                "token": {"id": "tok-1"},
                "serviceCatalog": [
                    {"type": "compute", "name": "cloudServers", "endpoints": [
                        {"publicURL": "https://servers.api.example/v1.0/1"}
                    ]},
                    {"type": "compute", "name": "cloudServersOpenStack", "endpoints": [
                        {"region": "ORD", "publicURL": "https://ord.servers.example/v2/1"},
                        {"region": "DFW", "publicURL": "https://dfw.servers.example/v2/1/"}
                    ]},
                    {"type": "volume", "name": "cloudBlockStorage", "endpoints": [
                        {"region": "DFW", "publicURL": "https://dfw.blockstorage.example/v1/1"}
                    ]}
                ]
            }
        }"#,
    )
    .expect("fixture should parse")
}

#[rstest]
fn session_picks_regional_endpoints_case_insensitively() {
    let session = session_from_auth(auth_fixture(), "dfw").expect("session");
    assert_eq!(
        session,
        Session {
            token: String::from("tok-1"),
            compute_url: String::from("https://dfw.servers.example/v2/1"),
            volume_url: String::from("https://dfw.blockstorage.example/v1/1"),
        }
    );
}

#[rstest]
fn session_requires_every_endpoint() {
    let err = session_from_auth(auth_fixture(), "ord").expect_err("no volume endpoint");
    assert_eq!(
        err,
        ProviderError::MissingEndpoint {
            service: String::from("volume"),
            region: String::from("ord"),
        }
    );
}

#[rstest]
#[case("ACTIVE", InstanceState::Running)]
#[case("BUILD", InstanceState::Pending)]
#[case("SHUTOFF", InstanceState::Stopped)]
#[case("DELETED", InstanceState::Terminated)]
#[case("VERIFY_RESIZE", InstanceState::Running)]
#[case("PREP_RESIZE", InstanceState::Pending)]
#[case("RESCUE", InstanceState::Pending)]
#[case("PASSWORD", InstanceState::Pending)]
#[case("SUSPENDED", InstanceState::Stopped)]
#[case("ERROR", InstanceState::Unknown(String::from("ERROR")))]
fn maps_nova_status(#[case] raw: &str, #[case] expected: InstanceState) {
    assert_eq!(map_status(raw), expected);
}

#[rstest]
fn normalises_servers(provider: RackspaceProvider) {
    let listing: ServerListing = serde_json::from_str(
        r#"{"servers": [{
            "id": "srv-1",
            "name": "acceptance-test-alice-1",
            "status": "ACTIVE",
            "created": "2016-03-01T10:20:30Z",
            "metadata": {"role": "node"}
        }]}"#,
    )
    .expect("fixture should parse");

    let server = listing
        .servers
        .into_iter()
        .map(|item| provider.to_resource(ResourceKind::Instance, item))
        .next()
        .expect("one server");

    assert_eq!(server.name.as_deref(), Some("acceptance-test-alice-1"));
    assert_eq!(server.state, Some(InstanceState::Running));
    assert_eq!(server.region.as_deref(), Some("dfw"));
    assert_eq!(server.metadata.get("role").map(String::as_str), Some("node"));
    assert_eq!(
        server.creation_time,
        Utc.with_ymd_and_hms(2016, 3, 1, 10, 20, 30).single()
    );
}

#[rstest]
fn volume_timestamps_without_offset_are_utc(provider: RackspaceProvider) {
    let listing: VolumeListing = serde_json::from_str(
        r#"{"volumes": [{
            "id": "vol-1",
            "display_name": "data",
            "status": "available",
            "created_at": "2016-03-01T10:20:30.000000",
            "metadata": {"flocker-cluster-id": "abc"}
        }]}"#,
    )
    .expect("fixture should parse");

    let volume = listing
        .volumes
        .into_iter()
        .map(|item| provider.to_resource(ResourceKind::Volume, item))
        .next()
        .expect("one volume");

    assert_eq!(volume.name.as_deref(), Some("data"));
    assert!(volume.state.is_none());
    assert_eq!(volume.tag_or_metadata("flocker-cluster-id"), Some("abc"));
    assert_eq!(
        volume.creation_time,
        Utc.with_ymd_and_hms(2016, 3, 1, 10, 20, 30).single()
    );
}

fn stub_client(api: &StubApi) -> RackspaceProvider {
    RackspaceProvider::new(
        "rackspace@dfw",
        RackspaceCredentials {
            username: String::from("user"),
            key: String::from("secret-key"),
            region: String::from("dfw"),
            auth_url: api.url("/v2.0/tokens"),
        },
        Duration::from_secs(5),
    )
    .expect("client should build")
}

#[tokio::test]
async fn authenticates_with_api_key_credentials() {
    let api = StubApi::start().await;
    api.serve_identity();
    let servers_path = format!("{COMPUTE_PATH}/servers/detail");
    api.route(
        "GET",
        &servers_path,
        StubResponse::json(&json!({"servers": [{
            "id": "srv-1",
            "name": "acceptance-test-alice-1",
            "status": "ACTIVE",
            "created": "2016-03-01T10:20:30Z"
        }]})),
    );

    let servers = stub_client(&api).list_nodes().await.expect("listing succeeds");

    assert_eq!(servers.len(), 1);
    let requests = api.requests();
    let auth = requests
        .iter()
        .find(|request| request.path == TOKENS_PATH)
        .expect("token request");
    assert_eq!(auth.method, "POST");
    let body: serde_json::Value = serde_json::from_str(&auth.body).expect("auth body is JSON");
    assert_eq!(
        body,
        json!({"auth": {"RAX-KSKEY:apiKeyCredentials": {
            "username": "user",
            "apiKey": "secret-key"
        }}})
    );
    let listing = requests
        .iter()
        .find(|request| request.path == servers_path)
        .expect("servers request");
    assert_eq!(listing.method, "GET");
    assert_eq!(listing.header("X-Auth-Token"), Some(STUB_TOKEN));
}

#[tokio::test]
async fn volume_listing_follows_next_links() {
    let api = StubApi::start().await;
    api.serve_identity();
    let first_page = format!("{VOLUME_PATH}/volumes/detail");
    let second_page = format!("{VOLUME_PATH}/volumes/detail?marker=vol-page1");
    api.route(
        "GET",
        &first_page,
        StubResponse::json(&json!({
            "volumes": [{"id": "vol-page1"}],
            "volumes_links": [
                {"rel": "previous", "href": api.url(&first_page)},
                {"rel": "next", "href": api.url(&second_page)}
            ]
        })),
    );
    api.route(
        "GET",
        &second_page,
        StubResponse::json(&json!({"volumes": [{"id": "vol-page2"}]})),
    );

    let volumes = stub_client(&api).list_volumes().await.expect("listing succeeds");

    let ids = volumes.iter().map(|volume| volume.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["vol-page1", "vol-page2"]);
    assert_eq!(api.count("GET", &second_page), 1);
}

#[tokio::test]
async fn server_listing_follows_next_links() {
    let api = StubApi::start().await;
    api.serve_identity();
    let first_page = format!("{COMPUTE_PATH}/servers/detail");
    let second_page = format!("{COMPUTE_PATH}/servers/detail?marker=srv-1");
    api.route(
        "GET",
        &first_page,
        StubResponse::json(&json!({
            "servers": [{"id": "srv-1"}],
            "servers_links": [{"rel": "next", "href": api.url(&second_page)}]
        })),
    );
    api.route(
        "GET",
        &second_page,
        StubResponse::json(&json!({"servers": [{"id": "srv-2"}], "servers_links": []})),
    );

    let servers = stub_client(&api).list_nodes().await.expect("listing succeeds");

    let ids = servers.iter().map(|server| server.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["srv-1", "srv-2"]);
}

#[tokio::test]
async fn self_referencing_next_link_fails_the_listing() {
    let api = StubApi::start().await;
    api.serve_identity();
    let page = format!("{VOLUME_PATH}/volumes/detail");
    api.route(
        "GET",
        &page,
        StubResponse::json(&json!({
            "volumes": [{"id": "vol-1"}],
            "volumes_links": [{"rel": "next", "href": api.url(&page)}]
        })),
    );

    let err = stub_client(&api)
        .list_volumes()
        .await
        .expect_err("looping pagination is rejected");

    assert!(
        matches!(err, ProviderError::Parse { ref resource, .. } if resource == "volumes"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn failing_later_page_fails_the_whole_listing() {
    let api = StubApi::start().await;
    api.serve_identity();
    let first_page = format!("{VOLUME_PATH}/volumes/detail");
    api.route(
        "GET",
        &first_page,
        StubResponse::json(&json!({
            "volumes": [{"id": "vol-page1"}],
            "volumes_links": [{"rel": "next", "href": api.url("/volume/v1/1/missing")}]
        })),
    );

    let err = stub_client(&api)
        .list_volumes()
        .await
        .expect_err("partial inventory is an error");

    assert!(
        matches!(err, ProviderError::Http { ref operation, .. } if operation == "volumes"),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[case::instance(ResourceKind::Instance, "srv-9", "/compute/v2/1/servers/srv-9")]
#[case::volume(ResourceKind::Volume, "vol-9", "/volume/v1/1/volumes/vol-9")]
#[tokio::test]
async fn destroy_deletes_the_resource_url(
    #[case] kind: ResourceKind,
    #[case] id: &str,
    #[case] path: &str,
) {
    let api = StubApi::start().await;
    api.serve_identity();
    api.route("DELETE", path, StubResponse::status(204));
    let resource = CloudResource::new(id, kind, "rackspace@dfw");

    stub_client(&api)
        .destroy(&resource)
        .await
        .expect("destroy succeeds");

    let delete = api
        .requests()
        .into_iter()
        .find(|request| request.method == "DELETE")
        .expect("delete request");
    assert_eq!(delete.path, path);
    assert_eq!(delete.header("X-Auth-Token"), Some(STUB_TOKEN));
}

#[tokio::test]
async fn rejected_destroy_surfaces_http_error() {
    let api = StubApi::start().await;
    api.serve_identity();
    let resource = CloudResource::new("srv-gone", ResourceKind::Instance, "rackspace@dfw");

    let err = stub_client(&api)
        .destroy(&resource)
        .await
        .expect_err("unrouted delete answers 404");

    assert!(
        matches!(err, ProviderError::Http { ref operation, .. } if operation == "instances delete"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn rejected_credentials_surface_as_http_error() {
    let api = StubApi::start().await;
    api.route("POST", TOKENS_PATH, StubResponse::status(401));

    let err = stub_client(&api)
        .list_nodes()
        .await
        .expect_err("authentication fails");

    assert!(
        matches!(err, ProviderError::Http { ref operation, ref message } if operation == "authentication" && message.contains("401")),
        "unexpected error: {err:?}"
    );
    assert_eq!(api.count("GET", &format!("{COMPUTE_PATH}/servers/detail")), 0);
}

#[tokio::test]
async fn session_is_reused_across_calls() {
    let api = StubApi::start().await;
    api.serve_identity();
    api.route(
        "GET",
        &format!("{COMPUTE_PATH}/servers/detail"),
        StubResponse::json(&json!({"servers": []})),
    );
    api.route(
        "GET",
        &format!("{VOLUME_PATH}/volumes/detail"),
        StubResponse::json(&json!({"volumes": []})),
    );
    let client = stub_client(&api);

    client.list_nodes().await.expect("servers listed");
    client.list_volumes().await.expect("volumes listed");

    assert_eq!(api.count("POST", TOKENS_PATH), 1);
}
