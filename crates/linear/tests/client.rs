use ema_core::config::LinearConfig;
use ema_core::IssueTracker;
use ema_linear::LinearClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> LinearClient {
    LinearClient::new(&LinearConfig {
        api_url: format!("{}/graphql", server.uri()),
        api_key: Some("lin_api_test".to_string().into()),
        team_keys: Vec::new(),
        timeout_secs: 5,
    })
    .expect("client")
}

#[tokio::test]
async fn execute_returns_data_member_and_sends_raw_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("Authorization", "lin_api_test"))
        .and(body_partial_json(json!({ "query": "{ viewer { id } }" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "viewer": { "id": "u-1" } } })),
        )
        .mount(&server)
        .await;

    let data = client_for(&server).execute("{ viewer { id } }").await.expect("query");

    assert_eq!(data, json!({ "viewer": { "id": "u-1" } }));
}

#[tokio::test]
async fn graphql_errors_become_tracker_error_even_on_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [
                { "message": "Cannot query field \"foo\" on type \"Issue\"." },
                { "message": "Unknown argument \"bar\"." }
            ]
        })))
        .mount(&server)
        .await;

    let error = client_for(&server).execute("{ issues { foo } }").await.expect_err("graphql error");

    assert_eq!(
        error.message,
        "Cannot query field \"foo\" on type \"Issue\".; Unknown argument \"bar\"."
    );
}

#[tokio::test]
async fn http_failure_without_graphql_errors_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let error = client_for(&server).execute("{ viewer { id } }").await.expect_err("http error");

    assert!(error.message.starts_with("linear api returned 503"), "got {}", error.message);
}

#[tokio::test]
async fn teams_follow_pagination_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "cursor": null } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "teams": {
                "nodes": [{ "id": "t-1", "name": "Engineering", "key": "ENG" }],
                "pageInfo": { "hasNextPage": true, "endCursor": "c-1" }
            } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "cursor": "c-1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "teams": {
                "nodes": [{ "id": "t-2", "name": "Operations", "key": "OPS" }],
                "pageInfo": { "hasNextPage": false, "endCursor": null }
            } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let teams = client.teams().await.expect("teams");
    assert_eq!(teams.iter().map(|team| team.key.as_str()).collect::<Vec<_>>(), vec!["ENG", "OPS"]);

    let team = client.find_team("operations").await.expect("find by name");
    assert_eq!(team.id, "t-2");

    let missing = client.find_team("nope").await.expect_err("missing team");
    assert_eq!(missing.message, "team not found: nope");
}

#[tokio::test]
async fn issue_lookup_reports_missing_issue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "issue": null } })),
        )
        .mount(&server)
        .await;

    let error = client_for(&server).issue("ENG-404").await.expect_err("missing issue");

    assert_eq!(error.message, "issue not found: ENG-404");
}

#[tokio::test]
async fn non_json_success_body_is_a_tracker_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway login page</html>"))
        .mount(&server)
        .await;

    let error = client_for(&server).execute("{ viewer { id } }").await.expect_err("decode error");

    assert!(
        error.message.starts_with("linear response decode failed: "),
        "got {}",
        error.message
    );
}
