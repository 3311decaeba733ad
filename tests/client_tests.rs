// Integration tests for the HTTP client against a mock server

use api_tester::client::ApiClient;
use api_tester::config::NetworkConfig;
use api_tester::db::Database;
use api_tester::models::{ApiRequest, AuthType, BodyType, Environment, HttpMethod};
use api_tester::session::{send_request, send_request_until};
use mockito::{Matcher, Server};
use std::collections::BTreeMap;
use std::time::Duration;

fn client() -> ApiClient {
    ApiClient::new(NetworkConfig::default()).unwrap()
}

fn no_vars() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Accepts connections and never answers
async fn stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_get_with_headers_and_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/search")
        .match_header("X-Trace", "abc")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "rust lang".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": []}"#)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Get, format!("{}/search", server.url()));
    request.headers.insert("X-Trace".into(), "abc".into());
    request.params.insert("q".into(), "rust lang".into());
    request.params.insert("page".into(), "2".into());

    let response = client().execute(&request, &no_vars()).await;
    mock.assert_async().await;

    assert!(response.error.is_none());
    assert_eq!(response.status_code, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert_eq!(response.body, r#"{"results": []}"#);
    assert_eq!(response.size, response.body.len());
    assert!(response.is_json());
}

#[tokio::test]
async fn test_post_json_body_with_bearer() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/users")
        .match_header("authorization", "Bearer tok-123")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(serde_json::json!({"name": "ada", "admin": true})))
        .with_status(201)
        .with_body(r#"{"id": 7}"#)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Post, format!("{}/users", server.url()));
    request.body = r#"{"name": "ada", "admin": true}"#.into();
    request.auth_type = AuthType::Bearer;
    request.auth_data.insert("token".into(), "tok-123".into());

    let response = client().execute(&request, &no_vars()).await;
    mock.assert_async().await;
    assert_eq!(response.status_code, 201);
    assert!(response.is_success());
}

#[tokio::test]
async fn test_basic_auth_and_variables() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/items/42")
        // user:pass
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .match_body("plain text for 42")
        .with_status(204)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Put, "{{base}}/items/{{id}}");
    request.body = "plain text for {{id}}".into();
    request.body_type = BodyType::Raw;
    request.auth_type = AuthType::Basic;
    request.auth_data.insert("username".into(), "user".into());
    request.auth_data.insert("password".into(), "pass".into());

    let mut vars = BTreeMap::new();
    vars.insert("base".to_string(), server.url());
    vars.insert("id".to_string(), "42".to_string());

    let response = client().execute(&request, &vars).await;
    mock.assert_async().await;
    assert_eq!(response.status_code, 204);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_api_key_in_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/data")
        .match_query(Matcher::UrlEncoded("api_key".into(), "s3cret".into()))
        .with_status(200)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Get, format!("{}/data", server.url()));
    request.auth_type = AuthType::ApiKey;
    request.auth_data.insert("key".into(), "api_key".into());
    request.auth_data.insert("value".into(), "s3cret".into());
    request.auth_data.insert("location".into(), "query".into());

    let response = client().execute(&request, &no_vars()).await;
    mock.assert_async().await;
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_get_never_sends_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/nobody")
        .match_body(Matcher::Exact(String::new()))
        .with_status(200)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Get, format!("{}/nobody", server.url()));
    request.body = r#"{"ignored": true}"#.into();

    let response = client().execute(&request, &no_vars()).await;
    mock.assert_async().await;
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_server_error_is_a_response() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/broken")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let request = ApiRequest::new(HttpMethod::Delete, format!("{}/broken", server.url()));
    let response = client().execute(&request, &no_vars()).await;
    assert!(response.error.is_none());
    assert_eq!(response.status_code, 500);
    assert!(!response.is_success());
    assert_eq!(response.body, "boom");
}

#[tokio::test]
async fn test_unreachable_host_is_folded_into_response() {
    let request = ApiRequest::new(HttpMethod::Get, "http://127.0.0.1:1/unreachable");
    let response = client().execute(&request, &no_vars()).await;

    let error = response.error.expect("expected a connection error");
    assert!(error.starts_with("Connection error"), "got: {}", error);
    assert_eq!(response.status_code, 0);
    assert!(response.response_time >= 0.0);
}

#[tokio::test]
async fn test_dispatch_runs_on_background_task() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/ping")
        .with_status(200)
        .with_body("pong")
        .create_async()
        .await;

    let request = ApiRequest::new(HttpMethod::Get, format!("{}/ping", server.url()));
    let (tx, rx) = tokio::sync::oneshot::channel();
    client()
        .dispatch_with(request, no_vars(), move |response| {
            let _ = tx.send(response);
        })
        .await
        .unwrap();

    let response = rx.await.unwrap();
    assert_eq!(response.body, "pong");
}

#[tokio::test]
async fn test_send_request_records_successful_responses_only() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/ok")
        .with_status(200)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let client = client();

    let mut env = Environment::new("local");
    env.add_variable("base", &server.url(), "");

    let request = ApiRequest::new(HttpMethod::Get, "{{base}}/ok");
    let response = send_request(&db, &client, &request, Some(&env), true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status_code, 200);

    let failing = ApiRequest::new(HttpMethod::Get, "http://127.0.0.1:1/down");
    let response = send_request(&db, &client, &failing, None, true)
        .await
        .unwrap()
        .unwrap();
    assert!(response.error.is_some());

    let history = db.get_history(10).unwrap();
    assert_eq!(history.len(), 1);
    // history keeps the request as composed, before substitution
    assert_eq!(history[0].request.url, "{{base}}/ok");
}

#[tokio::test]
async fn test_send_request_rejects_invalid_request() {
    let db = Database::in_memory().unwrap();
    let request = ApiRequest::new(HttpMethod::Get, "ftp://example.com");
    assert!(send_request(&db, &client(), &request, None, true).await.is_err());
    assert!(db.get_history(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_environment_variables_reach_auth_headers() {
    let mut server = Server::new_async().await;
    let bearer = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer real-token")
        .with_status(200)
        .create_async()
        .await;
    let api_key = server
        .mock("GET", "/keys")
        .match_header("x-api-key", "s3cret")
        .with_status(200)
        .create_async()
        .await;

    let db = Database::in_memory().unwrap();
    let mut env = Environment::new("local");
    env.add_variable("base", &server.url(), "");
    env.add_variable("token", "real-token", "");
    env.add_variable("key", "s3cret", "");

    let mut request = ApiRequest::new(HttpMethod::Get, "{{base}}/me");
    request.auth_type = AuthType::Bearer;
    request.auth_data.insert("token".into(), "{{token}}".into());
    let response = send_request(&db, &client(), &request, Some(&env), true)
        .await
        .unwrap()
        .unwrap();
    bearer.assert_async().await;
    assert_eq!(response.status_code, 200);

    let mut request = ApiRequest::new(HttpMethod::Get, "{{base}}/keys");
    request.auth_type = AuthType::ApiKey;
    request.auth_data.insert("key".into(), "X-Api-Key".into());
    request.auth_data.insert("value".into(), "{{key}}".into());
    let response = client().execute(&request, &env.variables_map()).await;
    api_key.assert_async().await;
    assert_eq!(response.status_code, 200);

    // history keeps the placeholder, not the secret
    let history = db.get_history(10).unwrap();
    assert_eq!(history[0].request.auth_data["token"], "{{token}}");
}

#[tokio::test]
async fn test_user_content_type_is_replaced_not_duplicated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/items")
        .match_header("content-type", "application/json")
        .with_status(201)
        .create_async()
        .await;

    let mut request = ApiRequest::new(HttpMethod::Post, format!("{}/items", server.url()));
    request
        .headers
        .insert("content-type".into(), "application/vnd.api+json".into());
    request.body = r#"{"name": "x"}"#.into();

    let response = client().execute(&request, &no_vars()).await;
    mock.assert_async().await;
    assert_eq!(response.status_code, 201);
}

#[tokio::test]
async fn test_cancelled_send_records_nothing() {
    let url = stalled_server().await;
    let db = Database::in_memory().unwrap();
    let request = ApiRequest::new(HttpMethod::Get, format!("{}/slow", url));

    let outcome = send_request_until(
        &db,
        &client(),
        &request,
        None,
        true,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert!(outcome.is_none());
    assert!(db.get_history(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_stalled_server_times_out() {
    let url = stalled_server().await;
    let client = ApiClient::new(NetworkConfig {
        timeout_secs: 1,
        ..NetworkConfig::default()
    })
    .unwrap();

    let request = ApiRequest::new(HttpMethod::Get, format!("{}/slow", url));
    let response = client.execute(&request, &no_vars()).await;

    assert_eq!(response.error.as_deref(), Some("Request timed out"));
    assert_eq!(response.status_code, 0);
    assert!(response.response_time >= 1000.0);
}

#[tokio::test]
async fn test_redirects_follow_the_configured_policy() {
    let mut server = Server::new_async().await;
    let _redirect = server
        .mock("GET", "/old")
        .with_status(302)
        .with_header("location", &format!("{}/new", server.url()))
        .create_async()
        .await;
    let _target = server
        .mock("GET", "/new")
        .with_status(200)
        .with_body("moved here")
        .create_async()
        .await;

    let request = ApiRequest::new(HttpMethod::Get, format!("{}/old", server.url()));

    let mut client = client();
    let followed = client.execute(&request, &no_vars()).await;
    assert_eq!(followed.status_code, 200);
    assert_eq!(followed.body, "moved here");

    client
        .update_settings(NetworkConfig {
            max_redirects: 0,
            ..NetworkConfig::default()
        })
        .unwrap();
    let stopped = client.execute(&request, &no_vars()).await;
    assert!(stopped.error.is_none());
    assert_eq!(stopped.status_code, 302);
    assert_eq!(stopped.header("location"), Some(format!("{}/new", server.url()).as_str()));
}
