//! HTTP client for sending API requests
//!
//! Requests run on tokio tasks. Transport failures never surface as `Err`: they are
//! recorded in [`ApiResponse::error`] together with the elapsed time.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::models::{
    substitute_variables, ApiRequest, ApiResponse, HttpMethod, KeyValueMap, RequestBody,
};

const USER_AGENT: &str = concat!("api-tester/", env!("CARGO_PKG_VERSION"));

/// Sends [`ApiRequest`]s and turns the outcome into an [`ApiResponse`]
#[derive(Clone)]
pub struct ApiClient {
    settings: NetworkConfig,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(settings: NetworkConfig) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &NetworkConfig {
        &self.settings
    }

    /// Rebuild the underlying client with new network settings
    pub fn update_settings(&mut self, settings: NetworkConfig) -> Result<()> {
        self.client = build_client(&settings)?;
        self.settings = settings;
        tracing::debug!(
            timeout = self.settings.timeout_secs,
            verify_ssl = self.settings.verify_ssl,
            max_redirects = self.settings.max_redirects,
            "Updated client settings"
        );
        Ok(())
    }

    /// Send a request after substituting `{{variables}}`
    pub async fn execute(
        &self,
        request: &ApiRequest,
        variables: &BTreeMap<String, String>,
    ) -> ApiResponse {
        let start = Instant::now();
        let resolved = resolve_request(request, variables);
        tracing::info!(method = %resolved.method, url = %resolved.url, "Sending request");

        match self.send(&resolved, start).await {
            Ok(response) => {
                tracing::debug!(
                    status = response.status_code,
                    elapsed_ms = response.response_time,
                    "Received response"
                );
                response
            }
            Err(e) => {
                let message = describe_error(&e);
                tracing::warn!(error = %message, "Request failed");
                ApiResponse::failed(message, elapsed_ms(start))
            }
        }
    }

    /// Send on a background task; the caller awaits the handle when it wants the result
    pub fn dispatch(
        &self,
        request: ApiRequest,
        variables: BTreeMap<String, String>,
    ) -> JoinHandle<ApiResponse> {
        let client = self.clone();
        tokio::spawn(async move { client.execute(&request, &variables).await })
    }

    /// Send on a background task and hand the response to `callback`
    pub fn dispatch_with<F>(
        &self,
        request: ApiRequest,
        variables: BTreeMap<String, String>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(ApiResponse) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let response = client.execute(&request, &variables).await;
            callback(response);
        })
    }

    async fn send(&self, request: &ApiRequest, start: Instant) -> reqwest::Result<ApiResponse> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);

        let params = request.effective_params();
        if !params.is_empty() {
            builder = builder.query(&params);
        }
        for (name, value) in request.effective_headers() {
            builder = builder.header(name, value);
        }
        if let Some((username, password)) = request.basic_credentials() {
            builder = builder.basic_auth(username, Some(password));
        }
        if request.method.allows_body() {
            builder = match request.parsed_body() {
                Some(RequestBody::Json(value)) if value.is_object() || value.is_array() => {
                    builder.json(&value)
                }
                Some(_) => builder.body(request.body.clone()),
                None => builder,
            };
        }

        let response = builder.send().await?;

        let status = response.status();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let bytes = response.bytes().await?;
        let response_time = elapsed_ms(start);

        Ok(ApiResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            response_time,
            size: bytes.len(),
            ..ApiResponse::default()
        })
    }
}

fn build_client(settings: &NetworkConfig) -> Result<reqwest::Client> {
    let redirect = if settings.max_redirects == 0 {
        reqwest::redirect::Policy::none()
    } else {
        reqwest::redirect::Policy::limited(settings.max_redirects)
    };

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(settings.timeout_secs))
        .danger_accept_invalid_certs(!settings.verify_ssl)
        .redirect(redirect)
        .build()
        .context("Failed to create HTTP client")
}

/// Copy of `request` with variables substituted into the URL, header and param
/// values, the authentication fields and the body
pub fn resolve_request(request: &ApiRequest, variables: &BTreeMap<String, String>) -> ApiRequest {
    if variables.is_empty() {
        return request.clone();
    }
    let substitute = |value: &String| substitute_variables(value, variables);
    ApiRequest {
        url: substitute(&request.url),
        headers: substitute_values(&request.headers, substitute),
        params: substitute_values(&request.params, substitute),
        auth_data: request
            .auth_data
            .iter()
            .map(|(k, v)| (k.clone(), substitute(v)))
            .collect(),
        body: substitute(&request.body),
        ..request.clone()
    }
}

fn substitute_values(map: &KeyValueMap, substitute: impl Fn(&String) -> String) -> KeyValueMap {
    map.iter().map(|(k, v)| (k.clone(), substitute(v))).collect()
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timed out".to_string()
    } else if error.is_connect() {
        format!("Connection error: {}", error)
    } else if error.is_request()
        || error.is_builder()
        || error.is_redirect()
        || error.is_body()
        || error.is_status()
    {
        format!("Request error: {}", error)
    } else {
        format!("Unexpected error: {}", error)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthType;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_request_substitutes_everywhere() {
        let mut request = ApiRequest::new(HttpMethod::Post, "{{base}}/users");
        request.headers.insert("X-Tenant".into(), "{{tenant}}".into());
        request.params.insert("q".into(), "{{tenant}}-search".into());
        request.body = r#"{"tenant": "{{tenant}}"}"#.into();

        let resolved = resolve_request(
            &request,
            &vars(&[("base", "https://api.example.com"), ("tenant", "acme")]),
        );
        assert_eq!(resolved.url, "https://api.example.com/users");
        assert_eq!(resolved.headers["X-Tenant"], "acme");
        assert_eq!(resolved.params["q"], "acme-search");
        assert_eq!(resolved.body, r#"{"tenant": "acme"}"#);
        assert_eq!(resolved.method, HttpMethod::Post);
    }

    #[test]
    fn test_resolve_request_substitutes_auth_fields() {
        let mut request = ApiRequest::new(HttpMethod::Get, "https://api.example.com");
        request.auth_type = AuthType::Bearer;
        request.auth_data.insert("token".into(), "{{token}}".into());

        let resolved = resolve_request(&request, &vars(&[("token", "real-token")]));
        assert_eq!(resolved.effective_headers()["Authorization"], "Bearer real-token");

        request.auth_type = AuthType::ApiKey;
        request.auth_data.clear();
        request.auth_data.insert("key".into(), "{{key_name}}".into());
        request.auth_data.insert("value".into(), "{{key_value}}".into());
        let resolved = resolve_request(
            &request,
            &vars(&[("key_name", "X-Api-Key"), ("key_value", "s3cret")]),
        );
        assert_eq!(resolved.effective_headers()["X-Api-Key"], "s3cret");
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let request = ApiRequest::new(HttpMethod::Get, "https://x.io/{{missing}}");
        let resolved = resolve_request(&request, &vars(&[("other", "1")]));
        assert_eq!(resolved.url, "https://x.io/{{missing}}");
    }

    #[test]
    fn test_update_settings_replaces_configuration() {
        let mut client = ApiClient::new(NetworkConfig::default()).unwrap();
        let settings = NetworkConfig {
            timeout_secs: 5,
            verify_ssl: false,
            max_redirects: 0,
        };
        client.update_settings(settings.clone()).unwrap();
        assert_eq!(client.settings(), &settings);
    }
}
