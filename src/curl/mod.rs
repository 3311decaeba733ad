//! Render requests as shell `curl` commands

use crate::models::ApiRequest;

const SEPARATOR: &str = " \\\n  ";

/// Quote for a POSIX shell single-quoted string
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\"'\"'"))
}

/// URL with the request's effective query parameters appended
fn url_with_params(request: &ApiRequest) -> String {
    let params = request.effective_params();
    if params.is_empty() {
        return request.url.clone();
    }
    match reqwest::Url::parse(&request.url) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params.iter());
            url.to_string()
        }
        Err(_) => {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            let joiner = if request.url.contains('?') { '&' } else { '?' };
            format!("{}{}{}", request.url, joiner, query.join("&"))
        }
    }
}

pub fn to_curl(request: &ApiRequest) -> String {
    let mut parts = vec!["curl".to_string()];

    if request.method != crate::models::HttpMethod::Get {
        parts.push(format!("-X {}", request.method));
    }
    parts.push(shell_quote(&url_with_params(request)));

    for (key, value) in request.effective_headers() {
        parts.push(format!("-H {}", shell_quote(&format!("{}: {}", key, value))));
    }
    if let Some((username, password)) = request.basic_credentials() {
        parts.push(format!("-u {}", shell_quote(&format!("{}:{}", username, password))));
    }
    if !request.body.is_empty() && request.method.allows_body() {
        parts.push(format!("-d {}", shell_quote(&request.body)));
    }

    parts.join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthType, HttpMethod};

    #[test]
    fn test_get_without_extras() {
        let request = ApiRequest::new(HttpMethod::Get, "https://example.com/ping");
        assert_eq!(to_curl(&request), "curl \\\n  'https://example.com/ping'");
    }

    #[test]
    fn test_post_with_headers_and_quoted_body() {
        let mut request = ApiRequest::new(HttpMethod::Post, "https://example.com/notes");
        request.headers.insert("X-Trace".into(), "abc".into());
        request.body = r#"{"text": "it's here"}"#.into();

        let curl = to_curl(&request);
        let parts: Vec<&str> = curl.split(SEPARATOR).collect();
        assert_eq!(parts[0], "curl");
        assert_eq!(parts[1], "-X POST");
        assert_eq!(parts[2], "'https://example.com/notes'");
        assert!(parts.contains(&"-H 'Content-Type: application/json'"));
        assert!(parts.contains(&"-H 'X-Trace: abc'"));
        assert_eq!(
            parts.last().copied(),
            Some(r#"-d '{"text": "it'"'"'s here"}'"#)
        );
    }

    #[test]
    fn test_body_omitted_for_get() {
        let mut request = ApiRequest::new(HttpMethod::Get, "https://example.com");
        request.body = "ignored".into();
        assert!(!to_curl(&request).contains("-d"));
    }

    #[test]
    fn test_query_params_and_auth() {
        let mut request = ApiRequest::new(HttpMethod::Get, "https://example.com/search");
        request.params.insert("q".into(), "rust lang".into());
        request.auth_type = AuthType::Bearer;
        request.auth_data.insert("token".into(), "t0k".into());

        let curl = to_curl(&request);
        assert!(curl.contains("'https://example.com/search?q=rust+lang'"));
        assert!(curl.contains("-H 'Authorization: Bearer t0k'"));
    }
}
