//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data.
//! `RequesterApi` builds `HttpRequest` values and classifies `HttpResponse`
//! values without touching the network. `YachaqClient` (or any other host)
//! executes the round-trip in between.
//!
//! All fields use owned types (`String`, `Vec`) so values can be moved into
//! a spawned task or handed to a different HTTP stack without lifetimes.

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute (base URL already applied). Query pairs are kept
/// unencoded; the executing host is responsible for encoding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Attach `Authorization: Bearer <token>`, replacing any existing value.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        self.headers
            .push(("authorization".to_string(), format!("Bearer {token}")));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let response = HttpResponse {
            status: 429,
            headers: vec![("retry-after".to_string(), "12".to_string())],
            body: String::new(),
        };
        assert_eq!(response.header("Retry-After"), Some("12"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn with_bearer_replaces_existing_authorization() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/v1/requester/tier".to_string(),
            query: Vec::new(),
            headers: vec![("Authorization".to_string(), "Bearer old".to_string())],
            body: None,
        }
        .with_bearer("new");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("authorization"), Some("Bearer new"));
    }
}
