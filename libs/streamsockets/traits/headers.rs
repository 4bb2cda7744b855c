use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers to attach to the upgrade request
pub type Headers = HashMap<String, String>;

/// Trait for providing upgrade-request headers dynamically
///
/// Called once per `connect`, right before the upgrade request is built, so
/// every fresh connection can carry fresh values (session ids, timestamps,
/// origin overrides).
///
/// # Example
/// ```ignore
/// struct OriginHeader;
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for OriginHeader {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = Headers::new();
///         headers.insert("Origin".to_string(), "https://example.com".to_string());
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next upgrade request
    async fn get_headers(&self) -> Headers;
}

/// A no-op header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Headers {
        HashMap::new()
    }
}

/// Header provider returning the same headers every time
pub struct StaticHeaders {
    headers: Headers,
}

impl StaticHeaders {
    pub fn new(headers: Headers) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.headers.clone()
    }
}
