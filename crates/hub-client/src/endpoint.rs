//! Hub endpoint resolution.
//!
//! Turns the page's navigation addresses and request cookies into the
//! WebSocket URL and upgrade request of the hub connection.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, HeaderValue};

use hubwire_protocol::constants::HUB_PATH;

use crate::cookies::{CookieJar, CookieSource};
use crate::error::HubError;

/// Addresses of the page hosting the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Address of the current page. Its host scopes forwarded cookies.
    pub uri: String,
    /// Base address of the service. The hub path is appended to it.
    pub base_uri: String,
}

impl Navigation {
    /// Navigation where the current page is the base address itself.
    pub fn new(base_uri: impl Into<String>) -> Self {
        let base_uri = base_uri.into();
        Self {
            uri: base_uri.clone(),
            base_uri,
        }
    }

    /// Sets the current page address.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }
}

/// Resolved hub target: WebSocket URL plus forwarded cookies.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: String,
    host: String,
    path: String,
    cookies: CookieJar,
}

impl Endpoint {
    /// Resolves `{base_uri}/signalRHub` and copies the request cookies,
    /// scoped to the host of the current page.
    pub fn from_navigation(
        navigation: &Navigation,
        cookies: Option<&dyn CookieSource>,
    ) -> Result<Self, HubError> {
        let hub_url = format!("{}{}", navigation.base_uri.trim_end_matches('/'), HUB_PATH);
        let url = to_websocket_url(&hub_url)?;
        let uri: Uri = url
            .parse()
            .map_err(|e| HubError::InvalidUrl(format!("{url}: {e}")))?;
        let host = uri
            .host()
            .ok_or_else(|| HubError::InvalidUrl(format!("{url}: missing host")))?
            .to_string();
        let path = uri.path().to_string();

        let page_host = page_host(&navigation.uri)?;
        let cookies = match cookies {
            Some(source) => CookieJar::scoped_to(&page_host, source),
            None => CookieJar::new(),
        };

        Ok(Self {
            url,
            host,
            path,
            cookies,
        })
    }

    /// WebSocket URL of the hub.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cookies that apply to the hub URL, formatted as a `Cookie` header.
    pub fn cookie_header(&self) -> Option<String> {
        self.cookies.header_for(&self.host, &self.path)
    }

    /// Builds the WebSocket upgrade request.
    pub(crate) fn request(&self) -> Result<Request, HubError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(header) = self.cookie_header() {
            let value = HeaderValue::from_str(&header)
                .map_err(|e| HubError::InvalidCookieHeader(e.to_string()))?;
            request.headers_mut().insert(COOKIE, value);
        }
        Ok(request)
    }
}

/// Maps `http`/`https` to `ws`/`wss`; WebSocket schemes pass through.
fn to_websocket_url(url: &str) -> Result<String, HubError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| HubError::InvalidUrl(format!("{url}: missing scheme")))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(HubError::InvalidUrl(format!(
                "{url}: unsupported scheme {other}"
            )));
        }
    };
    Ok(format!("{ws_scheme}://{rest}"))
}

fn page_host(uri: &str) -> Result<String, HubError> {
    let parsed: Uri = uri
        .parse()
        .map_err(|e| HubError::InvalidUrl(format!("{uri}: {e}")))?;
    parsed
        .host()
        .map(str::to_string)
        .ok_or_else(|| HubError::InvalidUrl(format!("{uri}: missing host")))
}
