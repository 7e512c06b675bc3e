//! HTTP transport to the router's web server.
//!
//! Not a browser: the firmware's httpd only needs the session cookie and a
//! same-origin `Referer` to accept an apply post.

use std::time::Duration;

use base64::Engine as _;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use tokio::sync::RwLock;
use url::Url;

use crate::types::{EngineError, EngineResult};

/// Default path of the firmware's generic apply handler.
pub const DEFAULT_ENDPOINT: &str = "/start_apply.htm";
/// Path of the firmware's login handler.
pub const LOGIN_ENDPOINT: &str = "/login.cgi";
/// Name of the session cookie set by `login.cgi`.
pub const TOKEN_COOKIE: &str = "asus_token";

/// Client for the router's web interface.
#[derive(Debug)]
pub struct RouterClient {
    client: reqwest::Client,
    base: Url,
    endpoint: String,
    page: String,
    token: RwLock<Option<String>>,
}

impl RouterClient {
    /// Create a client for the router at `router_url` (e.g. `http://192.168.1.1`).
    ///
    /// `page` is sent as the `Referer` so the post looks like it came from the
    /// add-on page.
    pub fn new(router_url: &str, endpoint: &str, page: &str) -> EngineResult<Self> {
        let base = Url::parse(router_url)?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("nginxui/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            endpoint: endpoint.to_string(),
            page: page.to_string(),
            token: RwLock::new(None),
        })
    }

    /// Start out with an already issued session token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = RwLock::new(token);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Use an already issued session token.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    fn referer(&self) -> EngineResult<String> {
        Ok(self.base.join(&self.page)?.to_string())
    }

    /// POST the apply form as `multipart/form-data` and return the body.
    ///
    /// Non-2xx replies are errors; the body is still captured for logging.
    /// A body that cannot be read in full is a transport error.
    pub async fn post_apply(
        &self,
        fields: Vec<(&'static str, String)>,
        timeout: Duration,
    ) -> EngineResult<String> {
        let url = self.base.join(&self.endpoint)?;

        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }

        let mut builder = self
            .client
            .post(url.clone())
            .timeout(timeout)
            .header(REFERER, self.referer()?)
            .multipart(form);

        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.header(COOKIE, format!("{TOKEN_COOKIE}={token}"));
        }

        tracing::debug!(%url, timeout_secs = timeout.as_secs(), "Posting apply form");

        let r = builder.send().await?;
        let status = r.status();

        if !status.is_success() {
            // Only kept for the error, so a broken body is not fatal here.
            let body = r.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body_len = body.len(), "Apply post rejected");
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = r.text().await?;
        tracing::debug!(status = status.as_u16(), body_len = body.len(), "Apply post answered");
        Ok(body)
    }

    /// Log in with the router's admin credentials and keep the session token.
    ///
    /// The firmware expects `login_authorization=base64(user:pass)` and
    /// answers with an `asus_token` cookie.
    pub async fn login(&self, username: &str, password: &str) -> EngineResult<()> {
        let url = self.base.join(LOGIN_ENDPOINT)?;
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));

        let r = self
            .client
            .post(url)
            .timeout(Duration::from_secs(10))
            .header(REFERER, self.base.join("/Main_Login.asp")?.to_string())
            .form(&[("login_authorization", credentials)])
            .send()
            .await?;

        let status = r.status();
        let token = r
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(extract_token);

        match token {
            Some(token) => {
                tracing::info!("Logged in to {}", self.base);
                *self.token.write().await = Some(token);
                Ok(())
            }
            None if !status.is_success() => Err(EngineError::Login(format!(
                "router answered with status {}",
                status.as_u16()
            ))),
            None => Err(EngineError::Login(
                "no session token in reply, check username and password".to_string(),
            )),
        }
    }
}

/// Pull the `asus_token` value out of one `Set-Cookie` header.
fn extract_token(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let value = pair.strip_prefix(TOKEN_COOKIE)?.strip_prefix('=')?;
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RouterClient::new("http://192.168.1.1", DEFAULT_ENDPOINT, "nginxui.asp");
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_router_url() {
        let client = RouterClient::new("not a url", DEFAULT_ENDPOINT, "nginxui.asp");
        assert!(matches!(client, Err(EngineError::InvalidUrl(_))));
    }

    #[test]
    fn test_referer_uses_page() {
        let client =
            RouterClient::new("http://router.asus.com:8443", DEFAULT_ENDPOINT, "nginxui.asp")
                .unwrap();
        assert_eq!(client.referer().unwrap(), "http://router.asus.com:8443/nginxui.asp");
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token("asus_token=abc123; HttpOnly;"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token("clickedItem_tab=0"), None);
        assert_eq!(extract_token("asus_token=; HttpOnly"), None);
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let client =
            RouterClient::new("http://192.168.1.1", DEFAULT_ENDPOINT, "nginxui.asp").unwrap();
        assert!(!client.has_token().await);
        client.set_token(Some("t0k3n".into())).await;
        assert!(client.has_token().await);
    }
}
