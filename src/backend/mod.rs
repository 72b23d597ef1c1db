//! Hosted backend accessor
//!
//! Shared by the REST repository, the auth provider and the realtime
//! channel: one HTTP client, the project's anon key, and the bearer token
//! of the signed-in user (if any).

pub mod realtime;

use std::sync::Arc;

use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::watch;
use url::Url;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
  #[error("{message}")]
  Api { status: u16, message: String },
  #[error("network error: {0}")]
  Transport(String),
  #[error("invalid response: {0}")]
  Decode(String),
  #[error("invalid backend url: {0}")]
  InvalidUrl(String),
}

impl BackendError {
  pub fn api(status: u16, message: impl Into<String>) -> Self {
    Self::Api {
      status,
      message: message.into(),
    }
  }
}

impl From<reqwest::Error> for BackendError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      BackendError::Decode(err.to_string())
    } else {
      BackendError::Transport(err.to_string())
    }
  }
}

impl From<url::ParseError> for BackendError {
  fn from(err: url::ParseError) -> Self {
    BackendError::InvalidUrl(err.to_string())
  }
}

/// Error bodies differ between the REST and auth services, so every known
/// message field is optional.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  message: Option<String>,
  msg: Option<String>,
  error_description: Option<String>,
  error: Option<String>,
  details: Option<String>,
  hint: Option<String>,
}

impl ErrorBody {
  fn into_message(self) -> Option<String> {
    let message = self
      .message
      .or(self.msg)
      .or(self.error_description)
      .or(self.error)?;
    if let Some(details) = &self.details {
      tracing::debug!(%details, hint = ?self.hint, "backend error details");
    }
    Some(message)
  }
}

#[derive(Clone)]
pub struct BackendClient {
  http: HttpClient,
  base_url: Url,
  anon_key: String,
  access_token: Arc<watch::Sender<Option<String>>>,
}

impl BackendClient {
  pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, BackendError> {
    Self::with_http(HttpClient::new(), base_url, anon_key)
  }

  pub fn with_http(http: HttpClient, base_url: &str, anon_key: impl Into<String>) -> Result<Self, BackendError> {
    let mut base_url = Url::parse(base_url)?;
    // `Url::join` drops the last segment unless the path ends with a slash
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    Ok(Self {
      http,
      base_url,
      anon_key: anon_key.into(),
      access_token: Arc::new(watch::channel(None).0),
    })
  }

  pub fn http(&self) -> &HttpClient {
    &self.http
  }

  pub fn anon_key(&self) -> &str {
    &self.anon_key
  }

  pub fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
    Ok(self.base_url.join(path.trim_start_matches('/'))?)
  }

  pub fn access_token(&self) -> Option<String> {
    self.access_token.borrow().clone()
  }

  /// Notifies watchers only when the token actually changes.
  pub fn set_access_token(&self, token: Option<String>) {
    self.access_token.send_if_modified(|current| {
      if *current == token {
        return false;
      }
      *current = token;
      true
    });
  }

  pub fn watch_access_token(&self) -> watch::Receiver<Option<String>> {
    self.access_token.subscribe()
  }

  /// Adds the project key and the user's bearer token, falling back to the
  /// anon key for signed-out reads.
  pub fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
    let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
    req
      .header("apikey", &self.anon_key)
      .header("Authorization", format!("Bearer {}", bearer))
  }

  /// Passes successful responses through and turns everything else into
  /// `BackendError::Api` with the service's own message.
  pub async fn check(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
      .ok()
      .and_then(ErrorBody::into_message)
      .unwrap_or_else(|| {
        if text.trim().is_empty() {
          format!("HTTP {}", status)
        } else {
          text.trim().to_string()
        }
      });

    Err(BackendError::api(status.as_u16(), message))
  }

  pub fn realtime_url(&self) -> Result<Url, BackendError> {
    let mut url = self.endpoint("realtime/v1/websocket")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url
      .set_scheme(scheme)
      .map_err(|_| BackendError::InvalidUrl(format!("cannot use {} for realtime", url)))?;
    url
      .query_pairs_mut()
      .append_pair("apikey", &self.anon_key)
      .append_pair("vsn", "1.0.0");
    Ok(url)
  }
}
