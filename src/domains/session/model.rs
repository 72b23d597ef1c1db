use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::utils::jwt::read_claims;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Session {
  pub access_token: String,
  #[serde(default = "default_token_type")]
  pub token_type: String,
  #[serde(default)]
  pub expires_in: Option<i64>,
  /// Unix seconds.
  #[serde(default)]
  pub expires_at: Option<i64>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  pub user: User,
}

fn default_token_type() -> String {
  "bearer".to_string()
}

impl Session {
  /// Builds a session from a bare access token, taking the user from its
  /// claims.
  pub fn from_access_token(access_token: &str, refresh_token: Option<String>) -> Option<Self> {
    let claims = read_claims(access_token).ok()?;
    Some(Self {
      access_token: access_token.to_string(),
      token_type: default_token_type(),
      expires_in: None,
      expires_at: Some(claims.exp as i64),
      refresh_token,
      user: User {
        id: claims.sub,
        email: claims.email,
      },
    })
  }

  pub fn expiry(&self) -> Option<i64> {
    self
      .expires_at
      .or_else(|| read_claims(&self.access_token).ok().map(|c| c.exp as i64))
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expiry().is_some_and(|exp| exp <= now.timestamp())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
  SignedIn,
  SignedOut,
  TokenRefreshed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
  pub change: AuthChange,
  pub session: Option<Session>,
}

impl AuthEvent {
  pub fn signed_in(session: Session) -> Self {
    Self {
      change: AuthChange::SignedIn,
      session: Some(session),
    }
  }

  pub fn signed_out() -> Self {
    Self {
      change: AuthChange::SignedOut,
      session: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SignInRequest {
  #[validate(email(message = "a valid email address is required"))]
  pub email: String,
  #[serde(skip)]
  pub redirect_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpPayload<'a> {
  pub email: &'a str,
  pub create_user: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyPayload<'a> {
  #[serde(rename = "type")]
  pub kind: &'a str,
  pub email: &'a str,
  pub token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshPayload<'a> {
  pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
  pub session: Option<Session>,
  pub loading: bool,
}

impl SessionState {
  pub fn user(&self) -> Option<&User> {
    self.session.as_ref().map(|s| &s.user)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackState {
  Absent,
  Pending,
  Failed(String),
}

/// Classifies the URL the app was opened with: a magic-link redirect still
/// being processed, an auth error reported by the redirect, or nothing.
pub fn inspect_callback(url: &Url) -> CallbackState {
  let fragment = url.fragment().unwrap_or_default();

  if fragment.contains("error_description") {
    let description = url::form_urlencoded::parse(fragment.as_bytes())
      .find(|(key, _)| key == "error_description")
      .map(|(_, value)| value.into_owned())
      .unwrap_or_default();
    return CallbackState::Failed(description);
  }

  let query = url.query().unwrap_or_default();
  if fragment.contains("access_token")
    || fragment.contains("type=recovery")
    || fragment.contains("type=invite")
    || query.contains("code=")
  {
    return CallbackState::Pending;
  }

  CallbackState::Absent
}
