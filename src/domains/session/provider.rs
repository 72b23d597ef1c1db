use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use url::Url;

use super::{
  model::{AuthChange, AuthEvent, OtpPayload, RefreshPayload, Session, VerifyPayload},
  service::SessionServiceError,
};
use crate::backend::BackendClient;

const EVENT_BUFFER: usize = 16;

/// Source of authentication state. The store owns one of these and never
/// reaches the auth service any other way.
#[async_trait]
pub trait SessionProvider: Send + Sync {
  async fn get_session(&self) -> Result<Option<Session>, SessionServiceError>;
  async fn sign_in_with_otp(&self, email: &str, redirect_to: Option<&str>) -> Result<(), SessionServiceError>;
  async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, SessionServiceError>;
  async fn sign_out(&self) -> Result<(), SessionServiceError>;
  /// Trades a refresh token for a new session. A rejected token leaves the
  /// provider signed out.
  async fn refresh_session(&self, refresh_token: &str) -> Result<Session, SessionServiceError>;
  /// Completes a magic-link redirect. `Ok(None)` when the URL carries
  /// nothing this provider can turn into a session.
  async fn exchange_callback(&self, callback: &Url) -> Result<Option<Session>, SessionServiceError>;
  fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;
}

pub struct GoTrueSessionProvider {
  backend: BackendClient,
  current: RwLock<Option<Session>>,
  events: broadcast::Sender<AuthEvent>,
}

impl GoTrueSessionProvider {
  pub fn new(backend: BackendClient) -> Self {
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    Self {
      backend,
      current: RwLock::new(None),
      events,
    }
  }

  fn store(&self, session: Option<Session>, change: AuthChange) {
    self
      .backend
      .set_access_token(session.as_ref().map(|s| s.access_token.clone()));
    *self.current.write() = session.clone();
    // no receivers is fine
    let _ = self.events.send(AuthEvent { change, session });
  }

  async fn request_refresh(&self, refresh_token: &str) -> Result<Session, SessionServiceError> {
    let url = self.backend.endpoint("auth/v1/token")?;
    let req = self
      .backend
      .http()
      .post(url)
      .query(&[("grant_type", "refresh_token")])
      .json(&RefreshPayload { refresh_token });

    let resp = BackendClient::check(self.backend.authorize(req).send().await?).await?;
    Ok(resp.json::<Session>().await?)
  }
}

#[async_trait]
impl SessionProvider for GoTrueSessionProvider {
  async fn get_session(&self) -> Result<Option<Session>, SessionServiceError> {
    Ok(self.current.read().clone())
  }

  async fn sign_in_with_otp(&self, email: &str, redirect_to: Option<&str>) -> Result<(), SessionServiceError> {
    let url = self.backend.endpoint("auth/v1/otp")?;
    let mut req = self.backend.http().post(url).json(&OtpPayload {
      email,
      create_user: true,
    });
    if let Some(redirect_to) = redirect_to {
      req = req.query(&[("redirect_to", redirect_to)]);
    }

    BackendClient::check(self.backend.authorize(req).send().await?).await?;
    tracing::info!("sign-in link requested");

    Ok(())
  }

  async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, SessionServiceError> {
    let url = self.backend.endpoint("auth/v1/verify")?;
    let req = self.backend.http().post(url).json(&VerifyPayload {
      kind: "email",
      email,
      token,
    });

    let resp = BackendClient::check(self.backend.authorize(req).send().await?).await?;
    let session = resp.json::<Session>().await?;

    self.store(Some(session.clone()), AuthChange::SignedIn);
    Ok(session)
  }

  async fn sign_out(&self) -> Result<(), SessionServiceError> {
    if self.backend.access_token().is_some() {
      let url = self.backend.endpoint("auth/v1/logout")?;
      let req = self.backend.http().post(url);
      BackendClient::check(self.backend.authorize(req).send().await?).await?;
    }

    self.store(None, AuthChange::SignedOut);
    Ok(())
  }

  async fn refresh_session(&self, refresh_token: &str) -> Result<Session, SessionServiceError> {
    match self.request_refresh(refresh_token).await {
      Ok(session) => {
        self.store(Some(session.clone()), AuthChange::TokenRefreshed);
        Ok(session)
      }
      Err(e) => {
        self.store(None, AuthChange::SignedOut);
        Err(e)
      }
    }
  }

  async fn exchange_callback(&self, callback: &Url) -> Result<Option<Session>, SessionServiceError> {
    let fragment = callback.fragment().unwrap_or_default();
    let mut access_token = None;
    let mut refresh_token = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
      match key.as_ref() {
        "access_token" => access_token = Some(value.into_owned()),
        "refresh_token" => refresh_token = Some(value.into_owned()),
        _ => {}
      }
    }

    let Some(access_token) = access_token else {
      if callback.query_pairs().any(|(key, _)| key == "code") {
        return Err(SessionServiceError::InvalidCallback(
          "sign-in codes in the callback query can not be exchanged".to_string(),
        ));
      }
      return Ok(None);
    };

    let session = Session::from_access_token(&access_token, refresh_token)
      .ok_or_else(|| SessionServiceError::InvalidCallback("access token could not be read".to_string()))?;

    self.store(Some(session.clone()), AuthChange::SignedIn);
    Ok(Some(session))
  }

  fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
    self.events.subscribe()
  }
}
