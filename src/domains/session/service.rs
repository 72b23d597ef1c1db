use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Weak,
};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast::error::RecvError, watch, Mutex as AsyncMutex};
use tokio::task::AbortHandle;
use url::Url;
use validator::Validate;

use super::{
  model::{inspect_callback, CallbackState, Session, SessionState, SignInRequest, User},
  provider::SessionProvider,
};
use crate::{impl_service_error_conversions, utils::validate_otp_code};

/// How long a pending magic-link callback may keep the store loading.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionServiceError {
  #[error("sign in required")]
  AuthRequired,
  #[error("{0}")]
  ValidationError(String),
  #[error("{0}")]
  Backend(String),
  #[error("invalid auth callback: {0}")]
  InvalidCallback(String),
}

impl_service_error_conversions!(SessionServiceError, Backend);

struct StoreInner {
  provider: Arc<dyn SessionProvider>,
  state: watch::Sender<SessionState>,
  tasks: Mutex<Vec<AbortHandle>>,
  closed: AtomicBool,
  refreshing: AsyncMutex<()>,
}

impl StoreInner {
  fn shutdown(&self) -> bool {
    if self.closed.swap(true, Ordering::SeqCst) {
      return false;
    }
    for task in self.tasks.lock().drain(..) {
      task.abort();
    }
    true
  }

  fn apply_session(&self, session: Option<Session>) {
    self.state.send_modify(|state| {
      state.session = session;
      state.loading = false;
    });
  }

  fn stop_loading(&self) -> bool {
    self.state.send_if_modified(|state| {
      if state.loading {
        state.loading = false;
        true
      } else {
        false
      }
    })
  }
}

impl Drop for StoreInner {
  fn drop(&mut self) {
    self.shutdown();
  }
}

/// Process-wide authentication state.
///
/// Built once over a [`SessionProvider`] and handed to whoever needs the
/// current identity; every provider notification flows through a single
/// update path.
#[derive(Clone)]
pub struct SessionStore {
  inner: Arc<StoreInner>,
}

impl SessionStore {
  pub async fn init(provider: Arc<dyn SessionProvider>, callback: Option<&Url>) -> Self {
    Self::init_with_timeout(provider, callback, CALLBACK_TIMEOUT).await
  }

  pub async fn init_with_timeout(provider: Arc<dyn SessionProvider>, callback: Option<&Url>, timeout: Duration) -> Self {
    let pending = match callback.map(inspect_callback) {
      Some(CallbackState::Pending) => true,
      Some(CallbackState::Failed(description)) => {
        tracing::error!("auth error from callback: {}", description);
        false
      }
      Some(CallbackState::Absent) | None => false,
    };

    let (state, _) = watch::channel(SessionState {
      session: None,
      loading: true,
    });
    let store = Self {
      inner: Arc::new(StoreInner {
        provider: provider.clone(),
        state,
        tasks: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
        refreshing: AsyncMutex::new(()),
      }),
    };

    store.listen(provider.on_auth_state_change());

    match provider.get_session().await {
      Ok(Some(session)) => store.inner.apply_session(Some(session)),
      Ok(None) => {
        if !pending {
          store.inner.stop_loading();
        }
      }
      Err(e) => {
        tracing::error!("failed to read initial session: {}", e);
        if !pending {
          store.inner.stop_loading();
        }
      }
    }

    if let (true, Some(callback)) = (pending, callback) {
      store.complete_callback(callback.clone(), timeout);
    }

    store
  }

  fn listen(&self, mut events: tokio::sync::broadcast::Receiver<super::model::AuthEvent>) {
    let weak = Arc::downgrade(&self.inner);
    let task = tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => {
            let Some(inner) = weak.upgrade() else { break };
            tracing::debug!(change = ?event.change, "session changed");
            inner.apply_session(event.session);
          }
          Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "session notifications lagged");
          }
          Err(RecvError::Closed) => break,
        }
      }
    });
    self.track(task.abort_handle());
  }

  fn complete_callback(&self, callback: Url, timeout: Duration) {
    let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
    let provider = self.inner.provider.clone();
    let exchange = tokio::spawn(async move {
      let result = provider.exchange_callback(&callback).await;
      let Some(inner) = weak.upgrade() else { return };
      match result {
        Ok(Some(session)) => inner.apply_session(Some(session)),
        Ok(None) => {}
        Err(e) => {
          tracing::error!("auth callback failed: {}", e);
          inner.stop_loading();
        }
      }
    });
    self.track(exchange.abort_handle());

    let weak = Arc::downgrade(&self.inner);
    let fallback = tokio::spawn(async move {
      tokio::time::sleep(timeout).await;
      if let Some(inner) = weak.upgrade() {
        if inner.stop_loading() {
          tracing::warn!("auth callback did not complete within {:?}", timeout);
        }
      }
    });
    self.track(fallback.abort_handle());
  }

  fn track(&self, task: AbortHandle) {
    if self.inner.closed.load(Ordering::SeqCst) {
      task.abort();
    } else {
      self.inner.tasks.lock().push(task);
    }
  }

  pub fn state(&self) -> SessionState {
    self.inner.state.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<SessionState> {
    self.inner.state.subscribe()
  }

  pub fn is_loading(&self) -> bool {
    self.inner.state.borrow().loading
  }

  pub fn current_user(&self) -> Option<User> {
    self.inner.state.borrow().user().cloned()
  }

  pub fn access_token(&self) -> Option<String> {
    self
      .inner
      .state
      .borrow()
      .session
      .as_ref()
      .map(|s| s.access_token.clone())
  }

  /// Resolves once the initial session check has settled.
  pub async fn wait_until_loaded(&self) -> SessionState {
    let mut rx = self.subscribe();
    let settled = rx.wait_for(|state| !state.loading).await.map(|state| state.clone());
    settled.unwrap_or_else(|_| self.state())
  }

  pub async fn request_sign_in(&self, email: &str, redirect_to: Option<&str>) -> Result<(), SessionServiceError> {
    let req = SignInRequest {
      email: email.trim().to_string(),
      redirect_to: redirect_to.map(str::to_string),
    };
    req
      .validate()
      .map_err(|e| SessionServiceError::ValidationError(format!("Validation failed: {}", e)))?;

    self
      .inner
      .provider
      .sign_in_with_otp(&req.email, req.redirect_to.as_deref())
      .await
  }

  pub async fn verify_code(&self, email: &str, code: &str) -> Result<User, SessionServiceError> {
    let code = code.trim();
    validate_otp_code(code).map_err(|e| SessionServiceError::ValidationError(e.to_string()))?;

    let session = self.inner.provider.verify_otp(email.trim(), code).await?;
    let user = session.user.clone();
    self.inner.apply_session(Some(session));

    tracing::info!(user_id = %user.id, "signed in");
    Ok(user)
  }

  pub async fn sign_out(&self) -> Result<(), SessionServiceError> {
    self.inner.provider.sign_out().await?;
    self.inner.apply_session(None);
    tracing::info!("signed out");
    Ok(())
  }

  /// Swaps an expired access token for a fresh one. Concurrent callers wait
  /// for a single refresh. A rejected refresh token signs the user out.
  pub async fn refresh(&self) -> Result<Session, SessionServiceError> {
    let _refreshing = self.inner.refreshing.lock().await;

    let current = self.state().session.ok_or(SessionServiceError::AuthRequired)?;
    if !current.is_expired(Utc::now()) {
      return Ok(current);
    }
    let Some(refresh_token) = current.refresh_token.as_deref() else {
      tracing::warn!(user_id = %current.user.id, "session expired without a refresh token");
      self.inner.apply_session(None);
      return Err(SessionServiceError::AuthRequired);
    };

    match self.inner.provider.refresh_session(refresh_token).await {
      Ok(session) => {
        tracing::info!(user_id = %session.user.id, "access token refreshed");
        self.inner.apply_session(Some(session.clone()));
        Ok(session)
      }
      Err(e) => {
        tracing::warn!("session refresh failed: {}", e);
        self.inner.apply_session(None);
        Err(SessionServiceError::AuthRequired)
      }
    }
  }

  /// Stops listening to the provider. Returns `false` if already stopped.
  pub fn shutdown(&self) -> bool {
    self.inner.shutdown()
  }
}
