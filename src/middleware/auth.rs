use chrono::Utc;

use crate::domains::session::{
  model::User,
  service::{SessionServiceError, SessionStore},
};

/// Gate for actions that need an identity. A store still resolving its
/// initial session counts as signed out, and an expired access token is
/// refreshed before the caller gets to write with it.
pub async fn require_user(session: &SessionStore) -> Result<User, SessionServiceError> {
  if session.is_loading() {
    return Err(SessionServiceError::AuthRequired);
  }

  let current = session.state().session.ok_or(SessionServiceError::AuthRequired)?;
  if !current.is_expired(Utc::now()) {
    return Ok(current.user);
  }

  tracing::debug!(user_id = %current.user.id, "access token expired, refreshing");
  Ok(session.refresh().await?.user)
}
