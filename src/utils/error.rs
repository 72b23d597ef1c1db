use crate::domains::{
  geocode::client::GeocodeError, request::service::RequestServiceError, session::service::SessionServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The action needs a signed-in user.
  AuthRequired,
  Fetch,
  Persist,
  Geocode,
  Validation,
}

/// Error as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppError {
  pub kind: ErrorKind,
  pub message: String,
}

impl AppError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn auth_required(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::AuthRequired, message)
  }

  pub fn fetch(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Fetch, message)
  }

  pub fn persist(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Persist, message)
  }

  pub fn geocode(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Geocode, message)
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, message)
  }

  pub fn prompts_sign_in(&self) -> bool {
    self.kind == ErrorKind::AuthRequired
  }

  /// Whether the user should be told. Read failures only leave stale data on
  /// screen and geocoding is best effort.
  pub fn is_user_facing(&self) -> bool {
    !matches!(self.kind, ErrorKind::Fetch | ErrorKind::Geocode)
  }
}

impl std::fmt::Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl std::error::Error for AppError {}

impl From<RequestServiceError> for AppError {
  fn from(error: RequestServiceError) -> Self {
    match error {
      RequestServiceError::AuthRequired => AppError::auth_required("Sign in to continue"),
      RequestServiceError::FetchError(msg) => AppError::fetch(msg),
      RequestServiceError::PersistError(msg) => AppError::persist(msg),
      RequestServiceError::ValidationError(msg) => AppError::validation(msg),
    }
  }
}

impl From<SessionServiceError> for AppError {
  fn from(error: SessionServiceError) -> Self {
    match error {
      SessionServiceError::AuthRequired => AppError::auth_required("Sign in to continue"),
      SessionServiceError::ValidationError(msg) => AppError::validation(msg),
      SessionServiceError::Backend(msg) => AppError::persist(msg),
      SessionServiceError::InvalidCallback(msg) => {
        tracing::error!("auth callback rejected: {}", msg);
        AppError::auth_required(msg)
      }
    }
  }
}

impl From<GeocodeError> for AppError {
  fn from(error: GeocodeError) -> Self {
    AppError::geocode(error.to_string())
  }
}
