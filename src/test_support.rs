use std::collections::HashMap;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use url::Url;

use crate::backend::BackendError;
use crate::domains::{
  geocode::{client::GeocodeError, client::Geocoder, model::Candidate},
  request::{
    model::{ContactInfo, HelpType, Location, NewRequestRow, Request, RequestRow, RequestStatus, Urgency},
    repository::RequestRepository,
  },
  session::{
    model::{AuthEvent, Session, User},
    provider::SessionProvider,
    service::{SessionServiceError, SessionStore},
  },
};

pub fn sample_session(user_id: &str) -> Session {
  Session {
    access_token: format!("token-{}", user_id),
    token_type: "bearer".to_string(),
    expires_in: Some(3600),
    expires_at: None,
    refresh_token: Some(format!("refresh-{}", user_id)),
    user: User {
      id: user_id.to_string(),
      email: Some(format!("{}@example.com", user_id)),
    },
  }
}

/// A session whose access token ran out an hour ago.
pub fn expired_session(user_id: &str) -> Session {
  Session {
    access_token: format!("expired-{}", user_id),
    expires_at: Some((Utc::now() - ChronoDuration::hours(1)).timestamp()),
    ..sample_session(user_id)
  }
}

pub struct FakeSessionProvider {
  current: Mutex<Option<Session>>,
  callback_session: Option<Session>,
  callback_error: Option<String>,
  verified_session: Option<Session>,
  refreshed_session: Option<Session>,
  sign_out_error: Mutex<Option<String>>,
  verify_calls: AtomicUsize,
  refresh_calls: AtomicUsize,
  otp_requests: Mutex<Vec<String>>,
  events: broadcast::Sender<AuthEvent>,
}

impl FakeSessionProvider {
  fn with_current(current: Option<Session>) -> Self {
    let (events, _) = broadcast::channel(16);
    Self {
      current: Mutex::new(current),
      callback_session: None,
      callback_error: None,
      verified_session: None,
      refreshed_session: None,
      sign_out_error: Mutex::new(None),
      verify_calls: AtomicUsize::new(0),
      refresh_calls: AtomicUsize::new(0),
      otp_requests: Mutex::new(Vec::new()),
      events,
    }
  }

  pub fn signed_out() -> Self {
    Self::with_current(None)
  }

  pub fn signed_in(session: Session) -> Self {
    Self::with_current(Some(session))
  }

  pub fn with_callback_session(mut self, session: Session) -> Self {
    self.callback_session = Some(session);
    self
  }

  pub fn with_verified_session(mut self, session: Session) -> Self {
    self.verified_session = Some(session);
    self
  }

  pub fn with_callback_error(mut self, message: &str) -> Self {
    self.callback_error = Some(message.to_string());
    self
  }

  /// Without one, every refresh is rejected.
  pub fn with_refreshed_session(mut self, session: Session) -> Self {
    self.refreshed_session = Some(session);
    self
  }

  pub fn emit_signed_in(&self, session: Session) {
    *self.current.lock() = Some(session.clone());
    let _ = self.events.send(AuthEvent::signed_in(session));
  }

  pub fn emit_signed_out(&self) {
    *self.current.lock() = None;
    let _ = self.events.send(AuthEvent::signed_out());
  }

  pub fn fail_sign_out(&self, message: &str) {
    *self.sign_out_error.lock() = Some(message.to_string());
  }

  pub fn allow_sign_out(&self) {
    *self.sign_out_error.lock() = None;
  }

  pub fn verify_calls(&self) -> usize {
    self.verify_calls.load(Ordering::SeqCst)
  }

  pub fn refresh_calls(&self) -> usize {
    self.refresh_calls.load(Ordering::SeqCst)
  }

  pub fn otp_requests(&self) -> Vec<String> {
    self.otp_requests.lock().clone()
  }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
  async fn get_session(&self) -> Result<Option<Session>, SessionServiceError> {
    Ok(self.current.lock().clone())
  }

  async fn sign_in_with_otp(&self, email: &str, _redirect_to: Option<&str>) -> Result<(), SessionServiceError> {
    self.otp_requests.lock().push(email.to_string());
    Ok(())
  }

  async fn verify_otp(&self, _email: &str, _token: &str) -> Result<Session, SessionServiceError> {
    self.verify_calls.fetch_add(1, Ordering::SeqCst);
    let session = self
      .verified_session
      .clone()
      .ok_or_else(|| SessionServiceError::Backend("Token has expired or is invalid".to_string()))?;
    *self.current.lock() = Some(session.clone());
    Ok(session)
  }

  async fn sign_out(&self) -> Result<(), SessionServiceError> {
    if let Some(message) = self.sign_out_error.lock().clone() {
      return Err(SessionServiceError::Backend(message));
    }
    *self.current.lock() = None;
    Ok(())
  }

  async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, SessionServiceError> {
    self.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let refreshed = self.refreshed_session.clone();
    *self.current.lock() = refreshed.clone();
    refreshed.ok_or_else(|| SessionServiceError::Backend("Invalid Refresh Token: Already Used".to_string()))
  }

  async fn exchange_callback(&self, _callback: &Url) -> Result<Option<Session>, SessionServiceError> {
    if let Some(message) = &self.callback_error {
      return Err(SessionServiceError::InvalidCallback(message.clone()));
    }
    let session = self.callback_session.clone();
    if let Some(session) = &session {
      *self.current.lock() = Some(session.clone());
    }
    Ok(session)
  }

  fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
    self.events.subscribe()
  }
}

pub async fn signed_in_store(user_id: &str) -> SessionStore {
  SessionStore::init(Arc::new(FakeSessionProvider::signed_in(sample_session(user_id))), None).await
}

pub async fn signed_out_store() -> SessionStore {
  SessionStore::init(Arc::new(FakeSessionProvider::signed_out()), None).await
}

/// A request row created `minutes_ago` minutes before now.
pub fn request_row(id: &str, minutes_ago: i64, status: RequestStatus) -> RequestRow {
  RequestRow {
    id: id.to_string(),
    help_type: HelpType::Water,
    urgency: Urgency::Normal,
    description: format!("request {}", id),
    lat: 7.0086,
    lng: 100.4767,
    address: Some("Hat Yai".to_string()),
    contact_phone: Some("0891234567".to_string()),
    contact_line_id: None,
    contact_whatsapp: None,
    status,
    created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    user_id: Some("user-0".to_string()),
  }
}

pub fn sample_request(id: &str, help_type: HelpType) -> Request {
  Request {
    help_type,
    ..Request::from(request_row(id, 0, RequestStatus::Open))
  }
}

/// Backend table kept in memory.
pub struct InMemoryRequestRepository {
  rows: Mutex<Vec<RequestRow>>,
  write_error: Mutex<Option<BackendError>>,
  read_error: Mutex<Option<BackendError>>,
  next_id: AtomicUsize,
  creates: AtomicUsize,
}

impl InMemoryRequestRepository {
  pub fn new(rows: Vec<RequestRow>) -> Self {
    Self {
      rows: Mutex::new(rows),
      write_error: Mutex::new(None),
      read_error: Mutex::new(None),
      next_id: AtomicUsize::new(100),
      creates: AtomicUsize::new(0),
    }
  }

  pub fn fail_writes(&self, error: BackendError) {
    *self.write_error.lock() = Some(error);
  }

  pub fn fail_reads(&self, error: BackendError) {
    *self.read_error.lock() = Some(error);
  }

  pub fn heal(&self) {
    *self.write_error.lock() = None;
    *self.read_error.lock() = None;
  }

  /// Simulates a write made by another device.
  pub fn set_status(&self, id: &str, status: RequestStatus) {
    if let Some(row) = self.rows.lock().iter_mut().find(|r| r.id == id) {
      row.status = status;
    }
  }

  pub fn snapshot(&self) -> Vec<Request> {
    let mut rows = self.rows.lock().clone();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows.into_iter().map(Request::from).collect()
  }

  pub fn creates(&self) -> usize {
    self.creates.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
  async fn find_all(&self) -> Result<Vec<RequestRow>, BackendError> {
    if let Some(err) = self.read_error.lock().clone() {
      return Err(err);
    }
    let mut rows = self.rows.lock().clone();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
  }

  async fn create(&self, row: &NewRequestRow) -> Result<Option<RequestRow>, BackendError> {
    self.creates.fetch_add(1, Ordering::SeqCst);
    if let Some(err) = self.write_error.lock().clone() {
      return Err(err);
    }
    let stored = RequestRow {
      id: format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
      help_type: row.help_type,
      urgency: row.urgency,
      description: row.description.clone(),
      lat: row.lat,
      lng: row.lng,
      address: row.address.clone(),
      contact_phone: row.contact_phone.clone(),
      contact_line_id: row.contact_line_id.clone(),
      contact_whatsapp: row.contact_whatsapp.clone(),
      status: row.status,
      created_at: Utc::now(),
      user_id: row.user_id.clone(),
    };
    self.rows.lock().push(stored.clone());
    Ok(Some(stored))
  }

  async fn update_status(&self, id: &str, status: RequestStatus) -> Result<(), BackendError> {
    if let Some(err) = self.write_error.lock().clone() {
      return Err(err);
    }
    self.set_status(id, status);
    Ok(())
  }
}

pub fn candidate(label: &str) -> Candidate {
  Candidate {
    lat: 7.0086,
    lng: 100.4767,
    label: label.to_string(),
  }
}

/// Geocoder recording every query it receives.
pub struct FakeGeocoder {
  default: Option<Vec<Candidate>>,
  responses: HashMap<String, Vec<Candidate>>,
  latency: HashMap<String, Duration>,
  queries: Mutex<Vec<String>>,
}

impl FakeGeocoder {
  pub fn new(default: Vec<Candidate>) -> Self {
    Self {
      default: Some(default),
      responses: HashMap::new(),
      latency: HashMap::new(),
      queries: Mutex::new(Vec::new()),
    }
  }

  pub fn failing() -> Self {
    Self {
      default: None,
      ..Self::new(Vec::new())
    }
  }

  pub fn with_response(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
    self.responses.insert(query.to_string(), candidates);
    self
  }

  pub fn with_latency(mut self, query: &str, latency: Duration) -> Self {
    self.latency.insert(query.to_string(), latency);
    self
  }

  pub fn queries(&self) -> Vec<String> {
    self.queries.lock().clone()
  }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
  async fn search(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
    self.queries.lock().push(query.to_string());
    if let Some(latency) = self.latency.get(query) {
      tokio::time::sleep(*latency).await;
    }
    if let Some(found) = self.responses.get(query) {
      return Ok(found.clone());
    }
    self
      .default
      .clone()
      .ok_or_else(|| GeocodeError::Transport("connection refused".to_string()))
  }
}

pub fn water_draft(location: Option<Location>) -> crate::domains::request::model::RequestDraft {
  crate::domains::request::model::RequestDraft {
    help_type: HelpType::Water,
    urgency: Urgency::Urgent,
    description: "need water".to_string(),
    location,
    contact: ContactInfo::phone("0891234567"),
  }
}
