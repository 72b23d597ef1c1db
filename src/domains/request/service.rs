use std::future::Future;
use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use validator::Validate;

use super::{
  model::{
    is_temporary_id, sort_newest_first, Request, RequestDraft, RequestFilter, RequestStatus, ADDRESS_PLACEHOLDER,
  },
  repository::RequestRepository,
};
use crate::backend::realtime::{ChangeStream, Subscription};
use crate::backend::BackendError;
use crate::domains::session::{model::User, service::SessionStore};
use crate::impl_service_error_conversions;
use crate::middleware::auth::require_user;
use crate::utils::validate_phone;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestServiceError {
  #[error("sign in required")]
  AuthRequired,
  #[error("failed to load requests: {0}")]
  FetchError(String),
  #[error("{0}")]
  PersistError(String),
  #[error("{0}")]
  ValidationError(String),
}

impl_service_error_conversions!(RequestServiceError, FetchError);

/// A local change shown on the board while its backend write is in flight.
#[derive(Debug, Clone, PartialEq)]
enum LocalChange {
  Insert(Request),
  SetStatus { id: String, status: RequestStatus },
}

impl LocalChange {
  fn apply(&self, requests: &mut Vec<Request>) {
    match self {
      LocalChange::Insert(request) => requests.insert(0, request.clone()),
      LocalChange::SetStatus { id, status } => {
        if let Some(req) = requests.iter_mut().find(|r| &r.id == id) {
          req.status = *status;
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingChange {
  op: u64,
  change: LocalChange,
}

/// The board every view renders from.
///
/// `requests` is always `base` with the pending local changes replayed in
/// call order. `base` holds the last fetched collection plus confirmed
/// writes. `version` moves on every change, `epoch` only when a fetched
/// snapshot replaces the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
  pub requests: Vec<Request>,
  base: Vec<Request>,
  pending: Vec<PendingChange>,
  next_op: u64,
  version: u64,
  epoch: u64,
  fetch_seq: u64,
}

impl BoardState {
  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Local changes still waiting for the backend.
  pub fn pending_writes(&self) -> usize {
    self.pending.len()
  }

  pub fn get(&self, id: &str) -> Option<&Request> {
    self.requests.iter().find(|r| r.id == id)
  }

  fn rebuild(&mut self) {
    let mut requests = self.base.clone();
    for pending in &self.pending {
      pending.change.apply(&mut requests);
    }
    self.requests = requests;
    self.version += 1;
  }

  fn push_change(&mut self, change: LocalChange) -> u64 {
    self.next_op += 1;
    let op = self.next_op;
    self.pending.push(PendingChange { op, change });
    self.rebuild();
    op
  }

  fn settle(&mut self, op: u64) -> bool {
    let before = self.pending.len();
    self.pending.retain(|p| p.op != op);
    self.pending.len() != before
  }

  fn replace(&mut self, fetched: Vec<Request>, seq: u64) {
    self.base = fetched;
    self.pending.clear();
    self.fetch_seq = seq;
    self.epoch += 1;
    self.rebuild();
  }
}

/// An in-flight backend write started by an optimistic mutation.
///
/// Dropping it detaches the write; it still completes (or rolls back) in the
/// background.
#[derive(Debug)]
pub struct PendingWrite {
  handle: JoinHandle<Result<(), RequestServiceError>>,
}

impl PendingWrite {
  pub async fn outcome(self) -> Result<(), RequestServiceError> {
    match self.handle.await {
      Ok(result) => result,
      Err(e) => Err(RequestServiceError::PersistError(format!("write task failed: {}", e))),
    }
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

#[derive(Debug)]
pub struct Submitted {
  /// The temporary projection shown until the backend confirms.
  pub request: Request,
  pub write: PendingWrite,
}

#[async_trait]
pub trait RequestService: Send + Sync {
  async fn load_all(&self) -> Result<Vec<Request>, RequestServiceError>;
  async fn reconcile(&self) -> Result<(), RequestServiceError>;
  async fn create(&self, draft: RequestDraft) -> Result<Submitted, RequestServiceError>;
  async fn change_status(&self, id: &str, status: RequestStatus) -> Result<PendingWrite, RequestServiceError>;
}

pub struct RequestServiceImpl<R> {
  repository: Arc<R>,
  session: SessionStore,
  board: Arc<watch::Sender<BoardState>>,
  fetch_seq: Arc<AtomicU64>,
}

impl<R> Clone for RequestServiceImpl<R> {
  fn clone(&self) -> Self {
    Self {
      repository: self.repository.clone(),
      session: self.session.clone(),
      board: self.board.clone(),
      fetch_seq: self.fetch_seq.clone(),
    }
  }
}

impl<R: RequestRepository + 'static> RequestServiceImpl<R> {
  pub fn new(repository: R, session: SessionStore) -> Self {
    let (board, _) = watch::channel(BoardState::default());
    Self {
      repository: Arc::new(repository),
      session,
      board: Arc::new(board),
      fetch_seq: Arc::new(AtomicU64::new(0)),
    }
  }

  pub fn snapshot(&self) -> Vec<Request> {
    self.board.borrow().requests.clone()
  }

  pub fn state(&self) -> BoardState {
    self.board.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<BoardState> {
    self.board.subscribe()
  }

  pub fn filtered(&self, filter: RequestFilter) -> Vec<Request> {
    filter.apply(&self.board.borrow().requests).into_iter().cloned().collect()
  }

  /// Reconciles on every notification until the stream ends or the returned
  /// subscription is dropped.
  pub fn follow(&self, stream: ChangeStream) -> Subscription {
    let ChangeStream {
      mut changes,
      subscription,
    } = stream;
    let service = self.clone();

    let task = tokio::spawn(async move {
      while let Some(change) = changes.recv().await {
        tracing::debug!(kind = ?change.kind, "change notification, reconciling");
        // failures are logged by load_all and leave the board untouched
        let _ = service.reconcile().await;
      }
      tracing::debug!("change stream ended");
    });

    subscription.with_task(task.abort_handle())
  }

  async fn signed_in_user(&self) -> Result<User, RequestServiceError> {
    require_user(&self.session)
      .await
      .map_err(|_| RequestServiceError::AuthRequired)
  }

  /// Shows `change` on the board right away, then runs `remote` in the
  /// background.
  ///
  /// On failure the change is dropped and the board is replayed from its
  /// base and the changes still pending, so every entry reads as if the
  /// failed write had never been made. On success `confirm` folds the result
  /// into the base before a reconcile. A fetched snapshot that replaced the
  /// board in the meantime has already discarded the change.
  fn optimistic<T, F, C>(&self, change: LocalChange, remote: F, confirm: C) -> PendingWrite
  where
    T: Send + 'static,
    F: Future<Output = Result<T, BackendError>> + Send + 'static,
    C: FnOnce(&mut Vec<Request>, T) + Send + 'static,
  {
    let mut op = 0;
    self.board.send_modify(|state| op = state.push_change(change));

    let service = self.clone();
    let handle = tokio::spawn(async move {
      match remote.await {
        Ok(value) => {
          service.board.send_modify(|state| {
            state.settle(op);
            confirm(&mut state.base, value);
            state.rebuild();
          });
          if let Err(e) = service.reconcile().await {
            tracing::warn!("reconcile after write failed: {}", e);
          }
          Ok(())
        }
        Err(e) => {
          service.board.send_if_modified(|state| {
            if !state.settle(op) {
              return false;
            }
            state.rebuild();
            true
          });
          tracing::error!("write failed, optimistic change rolled back: {}", e);
          Err(RequestServiceError::PersistError(e.to_string()))
        }
      }
    });

    PendingWrite { handle }
  }
}

#[async_trait]
impl<R: RequestRepository + 'static> RequestService for RequestServiceImpl<R> {
  async fn load_all(&self) -> Result<Vec<Request>, RequestServiceError> {
    let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;

    let rows = self.repository.find_all().await.map_err(|e| {
      tracing::error!("failed to fetch requests: {}", e);
      RequestServiceError::from(e)
    })?;

    let mut requests: Vec<Request> = rows.into_iter().map(Request::from).collect();
    sort_newest_first(&mut requests);

    let fetched = requests.clone();
    let applied = self.board.send_if_modified(|state| {
      if seq <= state.fetch_seq {
        return false;
      }
      state.replace(fetched, seq);
      true
    });
    if !applied {
      tracing::debug!(seq, "discarding stale fetch");
    }

    Ok(requests)
  }

  async fn reconcile(&self) -> Result<(), RequestServiceError> {
    let requests = self.load_all().await?;
    tracing::debug!(count = requests.len(), "board reconciled");
    Ok(())
  }

  async fn create(&self, draft: RequestDraft) -> Result<Submitted, RequestServiceError> {
    let user = self.signed_in_user().await?;

    draft
      .validate()
      .map_err(|e| RequestServiceError::ValidationError(format!("Validation failed: {}", e)))?;
    if let Some(phone) = draft.contact.phone.as_deref().filter(|p| !p.trim().is_empty()) {
      validate_phone(phone).map_err(|e| RequestServiceError::ValidationError(e.to_string()))?;
    }
    let mut location = draft
      .location
      .clone()
      .ok_or_else(|| RequestServiceError::ValidationError("location is required".to_string()))?;
    if location.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
      location.address = Some(ADDRESS_PLACEHOLDER.to_string());
    }

    let temporary = draft.to_temporary(location.clone(), &user.id, Utc::now());
    let row = draft.to_new_row(&location, &user.id);

    let repository = self.repository.clone();

    let write = self.optimistic(
      LocalChange::Insert(temporary.clone()),
      async move { repository.create(&row).await },
      |base, stored| {
        let Some(stored) = stored else { return };
        let stored = Request::from(stored);
        if !base.iter().any(|r| r.id == stored.id) {
          base.push(stored);
          sort_newest_first(base);
        }
      },
    );

    tracing::info!(id = %temporary.id, help_type = ?temporary.help_type, "request submitted");

    Ok(Submitted {
      request: temporary,
      write,
    })
  }

  async fn change_status(&self, id: &str, status: RequestStatus) -> Result<PendingWrite, RequestServiceError> {
    self.signed_in_user().await?;

    if status == RequestStatus::Expired {
      return Err(RequestServiceError::ValidationError(
        "expired can not be set by hand".to_string(),
      ));
    }
    if is_temporary_id(id) {
      return Err(RequestServiceError::ValidationError(
        "request is still being submitted".to_string(),
      ));
    }

    let repository = self.repository.clone();
    let remote_id = id.to_string();
    let confirmed_id = id.to_string();

    let write = self.optimistic(
      LocalChange::SetStatus {
        id: id.to_string(),
        status,
      },
      async move { repository.update_status(&remote_id, status).await },
      move |base, ()| {
        if let Some(req) = base.iter_mut().find(|r| r.id == confirmed_id) {
          req.status = status;
        }
      },
    );

    tracing::info!(id, status = status.as_str(), "status change submitted");

    Ok(write)
  }
}
