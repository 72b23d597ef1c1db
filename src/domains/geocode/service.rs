use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{
  client::Geocoder,
  model::{is_searchable, Candidate, DEBOUNCE},
};
use crate::domains::request::model::Location;

/// Address suggestions for a query being typed.
///
/// Each keystroke resets an 800 ms quiet period; only the query still current
/// when its results arrive may publish them.
pub struct AddressSearch {
  geocoder: Arc<dyn Geocoder>,
  debounce: Duration,
  suggestions: Arc<watch::Sender<Vec<Candidate>>>,
  generation: Arc<AtomicU64>,
  pending: Mutex<Option<JoinHandle<()>>>,
}

impl AddressSearch {
  pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
    Self::with_debounce(geocoder, DEBOUNCE)
  }

  pub fn with_debounce(geocoder: Arc<dyn Geocoder>, debounce: Duration) -> Self {
    let (suggestions, _) = watch::channel(Vec::new());
    Self {
      geocoder,
      debounce,
      suggestions: Arc::new(suggestions),
      generation: Arc::new(AtomicU64::new(0)),
      pending: Mutex::new(None),
    }
  }

  pub fn suggestions(&self) -> Vec<Candidate> {
    self.suggestions.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<Candidate>> {
    self.suggestions.subscribe()
  }

  pub fn set_query(&self, query: &str) {
    let generation = self.supersede();

    let query = query.trim().to_string();
    if !is_searchable(&query) {
      self.suggestions.send_replace(Vec::new());
      return;
    }

    let geocoder = self.geocoder.clone();
    let suggestions = self.suggestions.clone();
    let current = self.generation.clone();
    let debounce = self.debounce;

    let task = tokio::spawn(async move {
      tokio::time::sleep(debounce).await;

      let found = match geocoder.search(&query).await {
        Ok(found) => found,
        Err(e) => {
          tracing::warn!(%query, "address search failed: {}", e);
          Vec::new()
        }
      };

      if current.load(Ordering::SeqCst) == generation {
        suggestions.send_replace(found);
      } else {
        tracing::debug!(%query, "discarding superseded suggestions");
      }
    });

    *self.pending.lock() = Some(task);
  }

  /// Picks a suggestion: clears the list and returns the location to put
  /// on the draft.
  pub fn select(&self, candidate: &Candidate) -> Location {
    self.supersede();
    self.suggestions.send_replace(Vec::new());
    candidate.to_location()
  }

  fn supersede(&self) -> u64 {
    if let Some(task) = self.pending.lock().take() {
      task.abort();
    }
    self.generation.fetch_add(1, Ordering::SeqCst) + 1
  }
}

impl Drop for AddressSearch {
  fn drop(&mut self) {
    if let Some(task) = self.pending.get_mut().take() {
      task.abort();
    }
  }
}
