use crate::{
  backend::realtime::Subscription,
  domains::{
    request::{
      model::{Request, RequestStatus},
      repository::REQUESTS_TABLE,
      service::RequestService,
    },
    volunteer::directory::VolunteerDirectory,
  },
  state::SharedAppState,
};

/// A loaded board following live changes.
pub struct App {
  pub state: SharedAppState,
  subscription: Option<Subscription>,
}

/// Loads the board and starts following realtime changes. Neither step is
/// fatal: a failed load leaves the board empty until the next change, and a
/// failed subscription leaves it static.
pub async fn create_app(state: SharedAppState) -> App {
  match state.request_service.load_all().await {
    Ok(requests) => tracing::info!(count = requests.len(), "board loaded"),
    Err(e) => tracing::error!("initial board load failed: {}", e),
  }

  let subscription = match state
    .realtime
    .subscribe(&state.realtime_channel, REQUESTS_TABLE)
    .await
  {
    Ok(stream) => Some(state.request_service.follow(stream)),
    Err(e) => {
      tracing::warn!("live updates unavailable: {}", e);
      None
    }
  };

  App { state, subscription }
}

impl App {
  /// Whether the realtime socket is currently joined. Goes false while it
  /// reconnects.
  pub fn is_live(&self) -> bool {
    self.subscription.as_ref().is_some_and(Subscription::is_connected)
  }

  /// Tears down live updates and the session listener. Safe to call twice.
  pub fn shutdown(&self) {
    if self.subscription.as_ref().is_some_and(Subscription::unsubscribe) {
      tracing::info!("realtime subscription closed");
    }
    self.state.session.shutdown();
  }
}

/// One line per request, as logged by the binary.
pub fn board_lines(requests: &[Request], volunteers: &VolunteerDirectory) -> Vec<String> {
  requests
    .iter()
    .map(|req| {
      let helpers = if req.status == RequestStatus::Resolved {
        String::new()
      } else {
        let names: Vec<&str> = volunteers.available_for(req).iter().map(|v| v.name.as_str()).collect();
        if names.is_empty() {
          String::new()
        } else {
          format!(" helpers: {}", names.join(", "))
        }
      };
      let address = req.location.address.as_deref().unwrap_or("-");
      let call = req.contact.call_link().unwrap_or_default();
      format!(
        "[{}] {:?}/{:?} {} @ {} {}{}",
        req.status.as_str(),
        req.help_type,
        req.urgency,
        req.description,
        address,
        call,
        helpers
      )
    })
    .collect()
}
