use std::sync::Arc;

use anyhow::Context;

use crate::{
  backend::{realtime::RealtimeClient, BackendClient},
  config::AppConfig,
  domains::{
    geocode::{
      client::NominatimGeocoder,
      location::{locate, FixedPosition, PositionOptions, PositionSource},
      service::AddressSearch,
    },
    request::{
      model::{Location, Request, RequestDraft, RequestStatus},
      repository::PostgrestRequestRepository,
      service::{PendingWrite, RequestService, RequestServiceImpl, Submitted},
    },
    session::{model::User, provider::GoTrueSessionProvider, service::SessionStore},
    volunteer::directory::VolunteerDirectory,
  },
  utils::error::AppError,
};

pub trait AppState: Clone + Send + Sync + 'static {
  fn refresh_board(&self) -> impl std::future::Future<Output = Result<Vec<Request>, AppError>> + Send;
  fn submit_request(&self, draft: RequestDraft)
    -> impl std::future::Future<Output = Result<Submitted, AppError>> + Send;
  fn change_status(
    &self,
    id: &str,
    status: RequestStatus,
  ) -> impl std::future::Future<Output = Result<PendingWrite, AppError>> + Send;
  fn request_sign_in(&self, email: &str) -> impl std::future::Future<Output = Result<(), AppError>> + Send;
  fn verify_code(&self, email: &str, code: &str) -> impl std::future::Future<Output = Result<User, AppError>> + Send;
  fn sign_out(&self) -> impl std::future::Future<Output = Result<(), AppError>> + Send;
  fn locate_me(&self) -> impl std::future::Future<Output = Result<Location, AppError>> + Send;
}

#[derive(Clone)]
pub struct SharedAppState {
  pub session: SessionStore,
  pub request_service: Arc<RequestServiceImpl<PostgrestRequestRepository>>,
  pub realtime: RealtimeClient,
  pub address_search: Arc<AddressSearch>,
  pub position: Arc<dyn PositionSource>,
  pub volunteers: Arc<VolunteerDirectory>,
  pub realtime_channel: String,
  auth_redirect_url: Option<String>,
}

impl SharedAppState {
  pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
    let backend =
      BackendClient::new(&config.supabase_url, config.supabase_anon_key.clone()).context("invalid backend url")?;

    let provider = Arc::new(GoTrueSessionProvider::new(backend.clone()));
    let session = SessionStore::init(provider, config.auth_callback_url.as_ref()).await;

    let request_repository = PostgrestRequestRepository::new(backend.clone());
    let request_service = Arc::new(RequestServiceImpl::new(request_repository, session.clone()));

    let geocoder = NominatimGeocoder::new(
      &config.geocoder_base_url,
      config.geocoder_user_agent.clone(),
      config.geocoder_country.clone(),
    )
    .context("invalid geocoder url")?;

    let volunteers = match &config.volunteers_file {
      Some(path) => VolunteerDirectory::from_file(path)?,
      None => VolunteerDirectory::seed(),
    };

    Ok(Self {
      session,
      request_service,
      realtime: RealtimeClient::new(backend),
      address_search: Arc::new(AddressSearch::new(Arc::new(geocoder))),
      position: Arc::new(FixedPosition::hat_yai()),
      volunteers: Arc::new(volunteers),
      realtime_channel: config.realtime_channel.clone(),
      auth_redirect_url: config.auth_redirect_url.clone(),
    })
  }

  pub fn with_position(mut self, position: Arc<dyn PositionSource>) -> Self {
    self.position = position;
    self
  }
}

impl AppState for SharedAppState {
  async fn refresh_board(&self) -> Result<Vec<Request>, AppError> {
    Ok(self.request_service.load_all().await?)
  }

  async fn submit_request(&self, draft: RequestDraft) -> Result<Submitted, AppError> {
    Ok(self.request_service.create(draft).await?)
  }

  async fn change_status(&self, id: &str, status: RequestStatus) -> Result<PendingWrite, AppError> {
    Ok(self.request_service.change_status(id, status).await?)
  }

  async fn request_sign_in(&self, email: &str) -> Result<(), AppError> {
    Ok(
      self
        .session
        .request_sign_in(email, self.auth_redirect_url.as_deref())
        .await?,
    )
  }

  async fn verify_code(&self, email: &str, code: &str) -> Result<User, AppError> {
    Ok(self.session.verify_code(email, code).await?)
  }

  async fn sign_out(&self) -> Result<(), AppError> {
    Ok(self.session.sign_out().await?)
  }

  async fn locate_me(&self) -> Result<Location, AppError> {
    Ok(locate(self.position.as_ref(), &PositionOptions::default()).await?)
  }
}
