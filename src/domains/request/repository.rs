use async_trait::async_trait;

use super::model::{NewRequestRow, RequestRow, RequestStatus, StatusUpdate};
use crate::backend::{BackendClient, BackendError};

pub const REQUESTS_TABLE: &str = "requests";

#[async_trait]
pub trait RequestRepository: Send + Sync {
  /// Every row, newest `created_at` first.
  async fn find_all(&self) -> Result<Vec<RequestRow>, BackendError>;
  /// Inserts and returns the stored row when the backend echoes it back.
  async fn create(&self, row: &NewRequestRow) -> Result<Option<RequestRow>, BackendError>;
  async fn update_status(&self, id: &str, status: RequestStatus) -> Result<(), BackendError>;
}

pub struct PostgrestRequestRepository {
  backend: BackendClient,
  table: String,
}

impl PostgrestRequestRepository {
  pub fn new(backend: BackendClient) -> Self {
    Self {
      backend,
      table: REQUESTS_TABLE.to_string(),
    }
  }

  fn table_url(&self) -> Result<url::Url, BackendError> {
    self.backend.endpoint(&format!("rest/v1/{}", self.table))
  }
}

#[async_trait]
impl RequestRepository for PostgrestRequestRepository {
  async fn find_all(&self) -> Result<Vec<RequestRow>, BackendError> {
    let req = self
      .backend
      .http()
      .get(self.table_url()?)
      .query(&[("select", "*"), ("order", "created_at.desc")]);

    let resp = BackendClient::check(self.backend.authorize(req).send().await?).await?;
    let rows = resp.json::<Vec<RequestRow>>().await?;

    Ok(rows)
  }

  async fn create(&self, row: &NewRequestRow) -> Result<Option<RequestRow>, BackendError> {
    let req = self
      .backend
      .http()
      .post(self.table_url()?)
      .header("Prefer", "return=representation")
      .json(row);

    let resp = BackendClient::check(self.backend.authorize(req).send().await?).await?;
    let mut rows = resp.json::<Vec<RequestRow>>().await?;

    Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
  }

  async fn update_status(&self, id: &str, status: RequestStatus) -> Result<(), BackendError> {
    let filter = format!("eq.{}", id);
    let req = self
      .backend
      .http()
      .patch(self.table_url()?)
      .query(&[("id", filter.as_str())])
      .json(&StatusUpdate { status });

    BackendClient::check(self.backend.authorize(req).send().await?).await?;

    Ok(())
  }
}
