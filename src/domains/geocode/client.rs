use async_trait::async_trait;
use reqwest::Client as HttpClient;
use url::Url;

use super::model::{is_searchable, Candidate, NominatimPlace, RESULT_LIMIT};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "HatYaiHelp/1.0";
pub const DEFAULT_COUNTRY: &str = "th";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
  #[error("geocoder unreachable: {0}")]
  Transport(String),
  #[error("geocoder returned status {0}")]
  Status(u16),
  #[error("unexpected geocoder response: {0}")]
  Decode(String),
  #[error("invalid geocoder url: {0}")]
  InvalidUrl(String),
  #[error("position unavailable: {0}")]
  PositionUnavailable(String),
  #[error("position request timed out")]
  Timeout,
}

impl From<reqwest::Error> for GeocodeError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      GeocodeError::Decode(err.to_string())
    } else {
      GeocodeError::Transport(err.to_string())
    }
  }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
  async fn search(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError>;
}

pub struct NominatimGeocoder {
  http: HttpClient,
  search_url: Url,
  user_agent: String,
  country: String,
}

impl NominatimGeocoder {
  pub fn new(base_url: &str, user_agent: impl Into<String>, country: impl Into<String>) -> Result<Self, GeocodeError> {
    let mut base = base_url.trim_end_matches('/').to_string();
    base.push_str("/search");
    let search_url = Url::parse(&base).map_err(|e| GeocodeError::InvalidUrl(e.to_string()))?;

    Ok(Self {
      http: HttpClient::new(),
      search_url,
      user_agent: user_agent.into(),
      country: country.into(),
    })
  }

  pub fn search_url(&self) -> &Url {
    &self.search_url
  }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
  async fn search(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
    let query = query.trim();
    if !is_searchable(query) {
      return Ok(Vec::new());
    }

    let limit = RESULT_LIMIT.to_string();
    let resp = self
      .http
      .get(self.search_url.clone())
      .header(reqwest::header::USER_AGENT, &self.user_agent)
      .query(&[
        ("q", query),
        ("format", "json"),
        ("limit", limit.as_str()),
        ("countrycodes", self.country.as_str()),
        ("addressdetails", "1"),
      ])
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(GeocodeError::Status(resp.status().as_u16()));
    }

    let places = resp.json::<Vec<NominatimPlace>>().await?;
    let candidates: Vec<Candidate> = places
      .into_iter()
      .filter_map(NominatimPlace::into_candidate)
      .take(RESULT_LIMIT)
      .collect();

    tracing::debug!(query, count = candidates.len(), "geocoder search");
    Ok(candidates)
  }
}
