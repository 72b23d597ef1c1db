use std::time::Duration;

use async_trait::async_trait;

use super::client::GeocodeError;
use crate::domains::request::model::Location;

/// Default map center and fallback position.
pub const HAT_YAI_CENTER: (f64, f64) = (7.0086, 100.4767);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
  pub high_accuracy: bool,
  pub timeout: Duration,
  /// Oldest cached fix that may be reused. Zero forces a fresh one.
  pub maximum_age: Duration,
}

impl Default for PositionOptions {
  fn default() -> Self {
    Self {
      high_accuracy: true,
      timeout: Duration::from_secs(10),
      maximum_age: Duration::ZERO,
    }
  }
}

/// Device positioning capability.
#[async_trait]
pub trait PositionSource: Send + Sync {
  async fn current_position(&self, options: &PositionOptions) -> Result<Location, GeocodeError>;
}

/// One-shot position request bounded by `options.timeout`.
pub async fn locate(source: &dyn PositionSource, options: &PositionOptions) -> Result<Location, GeocodeError> {
  match tokio::time::timeout(options.timeout, source.current_position(options)).await {
    Ok(result) => result,
    Err(_) => {
      tracing::warn!("position request timed out after {:?}", options.timeout);
      Err(GeocodeError::Timeout)
    }
  }
}

/// A position fixed at startup, for hosts without a positioning device.
#[derive(Debug, Clone)]
pub struct FixedPosition {
  location: Location,
}

impl FixedPosition {
  pub fn new(location: Location) -> Self {
    Self { location }
  }

  pub fn hat_yai() -> Self {
    let (lat, lng) = HAT_YAI_CENTER;
    Self::new(Location::new(lat, lng))
  }
}

#[async_trait]
impl PositionSource for FixedPosition {
  async fn current_position(&self, _options: &PositionOptions) -> Result<Location, GeocodeError> {
    Ok(self.location.clone())
  }
}
