use serde::{Deserialize, Serialize};

use crate::domains::request::model::{ContactInfo, HelpType, Location, Request, RequestStatus};
use crate::utils::geo::haversine_distance;

/// Static reference data: who can help, with what, and how far they travel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Volunteer {
  pub id: String,
  pub user_id: String,
  pub name: String,
  pub help_types: Vec<HelpType>,
  pub location: Location,
  pub service_radius_km: f64,
  #[serde(default)]
  pub contact: ContactInfo,
  #[serde(default = "available")]
  pub is_available: bool,
}

fn available() -> bool {
  true
}

impl Volunteer {
  pub fn distance_km(&self, to: &Location) -> f64 {
    haversine_distance(self.location.lat, self.location.lng, to.lat, to.lng) / 1000.0
  }

  pub fn offers(&self, help_type: HelpType) -> bool {
    self.help_types.contains(&help_type)
  }

  /// Available, offers the requested help, within radius, and the request
  /// still needs someone.
  pub fn can_serve(&self, req: &Request) -> bool {
    self.is_available
      && matches!(req.status, RequestStatus::Open | RequestStatus::InProgress)
      && self.offers(req.help_type)
      && self.distance_km(&req.location) <= self.service_radius_km
  }
}
