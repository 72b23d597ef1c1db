use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domains::request::model::Location;

pub const MIN_QUERY_CHARS: usize = 3;
pub const RESULT_LIMIT: usize = 5;
pub const DEBOUNCE: Duration = Duration::from_millis(800);

/// One address suggestion.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Candidate {
  pub lat: f64,
  pub lng: f64,
  pub label: String,
}

impl Candidate {
  /// First comma-separated part of the label, used as the request address.
  pub fn short_label(&self) -> &str {
    self.label.split(',').next().unwrap_or_default().trim()
  }

  pub fn to_location(&self) -> Location {
    Location::new(self.lat, self.lng).with_address(self.short_label())
  }
}

/// Search result as the geocoding service returns it; coordinates are text.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimPlace {
  pub lat: String,
  pub lon: String,
  pub display_name: String,
}

impl NominatimPlace {
  pub fn into_candidate(self) -> Option<Candidate> {
    let lat = self.lat.trim().parse::<f64>().ok()?;
    let lng = self.lon.trim().parse::<f64>().ok()?;
    Some(Candidate {
      lat,
      lng,
      label: self.display_name,
    })
  }
}

pub fn is_searchable(query: &str) -> bool {
  query.trim().chars().count() >= MIN_QUERY_CHARS
}
