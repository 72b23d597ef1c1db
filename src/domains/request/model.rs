use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const TEMP_ID_PREFIX: &str = "temp-";
pub const ADDRESS_PLACEHOLDER: &str = "Approximated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpType {
  Water,
  Food,
  Medicine,
  Shelter,
  Transport,
  Rescue,
  Power,
}

impl HelpType {
  pub const ALL: [HelpType; 7] = [
    HelpType::Water,
    HelpType::Food,
    HelpType::Medicine,
    HelpType::Shelter,
    HelpType::Transport,
    HelpType::Rescue,
    HelpType::Power,
  ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
  #[default]
  Normal,
  Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
  #[default]
  Open,
  InProgress,
  Resolved,
  /// Set by time-based expiry outside this crate; nothing here produces it.
  Expired,
}

impl RequestStatus {
  /// Status changes a helper may pick for a request in this status.
  pub fn available_actions(self) -> &'static [RequestStatus] {
    match self {
      RequestStatus::Open => &[RequestStatus::InProgress, RequestStatus::Resolved],
      RequestStatus::InProgress | RequestStatus::Expired => &[RequestStatus::Resolved],
      RequestStatus::Resolved => &[],
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RequestStatus::Open => "open",
      RequestStatus::InProgress => "in_progress",
      RequestStatus::Resolved => "resolved",
      RequestStatus::Expired => "expired",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct Location {
  #[validate(range(min = -90.0, max = 90.0, message = "latitude must be between -90 and 90"))]
  pub lat: f64,
  #[validate(range(min = -180.0, max = 180.0, message = "longitude must be between -180 and 180"))]
  pub lng: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
}

impl Location {
  pub fn new(lat: f64, lng: f64) -> Self {
    Self { lat, lng, address: None }
  }

  pub fn with_address(mut self, address: impl Into<String>) -> Self {
    self.address = Some(address.into());
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContactInfo {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(rename = "lineId", default, skip_serializing_if = "Option::is_none")]
  pub line_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub whatsapp: Option<String>,
}

impl ContactInfo {
  pub fn phone(phone: impl Into<String>) -> Self {
    Self {
      phone: Some(phone.into()),
      ..Default::default()
    }
  }

  /// `tel:` link for calling the requester, spaces and dashes stripped.
  pub fn call_link(&self) -> Option<String> {
    let phone = self.phone.as_deref()?;
    let digits: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if digits.is_empty() {
      None
    } else {
      Some(format!("tel:{}", digits))
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
  pub id: String,
  pub created_at: DateTime<Utc>,
  #[serde(rename = "type")]
  pub help_type: HelpType,
  pub urgency: Urgency,
  pub description: String,
  pub location: Location,
  pub contact: ContactInfo,
  pub status: RequestStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
}

impl Request {
  pub fn is_temporary(&self) -> bool {
    is_temporary_id(&self.id)
  }
}

pub fn is_temporary_id(id: &str) -> bool {
  id.starts_with(TEMP_ID_PREFIX)
}

/// A request row exactly as the backend stores it: flat, one column per
/// field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RequestRow {
  pub id: String,
  #[serde(rename = "type")]
  pub help_type: HelpType,
  pub urgency: Urgency,
  pub description: String,
  pub lat: f64,
  pub lng: f64,
  pub address: Option<String>,
  pub contact_phone: Option<String>,
  pub contact_line_id: Option<String>,
  pub contact_whatsapp: Option<String>,
  pub status: RequestStatus,
  pub created_at: DateTime<Utc>,
  pub user_id: Option<String>,
}

impl From<RequestRow> for Request {
  fn from(row: RequestRow) -> Self {
    Self {
      id: row.id,
      created_at: row.created_at,
      help_type: row.help_type,
      urgency: row.urgency,
      description: row.description,
      location: Location {
        lat: row.lat,
        lng: row.lng,
        address: row.address,
      },
      contact: ContactInfo {
        phone: row.contact_phone,
        line_id: row.contact_line_id,
        whatsapp: row.contact_whatsapp,
      },
      status: row.status,
      user_id: row.user_id,
    }
  }
}

impl From<Request> for RequestRow {
  fn from(req: Request) -> Self {
    Self {
      id: req.id,
      help_type: req.help_type,
      urgency: req.urgency,
      description: req.description,
      lat: req.location.lat,
      lng: req.location.lng,
      address: req.location.address,
      contact_phone: req.contact.phone,
      contact_line_id: req.contact.line_id,
      contact_whatsapp: req.contact.whatsapp,
      status: req.status,
      created_at: req.created_at,
      user_id: req.user_id,
    }
  }
}

/// Insert payload; `id` and `created_at` are assigned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRequestRow {
  #[serde(rename = "type")]
  pub help_type: HelpType,
  pub urgency: Urgency,
  pub description: String,
  pub lat: f64,
  pub lng: f64,
  pub address: Option<String>,
  pub contact_phone: Option<String>,
  pub contact_line_id: Option<String>,
  pub contact_whatsapp: Option<String>,
  pub status: RequestStatus,
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
  pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct RequestDraft {
  #[serde(rename = "type")]
  pub help_type: HelpType,
  #[serde(default)]
  pub urgency: Urgency,
  #[validate(length(min = 1, message = "description is required"))]
  pub description: String,
  #[validate(nested)]
  pub location: Option<Location>,
  #[serde(default)]
  pub contact: ContactInfo,
}

impl RequestDraft {
  /// Optimistic projection of the draft, shown until the backend confirms.
  pub fn to_temporary(&self, location: Location, user_id: &str, now: DateTime<Utc>) -> Request {
    Request {
      id: format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()),
      created_at: now,
      help_type: self.help_type,
      urgency: self.urgency,
      description: self.description.clone(),
      location,
      contact: self.contact.clone(),
      status: RequestStatus::Open,
      user_id: Some(user_id.to_string()),
    }
  }

  pub fn to_new_row(&self, location: &Location, user_id: &str) -> NewRequestRow {
    NewRequestRow {
      help_type: self.help_type,
      urgency: self.urgency,
      description: self.description.clone(),
      lat: location.lat,
      lng: location.lng,
      address: location.address.clone(),
      contact_phone: self.contact.phone.clone(),
      contact_line_id: self.contact.line_id.clone(),
      contact_whatsapp: self.contact.whatsapp.clone(),
      status: RequestStatus::Open,
      user_id: Some(user_id.to_string()),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
  pub help_type: Option<HelpType>,
  pub urgency: Option<Urgency>,
}

impl RequestFilter {
  pub fn matches(&self, req: &Request) -> bool {
    self.help_type.map_or(true, |t| t == req.help_type) && self.urgency.map_or(true, |u| u == req.urgency)
  }

  pub fn apply<'a>(&self, requests: &'a [Request]) -> Vec<&'a Request> {
    requests.iter().filter(|req| self.matches(req)).collect()
  }
}

/// Newest first; ties keep their incoming order.
pub fn sort_newest_first(requests: &mut [Request]) {
  requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
