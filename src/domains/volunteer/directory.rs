use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use super::model::Volunteer;
use crate::domains::request::model::{ContactInfo, HelpType, Location, Request};

#[derive(Debug, Deserialize)]
struct DirectoryFile {
  #[serde(default)]
  volunteers: Vec<Volunteer>,
}

/// Read-only list of volunteers supplied at startup.
#[derive(Debug, Clone, Default)]
pub struct VolunteerDirectory {
  volunteers: Vec<Volunteer>,
}

impl VolunteerDirectory {
  pub fn new(volunteers: Vec<Volunteer>) -> Self {
    Self { volunteers }
  }

  /// The built-in team used when no directory file is configured.
  pub fn seed() -> Self {
    Self::new(vec![Volunteer {
      id: "v1".to_string(),
      user_id: "user_v1".to_string(),
      name: "Rescue Team A".to_string(),
      help_types: vec![HelpType::Rescue, HelpType::Transport, HelpType::Food],
      location: Location::new(7.008, 100.470),
      service_radius_km: 5.0,
      contact: ContactInfo::phone("089-999-9999"),
      is_available: true,
    }])
  }

  pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
    let file: DirectoryFile = toml::from_str(raw).context("invalid volunteer directory")?;
    Ok(Self::new(file.volunteers))
  }

  pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let directory = Self::from_toml_str(&raw).with_context(|| format!("failed to load {}", path.display()))?;

    tracing::info!(count = directory.len(), path = %path.display(), "volunteer directory loaded");
    Ok(directory)
  }

  pub fn all(&self) -> &[Volunteer] {
    &self.volunteers
  }

  pub fn len(&self) -> usize {
    self.volunteers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.volunteers.is_empty()
  }

  /// Volunteers able to take the request, nearest first.
  pub fn available_for(&self, req: &Request) -> Vec<&Volunteer> {
    let mut matches: Vec<&Volunteer> = self.volunteers.iter().filter(|v| v.can_serve(req)).collect();
    matches.sort_by(|a, b| a.distance_km(&req.location).total_cmp(&b.distance_km(&req.location)));
    matches
  }
}
