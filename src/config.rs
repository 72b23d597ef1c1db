use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use url::Url;

use crate::domains::geocode::client::{DEFAULT_BASE_URL, DEFAULT_COUNTRY, DEFAULT_USER_AGENT};

pub const DEFAULT_REALTIME_CHANNEL: &str = "requests-channel";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  pub supabase_url: String,
  pub supabase_anon_key: String,
  pub geocoder_base_url: String,
  pub geocoder_user_agent: String,
  pub geocoder_country: String,
  pub realtime_channel: String,
  /// Where sign-in links send the user back to.
  pub auth_redirect_url: Option<String>,
  /// URL the app was opened with, checked for a pending sign-in callback.
  pub auth_callback_url: Option<Url>,
  pub volunteers_file: Option<PathBuf>,
}

impl AppConfig {
  pub fn new(supabase_url: impl Into<String>, supabase_anon_key: impl Into<String>) -> Self {
    Self {
      supabase_url: supabase_url.into(),
      supabase_anon_key: supabase_anon_key.into(),
      geocoder_base_url: DEFAULT_BASE_URL.to_string(),
      geocoder_user_agent: DEFAULT_USER_AGENT.to_string(),
      geocoder_country: DEFAULT_COUNTRY.to_string(),
      realtime_channel: DEFAULT_REALTIME_CHANNEL.to_string(),
      auth_redirect_url: None,
      auth_callback_url: None,
      volunteers_file: None,
    }
  }

  pub fn from_env() -> anyhow::Result<Self> {
    let supabase_url = env::var("SUPABASE_URL").context("SUPABASE_URL environment variable must be set")?;
    let supabase_anon_key =
      env::var("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY environment variable must be set")?;

    if supabase_anon_key.trim().is_empty() {
      bail!("SUPABASE_ANON_KEY must not be empty");
    }
    Url::parse(&supabase_url).with_context(|| format!("SUPABASE_URL is not a valid url: {}", supabase_url))?;

    let auth_callback_url = optional("AUTH_CALLBACK_URL")
      .map(|raw| Url::parse(&raw).with_context(|| format!("AUTH_CALLBACK_URL is not a valid url: {}", raw)))
      .transpose()?;

    Ok(Self {
      supabase_url,
      supabase_anon_key,
      geocoder_base_url: optional("GEOCODER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
      geocoder_user_agent: optional("GEOCODER_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
      geocoder_country: optional("GEOCODER_COUNTRY").unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
      realtime_channel: optional("REALTIME_CHANNEL").unwrap_or_else(|| DEFAULT_REALTIME_CHANNEL.to_string()),
      auth_redirect_url: optional("AUTH_REDIRECT_URL"),
      auth_callback_url,
      volunteers_file: optional("VOLUNTEERS_FILE").map(PathBuf::from),
    })
  }
}

fn optional(key: &str) -> Option<String> {
  env::var(key).ok().filter(|v| !v.trim().is_empty())
}
