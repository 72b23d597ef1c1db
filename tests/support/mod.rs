#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
  extract::{Query, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub const ANON_KEY: &str = "anon-key";
pub const ACCESS_TOKEN: &str = "user-access-token";
pub const OTP_CODE: &str = "123456";
/// Signs in with a session that has already expired.
pub const EXPIRED_OTP_CODE: &str = "654321";
/// Like `EXPIRED_OTP_CODE`, but the refresh token is revoked too.
pub const REVOKED_OTP_CODE: &str = "111111";
pub const REFRESHED_TOKEN: &str = "user-refreshed-token";
const VALID_REFRESH_TOKEN: &str = "refresh-1";

/// In-memory stand-in for the hosted backend and the geocoding service.
#[derive(Default)]
pub struct FakeServices {
  pub rows: Mutex<Vec<Value>>,
  pub write_error: Mutex<Option<String>>,
  pub read_error: Mutex<Option<String>>,
  pub bearers: Mutex<Vec<String>>,
  pub api_keys: Mutex<Vec<String>>,
  pub otp_requests: Mutex<Vec<(String, Option<String>)>>,
  pub logouts: Mutex<usize>,
  pub refreshes: Mutex<Vec<String>>,
  pub searches: Mutex<Vec<HashMap<String, String>>>,
  pub user_agents: Mutex<Vec<String>>,
  next_id: Mutex<usize>,
}

impl FakeServices {
  pub fn seed(&self, id: &str, status: &str, minutes_ago: i64) {
    let created_at: DateTime<Utc> = Utc::now() - Duration::minutes(minutes_ago);
    self.rows.lock().push(json!({
      "id": id,
      "type": "food",
      "urgency": "normal",
      "description": format!("request {}", id),
      "lat": 7.0086,
      "lng": 100.4767,
      "address": "Hat Yai",
      "contact_phone": "0891234567",
      "contact_line_id": null,
      "contact_whatsapp": null,
      "status": status,
      "created_at": created_at.to_rfc3339(),
      "user_id": "user-0",
    }));
  }

  pub fn row(&self, id: &str) -> Option<Value> {
    self.rows.lock().iter().find(|r| r["id"] == id).cloned()
  }

  fn record_auth(&self, headers: &HeaderMap) {
    if let Some(key) = headers.get("apikey").and_then(|v| v.to_str().ok()) {
      self.api_keys.lock().push(key.to_string());
    }
    if let Some(bearer) = headers
      .get("authorization")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "))
    {
      self.bearers.lock().push(bearer.to_string());
    }
  }
}

pub async fn spawn_fake_services() -> (Arc<FakeServices>, SocketAddr) {
  let services = Arc::new(FakeServices::default());
  let app = Router::new()
    .route(
      "/rest/v1/requests",
      get(list_requests).post(insert_request).patch(update_request),
    )
    .route("/auth/v1/otp", post(request_otp))
    .route("/auth/v1/verify", post(verify_otp))
    .route("/auth/v1/logout", post(logout))
    .route("/auth/v1/token", post(refresh_token))
    .route("/search", get(search))
    .with_state(services.clone());

  let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
    .await
    .expect("bind fake services");
  let addr = listener.local_addr().expect("local addr");
  tokio::spawn(async move { axum::serve(listener, app).await.expect("serve fake services") });

  (services, addr)
}

fn api_error(status: StatusCode, message: &str) -> Response {
  (status, Json(json!({ "message": message, "code": "PGRST000", "details": null, "hint": null }))).into_response()
}

async fn list_requests(State(services): State<Arc<FakeServices>>, headers: HeaderMap) -> Response {
  services.record_auth(&headers);
  if let Some(message) = services.read_error.lock().clone() {
    return api_error(StatusCode::SERVICE_UNAVAILABLE, &message);
  }

  let mut rows = services.rows.lock().clone();
  rows.sort_by_key(|r| {
    std::cmp::Reverse(
      r["created_at"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)),
    )
  });
  Json(rows).into_response()
}

async fn insert_request(
  State(services): State<Arc<FakeServices>>,
  headers: HeaderMap,
  Json(mut row): Json<Value>,
) -> Response {
  services.record_auth(&headers);
  if let Some(message) = services.write_error.lock().clone() {
    return api_error(StatusCode::FORBIDDEN, &message);
  }

  let id = {
    let mut next = services.next_id.lock();
    *next += 1;
    format!("srv-{}", *next)
  };
  row["id"] = json!(id);
  row["created_at"] = json!(Utc::now().to_rfc3339());
  services.rows.lock().push(row.clone());

  let echo = headers
    .get("prefer")
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.contains("return=representation"));
  if echo {
    (StatusCode::CREATED, Json(json!([row]))).into_response()
  } else {
    StatusCode::CREATED.into_response()
  }
}

async fn update_request(
  State(services): State<Arc<FakeServices>>,
  headers: HeaderMap,
  Query(params): Query<HashMap<String, String>>,
  Json(patch): Json<Value>,
) -> Response {
  services.record_auth(&headers);
  if let Some(message) = services.write_error.lock().clone() {
    return api_error(StatusCode::FORBIDDEN, &message);
  }

  let Some(id) = params.get("id").and_then(|f| f.strip_prefix("eq.")) else {
    return api_error(StatusCode::BAD_REQUEST, "missing id filter");
  };
  if let Some(row) = services.rows.lock().iter_mut().find(|r| r["id"] == id) {
    row["status"] = patch["status"].clone();
  }
  StatusCode::NO_CONTENT.into_response()
}

async fn request_otp(
  State(services): State<Arc<FakeServices>>,
  Query(params): Query<HashMap<String, String>>,
  Json(body): Json<Value>,
) -> Response {
  let email = body["email"].as_str().unwrap_or_default().to_string();
  services.otp_requests.lock().push((email, params.get("redirect_to").cloned()));
  Json(json!({})).into_response()
}

fn session_json(access_token: &str, expires_at: i64, refresh_token: &str, email: &Value) -> Response {
  Json(json!({
    "access_token": access_token,
    "token_type": "bearer",
    "expires_in": 3600,
    "expires_at": expires_at,
    "refresh_token": refresh_token,
    "user": { "id": "user-42", "email": email, "aud": "authenticated" }
  }))
  .into_response()
}

async fn verify_otp(Json(body): Json<Value>) -> Response {
  let an_hour_ago = (Utc::now() - Duration::hours(1)).timestamp();
  let in_an_hour = (Utc::now() + Duration::hours(1)).timestamp();
  match (body["type"].as_str(), body["token"].as_str()) {
    (Some("email"), Some(OTP_CODE)) => session_json(ACCESS_TOKEN, in_an_hour, VALID_REFRESH_TOKEN, &body["email"]),
    (Some("email"), Some(EXPIRED_OTP_CODE)) => {
      session_json(ACCESS_TOKEN, an_hour_ago, VALID_REFRESH_TOKEN, &body["email"])
    }
    (Some("email"), Some(REVOKED_OTP_CODE)) => session_json(ACCESS_TOKEN, an_hour_ago, "revoked", &body["email"]),
    _ => (
      StatusCode::FORBIDDEN,
      Json(json!({ "code": 403, "error_code": "otp_expired", "msg": "Token has expired or is invalid" })),
    )
      .into_response(),
  }
}

async fn refresh_token(
  State(services): State<Arc<FakeServices>>,
  Query(params): Query<HashMap<String, String>>,
  Json(body): Json<Value>,
) -> Response {
  let token = body["refresh_token"].as_str().unwrap_or_default().to_string();
  services.refreshes.lock().push(token.clone());

  if params.get("grant_type").map(String::as_str) != Some("refresh_token") || token != VALID_REFRESH_TOKEN {
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": "invalid_grant", "error_description": "Invalid Refresh Token: Refresh Token Not Found" })),
    )
      .into_response();
  }

  let in_an_hour = (Utc::now() + Duration::hours(1)).timestamp();
  session_json(REFRESHED_TOKEN, in_an_hour, "refresh-2", &json!("helper@example.com"))
}

async fn logout(State(services): State<Arc<FakeServices>>, headers: HeaderMap) -> Response {
  services.record_auth(&headers);
  *services.logouts.lock() += 1;
  StatusCode::NO_CONTENT.into_response()
}

async fn search(
  State(services): State<Arc<FakeServices>>,
  headers: HeaderMap,
  Query(params): Query<HashMap<String, String>>,
) -> Response {
  if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
    services.user_agents.lock().push(agent.to_string());
  }
  let query = params.get("q").cloned().unwrap_or_default();
  services.searches.lock().push(params);

  if query == "boom" {
    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
  }

  Json(json!([
    { "place_id": 1, "lat": "7.0005", "lon": "100.4660", "display_name": "Hat Yai Station, Rotfai Road, Hat Yai, Songkhla" },
    { "place_id": 2, "lat": "7.0086", "lon": "100.4767", "display_name": "Hat Yai, Songkhla, Thailand" },
    { "place_id": 3, "lat": "broken", "lon": "100.0", "display_name": "Broken Place" }
  ]))
  .into_response()
}
