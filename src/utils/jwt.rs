use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub sub: String,
  pub exp: usize,
  #[serde(default)]
  pub email: Option<String>,
}

/// Reads the claims of an access token issued by the auth service.
///
/// The signature is not checked: the token only ever travels back to the
/// service that signed it, and the client needs the subject and expiry for
/// display and refresh decisions.
pub fn read_claims(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
  let mut validation = Validation::default();
  validation.insecure_disable_signature_validation();
  validation.validate_exp = false;
  validation.validate_aud = false;
  validation.required_spec_claims.clear();

  let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;

  Ok(token_data.claims)
}
