use regex::Regex;
use validator::ValidationError;

pub mod error;
pub mod geo;
pub mod jwt;

/// Checks a one-time sign-in code typed by the user.
pub fn validate_otp_code(code: &str) -> Result<(), ValidationError> {
  let code_regex = Regex::new(r"^\d{6}$").unwrap();

  if !code_regex.is_match(code) {
    return Err(ValidationError::new("otp_code").with_message("the code must be exactly 6 digits".into()));
  }

  Ok(())
}

/// Checks a contact phone number before it is turned into a call link.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
  let phone_regex = Regex::new(r"^\+?[0-9][0-9\s\-]{5,}$").unwrap();

  if !phone_regex.is_match(phone.trim()) {
    return Err(ValidationError::new("phone").with_message("phone number contains invalid characters".into()));
  }

  Ok(())
}
