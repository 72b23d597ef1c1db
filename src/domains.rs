pub mod geocode;
pub mod request;
pub mod session;
pub mod volunteer;
