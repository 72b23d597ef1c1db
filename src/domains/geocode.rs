pub mod client;
pub mod location;
pub mod model;
pub mod service;
