pub mod model;
pub mod provider;
pub mod service;
