pub mod app;
pub mod backend;
pub mod config;
pub mod domains;
pub mod error;
pub mod middleware;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use utils::error::AppError;
