pub mod directory;
pub mod model;
