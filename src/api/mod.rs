pub mod gbif;
pub mod models;

pub use gbif::{DatasetSource, GbifClient};
pub use models::{Contact, DatasetHit, DatasetRecord};
