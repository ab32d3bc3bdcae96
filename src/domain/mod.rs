//! Domain models and queries

pub mod posts;
pub mod users;
