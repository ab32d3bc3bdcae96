//! Post queue domain - models and queries for scheduled posts

pub mod models;
pub mod queries;
