pub mod auth;
pub mod media;
pub mod platform;
pub mod twitter;

#[cfg(test)]
pub mod mock;
