pub mod admin;
pub mod auth;
pub mod device;
pub mod error;
pub mod health;
