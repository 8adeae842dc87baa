//! Route handlers for the HTTP API.

pub mod admin;
pub mod health;
pub mod streaming_helpers;
pub mod uploads;
pub mod videos;
