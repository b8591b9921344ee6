//! Request and response bodies for the HTTP API.

pub mod admin;
pub mod script;
pub mod task;
