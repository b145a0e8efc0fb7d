//! Request handlers, grouped by resource.

pub mod healthcheck;
pub mod movies;
pub mod tokens;
pub mod users;
