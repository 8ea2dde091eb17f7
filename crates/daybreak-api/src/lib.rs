pub mod alarms;
pub mod auth;
pub mod error;
pub mod middleware;
