pub mod commands;
pub mod config;
pub mod error;
pub mod services;
pub mod session;
pub mod viewport;

pub use error::RouteError;

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;
