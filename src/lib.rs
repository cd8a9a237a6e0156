pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod models;
pub mod registry;
pub mod routes;
pub mod services;
pub mod state;
pub mod ws;

pub use error::{ErrorKind, ModerationError};
pub use state::AppState;
