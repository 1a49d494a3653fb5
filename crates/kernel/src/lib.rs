//! isBIM site kernel library
//!
//! Locale negotiation, the CMS revalidation webhook and the contact form.
//! The main entry point for running the server is the `isbim` binary.

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod time;

pub use config::Config;
pub use routes::router;
pub use state::AppState;
