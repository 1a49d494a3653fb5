//! Kernel services.
//!
//! Request handlers stay thin; the logic behind revalidation and the
//! contact form lives here.

pub mod contact;
pub mod email;
pub mod revalidate;
pub mod signature;
