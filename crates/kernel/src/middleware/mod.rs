//! HTTP middleware components.
//!
//! Provides locale negotiation and submission rate limiting.

pub mod locale;
pub mod rate_limit;

pub use locale::{LOCALE_HEADER, LocaleRouting, ResolvedLocale, URL_HEADER, negotiate_locale};
pub use rate_limit::{RedisLimiter, SlidingWindowLimiter, SubmissionLimiter, get_client_id};
