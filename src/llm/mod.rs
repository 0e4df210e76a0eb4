//! Outbound LLM access: vendor adapters, the sliding-window limiter, and the
//! router that ties them to configuration.

pub mod provider;
pub mod rate_limit;
pub mod router;

pub use provider::ProviderKind;
pub use rate_limit::RateLimiter;
pub use router::{KeySource, LlmRouter};
