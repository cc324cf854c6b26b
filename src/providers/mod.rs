//! HTTP implementations of the lookup traits in [`crate::oracles`].

mod build_info;
mod gitiles;
mod http;

pub use build_info::BuildInfoClient;
pub use gitiles::{parse_gitiles_time, GitilesClient};
pub use http::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECONDS};
