//! HTTP gateways for the RapidDeals carrier API and the Loadsure cargo
//! insurance API, plus the shared bounded-retry policy.

pub mod loadsure;
pub mod rapiddeals;
pub mod retry;

pub use loadsure::LoadsureClient;
pub use rapiddeals::RapidDealsClient;
pub use retry::{with_retries, RetryPolicy};
