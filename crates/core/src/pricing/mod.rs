pub mod engine;
pub mod ratio;

pub use engine::{apply_to_payload, effective_ratio};
pub use ratio::{clamp_ratio, round_currency, to_base_price, to_customer_price, ClampedRatio};
