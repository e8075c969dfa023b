//! Stat records and relative scoring
//!
//! The calculation engine's absolute numbers are not trustworthy for complex
//! builds; the *change* it reports under a small structural edit is. This
//! crate models both halves of that bargain:
//! - [`StatSnapshot`]: a sanitized record of named numeric stats
//! - [`extrapolate`]: trusted-baseline x engine-ratio estimation
//! - [`Objective`]: the scalar being maximized, single stat or blend

pub mod key;
pub mod objective;
pub mod relative;
pub mod snapshot;

pub use key::StatKey;
pub use objective::Objective;
pub use relative::{extrapolate, RelativeEstimate};
pub use snapshot::StatSnapshot;
