pub mod fees;

pub use fees::{compute_fee, is_weekend_wib, FeeBreakdown, FeeRate, FeeSchedule};
