//! Request and response types for the scoring protocol

pub mod record;
pub mod verdict;

pub use record::FeatureRecord;
pub use verdict::Verdict;
