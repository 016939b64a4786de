//! Analysis modules.
//!
//! The aggregator is the only analysis step: records in, histograms out.

pub mod aggregator;

pub use aggregator::aggregate;
