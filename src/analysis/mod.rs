pub mod analyzer;
pub mod finalizer;

pub use analyzer::{SignalAnalyzer, SlidingRmsAnalyzer};
pub use finalizer::DerivedMetricFinalizer;
