//! Concrete implementations of the [`Stage`](crate::engine::Stage) trait, in
//! the order the orchestrator runs them.

pub mod pattern_normalizer;
pub mod validation_suppressor;
pub mod submit_override;
pub mod postcode_hints;

pub use pattern_normalizer::PatternNormalizer;
pub use postcode_hints::PostcodeHints;
pub use submit_override::SubmitOverrideMachine;
pub use validation_suppressor::ValidationSuppressor;
