//! Built spin models and the model cache.
//!
//! Models are immutable once built so that interpolation code can stay
//! lock-free and share them freely.

pub mod cache;
pub mod spin_model;

pub use cache::*;
pub use spin_model::*;
