//! Admission control: the leaky bucket meter and the strategy seam around it.

mod bucket;
mod strategy;

pub use bucket::Meter;
pub use strategy::{build_strategy, Admission, AdmissionStrategy};
