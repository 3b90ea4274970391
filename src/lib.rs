//! Leaky Gate - HTTP admission control with a leaky bucket meter
//!
//! Every inbound request is checked against a shared bucket. Requests are
//! admitted while the bucket has room and rejected with `429 Too Many Requests`
//! once it is full; a background task drains one unit per leak interval.

pub mod config;
pub mod error;
pub mod http;
pub mod meter;
