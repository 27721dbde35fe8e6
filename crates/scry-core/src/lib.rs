//! Core infrastructure for scry.
//!
//! This crate provides language-agnostic building blocks:
//! - Source positions (1-indexed lines, 0-indexed columns)
//! - Content hashing for cache keys
//! - Text utilities for line-oriented source handling

pub mod hash;
pub mod pos;
pub mod text;

pub use hash::ContentHash;
pub use pos::Pos;
