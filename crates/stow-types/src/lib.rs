//! Foundation types for Stow.
//!
//! Every other Stow crate depends on `stow-types`. Keys are opaque strings
//! compared ordinally (byte-wise), which for UTF-8 is the same as code point
//! order.
//!
//! # Key Types
//!
//! - [`Keyed`] / [`Entity`]: capability contract for stored values
//! - [`Timestamp`]: logical timestamp produced by a logical clock
//! - [`Delta`] / [`DeltaAction`]: one observed mutation and its merge rule
//! - [`key`]: prefix-to-range translation and successor helpers

pub mod delta;
pub mod entity;
pub mod key;
pub mod temporal;

pub use delta::{Delta, DeltaAction};
pub use entity::{Entity, Keyed};
pub use temporal::Timestamp;
