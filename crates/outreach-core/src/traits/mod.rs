//! Seams to external collaborators.

pub mod store;

pub use store::{OutreachStore, SharedStore, timed};
