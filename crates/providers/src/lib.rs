//! Model routing for Wayfinder.
//!
//! Backends implement `wayfinder_core::Provider`. The [`ModelRouter`] holds an
//! ordered chain of [`ModelDescriptor`]s per purpose and fails over between
//! them on rate-limit and availability signals.

pub mod descriptor;
pub mod router;

pub use descriptor::ModelDescriptor;
pub use router::{DescriptorStatus, ModelRouter, RouterStatus};
