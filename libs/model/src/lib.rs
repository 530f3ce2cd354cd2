//! # fleet-model
//!
//! Object model for celery fleets.
//!
//! ## Objects
//!
//! - [`Fleet`]: the user-declared parent (broker, schedulers, workers, image)
//! - [`ChildRecord`]: one per broker / scheduler entry / worker entry
//! - [`Instance`]: a running execution unit owned by a child record
//! - [`Service`]: the network endpoint fronting a provisioned broker
//!
//! All objects are namespaced and carry [`ObjectMeta`]. Parent/child lookup
//! goes through [`OwnerIdentity`] and the label keys in [`labels`]; deletion
//! cascades through [`OwnerReference`]s set on every child.

mod child;
mod error;
mod fleet;
mod instance;
mod meta;
mod object;

pub use child::*;
pub use error::ModelError;
pub use fleet::*;
pub use instance::*;
pub use meta::*;
pub use object::*;
