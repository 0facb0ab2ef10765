//! Inspect operator index images by serving their gRPC registry from a
//! short-lived local podman or docker container.

pub mod config;
pub mod container;
pub mod error;
pub mod registry;

pub use error::{Conflict, Error, Result};
