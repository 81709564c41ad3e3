//! Capture device discovery and selection

mod catalog;

pub use catalog::{CatalogError, Device, DeviceCatalog};
