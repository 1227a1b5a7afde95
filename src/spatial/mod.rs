//! Spatial lookup of claims by block coordinate

pub mod index;

pub use index::SpatialIndex;
