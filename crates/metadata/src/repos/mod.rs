//! Repository traits for cache operations.

pub mod entries;

pub use entries::EntryRepo;
