//! Read-side views of the source and destination services.

pub mod destination;
pub mod source;

pub use destination::DestinationCatalog;
pub use source::{CacheOutcome, CatalogEvent, CatalogStream, SourceCatalog};
