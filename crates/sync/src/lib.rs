//! Album reconciliation engine for picsync.
//!
//! - `api`: capability traits for source and destination services
//! - `catalog`: cached source listing and destination album lookup
//! - `publish`: applying a work list and republishing the presentation
//! - `pipeline`: one album pair end to end
//! - `runloop`: once or on an interval over all pairs

pub mod api;
pub mod catalog;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod runloop;

pub use api::{
    ByteStream, DestinationAlbum, DestinationApi, Download, Presentation, RemoteItem, SourceApi,
    SourcePage, UploadRequest,
};
pub use catalog::{CacheOutcome, CatalogEvent, DestinationCatalog, SourceCatalog};
pub use error::{SyncError, SyncResult, TransferError};
pub use pipeline::{AlbumPair, PairOutcome, Pipeline, SourceRef};
pub use publish::{PresentationOutcome, PublishOptions, PublishReport, Publisher};
pub use runloop::{RunLoop, RunMode, RunSummary};
