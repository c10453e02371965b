//! Directory-backed image store with TTL sweeping
//!
//! Each stored image lives in its own single-entry ZIP archive named after a
//! random alphanumeric identifier. A background sweeper deletes archives whose
//! modification time falls outside the retention window.

pub mod archive;
pub mod error;
pub mod ident;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod validate;

pub use archive::{pack, unpack, UnpackedEntry};
pub use error::{ArchiveError, Result, StoreError};
pub use ident::{generate, is_valid_identifier, ID_LENGTH};
pub use store::{mime_for_extension, BlobStore};
pub use sweeper::{spawn_sweeper, sweep_once, SweepConfig, SweeperHandle};
pub use types::{BlobListing, StoreStats, StoredImage, SweepReport};
pub use validate::{validate, ImageCheck};
