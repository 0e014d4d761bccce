//! Client-side data cache with optimistic mutations

pub mod collection;
pub mod entry;
pub mod key;
pub mod polling;
pub mod resources;
pub mod store;
pub mod upload;

pub use entry::{EntryPhase, EntrySnapshot, Projector};
pub use key::CacheKey;
pub use polling::PollHandle;
pub use resources::Resources;
pub use store::{CacheSettings, MutateOptions, MutationCache, MutationHandle, Resolution};
pub use upload::{start_upload, UploadHandle, UploadProgress};
