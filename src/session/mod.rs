//! Durable sessions
//!
//! - [`keys`]: partition and sort key scheme
//! - [`types`]: records returned to callers and validated metadata patches
//! - [`store`]: CRUD over a [`crate::storage::KeyValueStore`]
//! - [`service`]: save/restore of a live conversation buffer

pub mod keys;
pub mod service;
pub mod store;
pub mod types;

pub use keys::{partition_key, MessageClock, METADATA_SORT_KEY};
pub use service::SessionService;
pub use store::SessionStore;
pub use types::{
    default_mutable_fields, MessageRecord, MetadataPatch, MetadataPolicy, SessionHandle,
    SessionMetadata, SessionSummary, StoredSession,
};
