//! Patch cache for the active Radicle project.
//!
//! The store fetches through any [`patchsync_connection::Connection`],
//! coalesces concurrent full fetches, merges single-patch refreshes by id and
//! publishes [`StoreEvent`]s so presentation code can re-render instead of
//! polling.

pub mod checkout;
pub mod events;
pub mod handle;
pub mod store;

pub use checkout::checked_out_patch_id;
pub use events::{
    SharedStoreObserver, StoreEvent, StoreEventReceiver, StoreEventSender, StoreObserver,
    store_event_channel,
};
pub use handle::PatchHandle;
pub use store::PatchStore;
