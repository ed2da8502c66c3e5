//! Spotline Storage Layer
//!
//! Durable state for the validation engine: claims, votes, validator state
//! and the append-only ledger. Two backends share the `ValidationStore`
//! contract:
//! - `SledStore`: on-disk, one sled tree per record type
//! - `MemoryStore`: DashMap-backed, for tests and throwaway runs

pub mod error;
pub mod memory;
pub mod sled_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::{LedgerInsert, ResolutionCommit, ResolutionStatus, ValidationStore, VoteCommit};
