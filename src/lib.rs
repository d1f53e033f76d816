//! Session and inventory reconciliation for claiming game items.
//!
//! A [`ClaimEngine`] coordinates three independently mutable sources of truth: the
//! connected wallet account, the off-chain provisioning backend, and the on-chain ledger.
//! It sequences the two-phase mint (provision, then confirm), keeps a local inventory
//! snapshot reconciled against both remote sides, and feeds the
//! [`binder`] projection that drives item controls.

use std::sync::{
    Mutex,
    MutexGuard,
    PoisonError,
};

pub mod binder;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod metadata;
pub mod mint;
pub mod reconcile;
pub mod session;
pub mod types;

pub mod test_helpers;

pub use engine::{
    ClaimEngine,
    EngineSnapshot,
};
pub use error::{
    Error,
    Result,
};

/// Engine state stays usable after a panic elsewhere; every critical section leaves it
/// consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
