//! Boundaries to the systems the engine coordinates but does not own.
//!
//! The engine only ever talks to a [`Wallet`], a [`Backend`] and a [`Ledger`]. Wire formats,
//! endpoints and signing stay behind these traits.

pub mod backend;
pub mod http_backend;
pub mod in_memory;
pub mod ledger;
pub mod wallet;

pub use backend::{
    Backend,
    Provisioned,
};
pub use ledger::Ledger;
pub use wallet::{
    AccountChanges,
    Wallet,
};
