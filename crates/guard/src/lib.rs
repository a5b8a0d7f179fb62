//! USB data-transfer guard
//!
//! Gates data transfer over USB behind a password challenge. Devices the user
//! chose to remember are kept in a whitelist and are allowed without a prompt.
//!
//! - [`control`]: backends that actually block or allow data transfer
//! - [`whitelist`]: persisted list of remembered devices
//! - [`auth`]: password rules and the per-attach challenge
//! - [`service`]: [`UsbGuard`], tying the pieces together on attach events
//! - [`audit`]: JSON-lines security audit log

pub mod audit;
pub mod auth;
pub mod config;
pub mod control;
pub mod service;
pub mod whitelist;

pub use auth::{AuthOutcome, PendingAuth};
pub use config::GuardConfig;
pub use control::{DataTransferControl, TransferAction, TransferController, TransferState};
pub use service::{AttachOutcome, UsbGuard};
pub use whitelist::{Whitelist, WhitelistedDevice};
