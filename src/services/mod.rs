// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod audit;
pub mod identity;
pub mod ledger;
pub mod proxy;
pub mod revocation;
pub mod signature;
pub mod sweeper;

pub use audit::AuditRecorder;
pub use identity::{IdentityCipher, IdentityError};
pub use ledger::AuthorizationLedger;
pub use proxy::{InboundCall, ProxyIdentity, ProxyRouter};
pub use revocation::{build_revocation_store, RevocationError, RevocationStore};
pub use signature::HeaderSigner;
