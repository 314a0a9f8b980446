// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod audit;
pub mod authorization;
pub mod service;

pub use audit::ProxyAuditRecord;
pub use authorization::{Authorization, AuthorizationView, ClientContext, RevokedBy};
pub use service::ServiceDescriptor;
