// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External service registry entries (read-only from the hub's side).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A registered external service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDescriptor {
    /// Service id (also the Firestore document id)
    pub id: String,
    /// URL-safe unique name, accepted wherever an id is
    pub slug: String,
    pub name: String,
    /// Backend base URL that proxied paths are appended to
    pub base_url: String,
    #[serde(default)]
    pub frontend_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Roles allowed through the proxy. Empty means any role.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// SHA-256 hex of the service's callback API key
    #[serde(default)]
    pub api_key_hash: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ServiceDescriptor {
    pub fn allows_role(&self, role: &str) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.iter().any(|r| r == role)
    }

    /// Constant-time check of a presented callback API key.
    pub fn api_key_matches(&self, api_key: &str) -> bool {
        match &self.api_key_hash {
            Some(expected) => bool::from(
                expected
                    .as_bytes()
                    .ct_eq(hash_api_key(api_key).as_bytes()),
            ),
            None => false,
        }
    }
}

/// SHA-256 hex of a callback API key, as stored in the registry.
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceDescriptor {
        ServiceDescriptor {
            id: "svc-masebuy".to_string(),
            slug: "masebuy".to_string(),
            name: "Masebuy".to_string(),
            base_url: "http://masebuy.internal".to_string(),
            frontend_url: None,
            enabled: true,
            allowed_roles: vec![],
            api_key_hash: Some(hash_api_key("sk_live_123")),
        }
    }

    #[test]
    fn test_allows_role() {
        let mut svc = service();
        assert!(svc.allows_role("user"));
        svc.allowed_roles = vec!["admin".to_string()];
        assert!(!svc.allows_role("user"));
        assert!(svc.allows_role("admin"));
    }

    #[test]
    fn test_api_key_matches() {
        let mut svc = service();
        assert!(svc.api_key_matches("sk_live_123"));
        assert!(!svc.api_key_matches("sk_live_124"));
        svc.api_key_hash = None;
        assert!(!svc.api_key_matches("sk_live_123"));
    }

    #[test]
    fn test_registry_document_defaults() {
        let svc: ServiceDescriptor = serde_json::from_value(serde_json::json!({
            "id": "svc-mail",
            "slug": "mail",
            "name": "Mail",
            "base_url": "http://mail.internal",
            "require_auth": false,
        }))
        .unwrap();

        assert!(svc.enabled);
        assert!(svc.allowed_roles.is_empty());
        assert!(svc.api_key_hash.is_none());
    }
}
