// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Authorizations (active slots and revoked archive)
//! - Proxy audit records (with retention purge)
//! - Service registry lookups

use crate::db::{collections, AuditStore, AuthorizationStore, ServiceDirectory};
use crate::error::AppError;
use crate::models::authorization::active_slot_id;
use crate::models::service::hash_api_key;
use crate::models::{Authorization, ProxyAuditRecord, ServiceDescriptor};
use async_trait::async_trait;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// Write a service registry entry. Registration itself is managed
    /// outside the hub; this is for seeding and tests.
    pub async fn insert_service(&self, service: &ServiceDescriptor) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::SERVICES)
            .document_id(&service.id)
            .object(service)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = &self.client;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

// ─── Authorization Operations ────────────────────────────────

#[async_trait]
impl AuthorizationStore for FirestoreDb {
    async fn find_active(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<Authorization>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::AUTHORIZATIONS)
            .obj()
            .one(&active_slot_id(user_id, service_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn save_active(&self, auth: &Authorization) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::AUTHORIZATIONS)
            .document_id(auth.slot_id())
            .object(auth)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Uses a transaction so the archive write and the slot delete land
    /// together; a crash in between never leaves a grant both active and
    /// revoked.
    async fn archive_revoked(&self, auth: &Authorization) -> Result<(), AppError> {
        let client = &self.client;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::REVOKED_AUTHORIZATIONS)
            .document_id(&auth.id)
            .object(auth)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add archive to transaction: {}", e))
            })?;

        client
            .fluent()
            .delete()
            .from(collections::AUTHORIZATIONS)
            .document_id(auth.slot_id())
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add slot delete to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::AUTHORIZATIONS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_active_expired(&self, now: &str) -> Result<Vec<Authorization>, AppError> {
        let now = now.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::AUTHORIZATIONS)
            .filter(move |q| q.for_all([q.field("expires_at").less_than(now.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn touch_last_used(
        &self,
        user_id: &str,
        service_id: &str,
        at: &str,
    ) -> Result<bool, AppError> {
        let Some(mut auth) = self.find_active(user_id, service_id).await? else {
            return Ok(false);
        };

        auth.last_used_at = Some(at.to_string());
        auth.updated_at = at.to_string();
        self.save_active(&auth).await?;
        Ok(true)
    }

    async fn list_revoked_for_user(&self, user_id: &str) -> Result<Vec<Authorization>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::REVOKED_AUTHORIZATIONS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("revoked_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Audit Operations ────────────────────────────────────────

#[async_trait]
impl AuditStore for FirestoreDb {
    async fn insert_audit(&self, record: &ProxyAuditRecord) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::PROXY_REQUESTS)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn purge_audit_before(&self, cutoff: &str) -> Result<usize, AppError> {
        let cutoff = cutoff.to_string();
        let stale: Vec<ProxyAuditRecord> = self
            .client
            .fluent()
            .select()
            .from(collections::PROXY_REQUESTS)
            .filter(move |q| q.for_all([q.field("timestamp").less_than(cutoff.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let count = stale.len();
        self.batch_delete(&stale, collections::PROXY_REQUESTS, |r: &ProxyAuditRecord| {
            r.id.clone()
        })
        .await?;

        tracing::debug!(count, "Purged expired audit records");
        Ok(count)
    }
}

// ─── Service Registry ────────────────────────────────────────

#[async_trait]
impl ServiceDirectory for FirestoreDb {
    async fn find_service(
        &self,
        id_or_slug: &str,
    ) -> Result<Option<ServiceDescriptor>, AppError> {
        let by_id: Option<ServiceDescriptor> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::SERVICES)
            .obj()
            .one(id_or_slug)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if by_id.is_some() {
            return Ok(by_id);
        }

        let slug = id_or_slug.to_lowercase();
        let by_slug: Vec<ServiceDescriptor> = self
            .client
            .fluent()
            .select()
            .from(collections::SERVICES)
            .filter(move |q| q.for_all([q.field("slug").eq(slug.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(by_slug.into_iter().next())
    }

    async fn find_service_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<ServiceDescriptor>, AppError> {
        let key_hash = hash_api_key(api_key);
        let matches: Vec<ServiceDescriptor> = self
            .client
            .fluent()
            .select()
            .from(collections::SERVICES)
            .filter(move |q| {
                q.for_all([
                    q.field("api_key_hash").eq(key_hash.clone()),
                    q.field("enabled").eq(true),
                ])
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches
            .into_iter()
            .find(|service| service.api_key_matches(api_key)))
    }
}
