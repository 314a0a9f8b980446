// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forwarding of authenticated calls to external services.
//!
//! The hub never hands a service the user's internal id. Each forwarded
//! request carries a service-specific encrypted id plus signed trust
//! headers, and every attempt is audited whether or not it reached the
//! upstream.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{ProxyAuditRecord, ServiceDescriptor};
use crate::services::audit::AuditRecorder;
use crate::services::identity::IdentityCipher;
use crate::services::signature::{HeaderSigner, SignedIdentity};
use crate::time_utils::format_utc_rfc3339;
use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Headers that only make sense for a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Inbound credentials that must never reach a service.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "x-api-key", "cookie"];

/// Names of the injected `X-{Hub}-*` headers.
#[derive(Debug, Clone)]
pub struct HubHeaders {
    /// Lowercase `x-{hub}-` prefix, used to strip client-supplied copies
    pub prefix: String,
    pub user_id: HeaderName,
    pub user_role: HeaderName,
    pub session_id: HeaderName,
    pub service_id: HeaderName,
    pub timestamp: HeaderName,
    pub signature: HeaderName,
    /// Value of `X-Proxied-By`
    pub proxied_by: HeaderValue,
}

impl HubHeaders {
    pub fn new(hub_name: &str) -> anyhow::Result<Self> {
        let prefix = format!("x-{}-", hub_name.to_ascii_lowercase());
        let name = |suffix: &str| {
            HeaderName::from_bytes(format!("{}{}", prefix, suffix).as_bytes())
                .with_context(|| format!("invalid hub header name for hub {:?}", hub_name))
        };

        Ok(Self {
            user_id: name("user-id")?,
            user_role: name("user-role")?,
            session_id: name("session-id")?,
            service_id: name("service-id")?,
            timestamp: name("timestamp")?,
            signature: name("signature")?,
            proxied_by: HeaderValue::from_str(&format!("{}-Hub", hub_name))
                .context("invalid hub name for X-Proxied-By")?,
            prefix,
        })
    }
}

/// The inbound call, detached from axum's request type.
#[derive(Debug)]
pub struct InboundCall {
    pub method: Method,
    /// Path below the service prefix, without a leading `/`
    pub subpath: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Address of the TCP peer, when known
    pub peer_ip: Option<String>,
}

impl InboundCall {
    pub fn client_ip(&self) -> Option<String> {
        client_ip(&self.headers, self.peer_ip.as_deref())
    }

    pub fn user_agent(&self) -> Option<String> {
        user_agent(&self.headers)
    }
}

/// Originating client: first `X-Forwarded-For` hop, else the TCP peer.
pub fn client_ip(headers: &HeaderMap, peer_ip: Option<&str>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer_ip.map(str::to_string))
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Who the call is made for.
#[derive(Debug, Clone, Copy)]
pub struct ProxyIdentity<'a> {
    pub user_id: &'a str,
    pub role: &'a str,
    /// Id of the grant authorizing this call
    pub session_id: &'a str,
}

pub struct ProxyRouter {
    http: reqwest::Client,
    identity: Arc<IdentityCipher>,
    signer: HeaderSigner,
    headers: HubHeaders,
    audit: AuditRecorder,
}

impl ProxyRouter {
    pub fn new(
        config: &Config,
        identity: Arc<IdentityCipher>,
        audit: AuditRecorder,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed building proxy HTTP client")?;

        Ok(Self {
            http,
            identity,
            signer: HeaderSigner::new(&config.service_hmac_secret)?,
            headers: HubHeaders::new(&config.hub_name)?,
            audit,
        })
    }

    /// Upstream URL for a call: base URL, subpath, original query.
    pub fn target_url(service: &ServiceDescriptor, subpath: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}",
            service.base_url.trim_end_matches('/'),
            subpath.trim_start_matches('/')
        );
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Forward one call and relay whatever the service answers.
    ///
    /// An audit record is submitted for every attempt. Transport failures
    /// become `UpstreamUnavailable`; HTTP error statuses are relayed as-is.
    pub async fn forward(
        &self,
        call: InboundCall,
        who: ProxyIdentity<'_>,
        service: &ServiceDescriptor,
    ) -> Result<Response> {
        let started = Instant::now();
        let encrypted_user_id = self.identity.encrypt_user_id(who.user_id, &service.id)?;
        let url = Self::target_url(service, &call.subpath, call.query.as_deref());
        let outbound = self.outbound_headers(&call, who, service, &encrypted_user_id)?;

        let mut request = self
            .http
            .request(call.method.clone(), &url)
            .headers(outbound);
        if matches!(call.method, Method::POST | Method::PUT | Method::PATCH) {
            request = request.body(call.body.clone());
        }

        tracing::debug!(
            user_id = who.user_id,
            service_id = %service.id,
            method = %call.method,
            url = %url,
            "Forwarding request"
        );

        let result = match request.send().await {
            Ok(upstream) => relay(upstream).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                self.audit
                    .submit(self.audit_record(&call, who, service, status, elapsed_ms, None));
                tracing::info!(
                    user_id = who.user_id,
                    service_id = %service.id,
                    status,
                    elapsed_ms,
                    "Proxied request"
                );
                Ok(response)
            }
            Err(e) => {
                let status = e.status().map(|s| s.as_u16()).unwrap_or(500);
                let message = e.to_string();
                self.audit.submit(self.audit_record(
                    &call,
                    who,
                    service,
                    status,
                    elapsed_ms,
                    Some(message.clone()),
                ));
                tracing::warn!(
                    user_id = who.user_id,
                    service_id = %service.id,
                    error = %message,
                    timed_out = e.is_timeout(),
                    "Upstream call failed"
                );
                Err(AppError::UpstreamUnavailable {
                    timed_out: e.is_timeout(),
                    message: format!("{} did not respond", service.name),
                })
            }
        }
    }

    fn outbound_headers(
        &self,
        call: &InboundCall,
        who: ProxyIdentity<'_>,
        service: &ServiceDescriptor,
        encrypted_user_id: &str,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in call.headers.iter() {
            let lower = name.as_str();
            if CREDENTIAL_HEADERS.contains(&lower)
                || HOP_BY_HOP.contains(&lower)
                || lower == "host"
                || lower == "content-length"
                || lower.starts_with(&self.headers.prefix)
                || lower.starts_with("x-forwarded-")
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        let now = Utc::now();
        let timestamp_ms = now.timestamp_millis();
        let signature = self.signer.sign(&SignedIdentity {
            user_id: encrypted_user_id,
            role: who.role,
            service_id: &service.id,
            timestamp_ms,
        });

        let h = &self.headers;
        headers.insert(h.user_id.clone(), header_value(encrypted_user_id)?);
        headers.insert(h.user_role.clone(), header_value(who.role)?);
        headers.insert(h.session_id.clone(), header_value(who.session_id)?);
        headers.insert(h.service_id.clone(), header_value(&service.id)?);
        headers.insert(
            h.timestamp.clone(),
            header_value(&now.to_rfc3339_opts(SecondsFormat::Millis, true))?,
        );
        headers.insert(h.signature.clone(), header_value(&signature)?);
        headers.insert(HeaderName::from_static("x-proxied-by"), h.proxied_by.clone());

        let forwarded_for = forwarded_for(call);
        if let Some(chain) = forwarded_for {
            headers.insert(HeaderName::from_static("x-forwarded-for"), header_value(&chain)?);
        }
        let proto = call
            .headers
            .get("x-forwarded-proto")
            .cloned()
            .unwrap_or(HeaderValue::from_static("http"));
        headers.insert(HeaderName::from_static("x-forwarded-proto"), proto);
        if let Some(host) = call.headers.get(header::HOST) {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
        }

        Ok(headers)
    }

    fn audit_record(
        &self,
        call: &InboundCall,
        who: ProxyIdentity<'_>,
        service: &ServiceDescriptor,
        status: u16,
        elapsed_ms: u64,
        error_message: Option<String>,
    ) -> ProxyAuditRecord {
        ProxyAuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: who.user_id.to_string(),
            service_id: service.id.clone(),
            method: call.method.to_string(),
            endpoint: format!("/{}", call.subpath.trim_start_matches('/')),
            status_code: status,
            response_time_ms: elapsed_ms,
            success: ProxyAuditRecord::is_success_status(status),
            error_message,
            ip_address: call.client_ip(),
            user_agent: call.user_agent(),
            timestamp: format_utc_rfc3339(Utc::now()),
        }
    }
}

/// Inbound `X-Forwarded-For` chain with the TCP peer appended.
fn forwarded_for(call: &InboundCall) -> Option<String> {
    let inbound = call
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (inbound, call.peer_ip.as_deref()) {
        (Some(chain), Some(peer)) => Some(format!("{}, {}", chain, peer)),
        (Some(chain), None) => Some(chain.to_string()),
        (None, Some(peer)) => Some(peer.to_string()),
        (None, None) => None,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::BadRequest(format!("Unforwardable header value: {}", e)))
}

/// Copy status, end-to-end headers and body from the upstream response.
async fn relay(upstream: reqwest::Response) -> std::result::Result<Response, reqwest::Error> {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = upstream.headers().clone();
    let body = upstream.bytes().await?;

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
