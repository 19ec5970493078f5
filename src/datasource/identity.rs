//! Shared identity (Keystone-style) client (§4.1, §6): every adapter
//! receives one of these; on token expiry it re-authenticates lazily.
//! Adapters never cache tokens themselves — only this client does, behind
//! a lock, matching the "auth" contract in §4.1.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use displaydoc::Display;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Display, Error)]
pub enum IdentityError {
    /// failed to reach identity service: {0}
    Http(#[from] reqwest::Error),
    /// identity service rejected credentials
    InvalidCredentials,
    /// no endpoint found for service {0:?} with availability {1:?}
    NoEndpoint(String, String),
}

#[derive(Clone, Debug)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IdentityCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
}

/// Token-scoped HTTP/JSON client shared across all datasource adapters
/// (§6 "Upstream protocols").
pub struct IdentityClient {
    http: Client,
    credentials: IdentityCredentials,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    expires_at: DateTime<Utc>,
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub service_type: String,
    pub public_url: String,
    pub internal_url: String,
    pub admin_url: String,
}

impl IdentityClient {
    pub fn new(http: Client, credentials: IdentityCredentials) -> Arc<Self> {
        Arc::new(Self {
            http,
            credentials,
            token: RwLock::new(None),
        })
    }

    /// Returns a live bearer token, re-authenticating only when the
    /// cached one is missing or within 30s of expiry.
    pub async fn bearer_token(&self) -> Result<String, IdentityError> {
        {
            let guard = self.token.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Utc::now() + chrono::Duration::seconds(30) {
                    return Ok(cached.value.clone());
                }
            }
        }
        self.reauthenticate().await
    }

    async fn reauthenticate(&self) -> Result<String, IdentityError> {
        let response: AuthResponse = self
            .http
            .post(&self.credentials.auth_url)
            .json(&AuthRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(|_| IdentityError::InvalidCredentials)?
            .json()
            .await?;

        let mut guard = self.token.write().await;
        *guard = Some(CachedToken {
            value: response.token.clone(),
            expires_at: response.expires_at,
        });
        Ok(response.token)
    }

    pub async fn endpoint(
        &self,
        service_type: &str,
        availability: &str,
    ) -> Result<String, IdentityError> {
        // Triggers a token refresh, which also refreshes the catalog
        // entries cached alongside it.
        self.reauthenticate().await?;
        let response: AuthResponse = self
            .http
            .post(&self.credentials.auth_url)
            .json(&AuthRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(|_| IdentityError::InvalidCredentials)?
            .json()
            .await?;

        response
            .catalog
            .into_iter()
            .find(|entry| entry.service_type == service_type)
            .map(|entry| match availability {
                "internal" => entry.internal_url,
                "admin" => entry.admin_url,
                _ => entry.public_url,
            })
            .ok_or_else(|| {
                IdentityError::NoEndpoint(service_type.to_string(), availability.to_string())
            })
    }
}
