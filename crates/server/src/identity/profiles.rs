//! Profile records in the provider's data store.
//!
//! Every non-guest account must have a profile row; the resolver treats a
//! verified session without one as invalid. Profile access uses the
//! server-side service key and never the publishable key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use parlor_core::UserId;

use crate::identity::IdentityError;
use crate::models::User;

/// A profile row backing a registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Access to profile rows, abstracted for the resolver and callback handler.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Fetch a profile by user ID; a missing row is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] on transport or store failures.
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Profile>, IdentityError>;

    /// Ensure a profile row exists for a verified user.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] on transport or store failures.
    async fn ensure(&self, user: &User) -> Result<Profile, IdentityError>;
}

/// Accessor for the profile table in the provider's REST data store.
#[derive(Clone)]
pub struct ProfileStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl ProfileStore {
    pub(crate) const fn new(http: reqwest::Client, base_url: String, service_key: String) -> Self {
        Self {
            http,
            base_url,
            service_key,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/profiles", self.base_url)
    }

    /// Fetch a profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Http`] or [`IdentityError::Provider`] on
    /// transport or store failures. A missing row is `Ok(None)`.
    pub async fn get(&self, user_id: &UserId) -> Result<Option<Profile>, IdentityError> {
        let response = self
            .http
            .get(self.table_url())
            .query(&[("id", format!("eq.{}", user_id.as_str()))])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Provider { status, message });
        }

        let mut rows: Vec<Profile> = response.json().await?;
        Ok(rows.pop())
    }

    /// Create a profile for a user if one does not already exist.
    ///
    /// Uses an upsert with conflict-ignore so concurrent callback handling
    /// for the same account is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Http`] or [`IdentityError::Provider`] on
    /// transport or store failures.
    pub async fn create_if_absent(&self, user: &User) -> Result<Profile, IdentityError> {
        let row = json!({
            "id": user.id.as_str(),
            "email": user.email,
            "display_name": user.display_name,
        });

        let response = self
            .http
            .post(self.table_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&json!([row]))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Provider { status, message });
        }

        // The upsert returns the inserted row, or an empty array when the
        // profile already existed; re-read in that case.
        let mut rows: Vec<Profile> = response.json().await?;
        match rows.pop() {
            Some(profile) => Ok(profile),
            None => self
                .get(&user.id)
                .await?
                .ok_or(IdentityError::MissingUser),
        }
    }
}

#[async_trait]
impl ProfileLookup for ProfileStore {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Profile>, IdentityError> {
        self.get(user_id).await
    }

    async fn ensure(&self, user: &User) -> Result<Profile, IdentityError> {
        self.create_if_absent(user).await
    }
}
