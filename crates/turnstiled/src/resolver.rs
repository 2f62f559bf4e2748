//! Remote identity resolution: upload a screened sample to the object
//! store gateway, then ask the matching service who it is.
//!
//! Two sequential network calls with independent failure modes. No
//! retries here; the next cycle is the retry.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// The match service's explicit success marker.
const SUCCESS_MARKER: &str = "Success";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("sample upload failed: {0}")]
    Upload(String),
    #[error("match request failed: {0}")]
    Match(String),
    #[error("no matching identity")]
    NoMatch,
}

/// Wire shape of the match service response.
#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "FaceId")]
    face_id: Option<String>,
}

/// Client for the object-store gateway and its match endpoint.
pub struct IdentityResolver {
    client: reqwest::Client,
    gateway_base: String,
    bucket: String,
}

impl IdentityResolver {
    pub fn new(client: reqwest::Client, gateway_base: &str, bucket: &str) -> Self {
        Self {
            client,
            gateway_base: gateway_base.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Upload the JPEG under a fresh key, then resolve that key to an
    /// identity token.
    ///
    /// Returns the token only on the service's explicit success marker;
    /// everything else is a distinct error for the session to display.
    pub async fn resolve(&self, jpeg: &[u8]) -> Result<String, ResolveError> {
        let object_key = format!("{}.jpg", Uuid::new_v4());

        let upload_url = format!("{}/{}/{}", self.gateway_base, self.bucket, object_key);
        let response = self
            .client
            .put(&upload_url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg.to_vec())
            .send()
            .await
            .map_err(|e| ResolveError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Upload(format!(
                "gateway returned {}",
                response.status()
            )));
        }
        tracing::debug!(key = %object_key, bytes = jpeg.len(), "sample uploaded");

        let match_url = format!("{}/employee?objectKey={}", self.gateway_base, object_key);
        let response = self
            .client
            .get(&match_url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResolveError::Match(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Match(format!(
                "match service returned {}",
                response.status()
            )));
        }

        let body: MatchResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Match(e.to_string()))?;

        if body.message != SUCCESS_MARKER {
            tracing::debug!(message = %body.message, "match service declined");
            return Err(ResolveError::NoMatch);
        }

        body.face_id.ok_or(ResolveError::NoMatch)
    }
}

#[async_trait]
impl crate::session::ResolveIdentity for IdentityResolver {
    async fn resolve(&self, jpeg: &[u8]) -> Result<String, ResolveError> {
        IdentityResolver::resolve(self, jpeg).await
    }
}
