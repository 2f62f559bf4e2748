//! Employee directory lookup.
//!
//! One read per successful match. "Not found" is an expected outcome,
//! since the match service can return an identity the directory no
//! longer knows, so it is a display state, never a crash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("employee not found")]
    NotFound,
    #[error("directory service error: {0}")]
    Service(String),
}

/// Rich profile for one employee, fetched fresh every cycle.
///
/// Field names are serde-renamed to match the directory's JSON exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    #[serde(rename = "employeeId")]
    pub employee_id: String,
    pub name: String,
    pub designation: String,
    pub department: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub attendance_status: bool,
    pub attendance_message: String,
}

/// Wire envelope around a profile.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: bool,
    data: Option<EmployeeProfile>,
}

/// Client for the employee directory service.
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the profile for an identity token.
    ///
    /// The token is only ever valid for this immediately-following call;
    /// nothing is cached across cycles.
    pub async fn fetch(&self, face_id: &str) -> Result<EmployeeProfile, DirectoryError> {
        let url = format!("{}/employee/{}", self.base_url, face_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Service(format!(
                "directory returned {}",
                response.status()
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| DirectoryError::Service(e.to_string()))?;

        if !envelope.status {
            return Err(DirectoryError::NotFound);
        }
        envelope.data.ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl crate::session::FetchProfile for DirectoryClient {
    async fn fetch(&self, face_id: &str) -> Result<EmployeeProfile, DirectoryError> {
        DirectoryClient::fetch(self, face_id).await
    }
}
