//! Client for the Directory indexer API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | PUT    | `/indexer/1.0/` | (re)index a participant, body is the participant URI |
//! | DELETE | `/indexer/1.0/{participant}` | remove a participant |

use smp_core::ParticipantId;

use crate::config::DirectoryClientConfig;
use crate::error::DirectoryError;

const INDEXER_PATH: &str = "indexer/1.0/";

/// Client for one Directory instance.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    /// Build a client from configuration.
    pub fn new(config: &DirectoryClientConfig) -> Result<Self, DirectoryError> {
        Ok(Self {
            http: config.http_client()?,
            base_url: format!(
                "{}/{INDEXER_PATH}",
                config.hostname.as_str().trim_end_matches('/')
            ),
        })
    }

    /// Ask the Directory to fetch and index the business card of
    /// `participant`.
    ///
    /// Calls `PUT {hostname}/indexer/1.0/` with the participant URI as body.
    pub async fn add_service_group_to_index(
        &self,
        participant: &ParticipantId,
    ) -> Result<(), DirectoryError> {
        let endpoint = "PUT /indexer/1.0/";
        let resp = self
            .http
            .put(&self.base_url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(participant.uri_encoded())
            .send()
            .await
            .map_err(|e| DirectoryError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;
        check_status(resp).await?;
        tracing::info!(participant = %participant, "Directory indexing requested");
        Ok(())
    }

    /// Ask the Directory to remove `participant`.
    ///
    /// Calls `DELETE {hostname}/indexer/1.0/{participant}`.
    pub async fn delete_service_group_from_index(
        &self,
        participant: &ParticipantId,
    ) -> Result<(), DirectoryError> {
        let encoded: String =
            url::form_urlencoded::byte_serialize(participant.uri_encoded().as_bytes()).collect();
        let endpoint = format!("DELETE /indexer/1.0/{encoded}");
        let resp = self
            .http
            .delete(format!("{}{encoded}", self.base_url))
            .send()
            .await
            .map_err(|e| DirectoryError::Http {
                endpoint,
                source: e,
            })?;
        check_status(resp).await?;
        tracing::info!(participant = %participant, "Directory removal requested");
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), DirectoryError> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(DirectoryError::Api { status, body })
}
