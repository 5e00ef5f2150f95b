use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GuardError;
use crate::models::{ProbeResult, Target, TargetPatch};
use super::client::{classify_status, error_message, ArrHttpClient};
use super::service::TargetService;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Radarr,
    Sonarr,
    Prowlarr,
}

impl ServiceKind {
    /// Prowlarr speaks API v1; Radarr and Sonarr speak v3.
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Radarr | Self::Sonarr => "v3",
            Self::Prowlarr => "v1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Radarr => "radarr",
            Self::Sonarr => "sonarr",
            Self::Prowlarr => "prowlarr",
        }
    }
}

/// Indexer management for one Radarr, Sonarr or Prowlarr instance.
pub struct ArrService {
    name: String,
    kind: ServiceKind,
    client: ArrHttpClient,
}

impl ArrService {
    pub fn new(name: &str, kind: ServiceKind, client: ArrHttpClient) -> Self {
        Self {
            name: name.to_string(),
            kind,
            client,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    fn indexer_path(&self, id: Option<i64>) -> String {
        match id {
            Some(id) => format!("/api/{}/indexer/{}", self.kind.api_version(), id),
            None => format!("/api/{}/indexer", self.kind.api_version()),
        }
    }
}

#[async_trait]
impl TargetService for ArrService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> Result<Vec<Target>, GuardError> {
        let targets: Vec<Target> = self.client.get(&self.indexer_path(None)).await?;
        debug!(service = %self.name, count = targets.len(), "Fetched indexers");
        Ok(targets)
    }

    async fn test_target(&self, id: i64) -> Result<ProbeResult, GuardError> {
        let path = format!("{}/test", self.indexer_path(Some(id)));
        let resp = self.client.post_raw(&path).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(ProbeResult::passed());
        }
        let body = resp.text().await.unwrap_or_default();
        // Arr reports a failing indexer test as 400 with validation errors.
        if status == StatusCode::BAD_REQUEST {
            return Ok(ProbeResult::failed(error_message(&body)));
        }
        Err(classify_status(status, &path, &body))
    }

    async fn update_target(&self, id: i64, patch: &TargetPatch) -> Result<Target, GuardError> {
        let path = self.indexer_path(Some(id));
        let current: Target = self.client.get(&path).await?;
        let updated = current.merged(patch);
        let body = serde_json::to_value(&updated)?;
        let saved = self.client.put(&path, &body).await?;
        Ok(serde_json::from_value(saved).unwrap_or(updated))
    }

    async fn add_target(&self, definition: &Value) -> Result<Target, GuardError> {
        let path = self.indexer_path(None);
        let created = self.client.post(&path, definition).await?;
        let target: Target = serde_json::from_value(created)
            .map_err(|e| GuardError::InvalidResponse(format!("{}: {}", path, e)))?;
        debug!(service = %self.name, target_id = target.id, "Indexer added");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service(kind: ServiceKind) -> ArrService {
        let client = ArrHttpClient::new("http://localhost:9696", "key", Duration::from_secs(5)).unwrap();
        ArrService::new(kind.as_str(), kind, client)
    }

    #[test]
    fn test_api_versions() {
        assert_eq!(ServiceKind::Radarr.api_version(), "v3");
        assert_eq!(ServiceKind::Sonarr.api_version(), "v3");
        assert_eq!(ServiceKind::Prowlarr.api_version(), "v1");
    }

    #[test]
    fn test_indexer_paths() {
        let prowlarr = service(ServiceKind::Prowlarr);
        assert_eq!(prowlarr.indexer_path(None), "/api/v1/indexer");
        let radarr = service(ServiceKind::Radarr);
        assert_eq!(radarr.indexer_path(Some(4)), "/api/v3/indexer/4");
        assert_eq!(radarr.name(), "radarr");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        let client = ArrHttpClient::new("http://127.0.0.1:1", "key", Duration::from_secs(2)).unwrap();
        let svc = ArrService::new("radarr", ServiceKind::Radarr, client);
        let err = svc.list_targets().await.unwrap_err();
        assert!(err.classify().retryable());
    }

    #[tokio::test]
    async fn test_add_to_unreachable_service_is_transient() {
        let client = ArrHttpClient::new("http://127.0.0.1:1", "key", Duration::from_secs(2)).unwrap();
        let svc = ArrService::new("prowlarr", ServiceKind::Prowlarr, client);
        let definition = serde_json::json!({"name": "NewIndexer", "baseUrl": "https://example.org"});
        let err = svc.add_target(&definition).await.unwrap_err();
        assert!(err.classify().retryable());
    }
}
