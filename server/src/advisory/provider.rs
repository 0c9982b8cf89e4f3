//! Remote advisory lookup

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{AdvisoryError, AdvisoryResult};
use super::os_family::OsFamily;

/// One fixed-version row for a CVE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryFix {
    pub fixed_version: String,
    #[serde(default)]
    pub affected_version: Option<String>,
    #[serde(default)]
    pub os_family: Option<String>,
    #[serde(default)]
    pub last_synced: Option<String>,
}

/// Source of fixed versions per CVE
#[async_trait]
pub trait AdvisoryProvider: Send + Sync {
    async fn fetch_fixed_versions(
        &self,
        cve_id: &str,
        os_family: Option<OsFamily>,
    ) -> AdvisoryResult<Vec<AdvisoryFix>>;
}

/// Client for the HexTrackr advisory API
pub struct HexTrackrAdvisoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HexTrackrAdvisoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AdvisoryResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, cve_id: &str) -> String {
        format!("{}/api/cisco/fixed-versions/{}", self.base_url, cve_id)
    }
}

#[async_trait]
impl AdvisoryProvider for HexTrackrAdvisoryClient {
    async fn fetch_fixed_versions(
        &self,
        cve_id: &str,
        os_family: Option<OsFamily>,
    ) -> AdvisoryResult<Vec<AdvisoryFix>> {
        let mut request = self.client.get(self.url(cve_id));
        if let Some(family) = os_family {
            request = request.query(&[("os_family", family.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdvisoryError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
