//! Network context discovery from the instance metadata service.
//!
//! The controller scopes every address and shield call to the VPC and region
//! of the host it runs on. Both can be configured explicitly; otherwise they
//! are read once at startup from IMDS:
//! - `latest/meta-data/network/interfaces/macs/` (first MAC)
//! - `latest/meta-data/network/interfaces/macs/{mac}/vpc-id`
//! - `latest/dynamic/instance-identity/document` (`region` field)

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Default IMDS endpoint.
pub const DEFAULT_IMDS_URL: &str = "http://instance-data";

const IMDS_TIMEOUT: Duration = Duration::from_secs(5);
const MACS_PATH: &str = "latest/meta-data/network/interfaces/macs/";
const IDENTITY_DOCUMENT_PATH: &str = "latest/dynamic/instance-identity/document";

/// Errors resolving the network context.
#[derive(Debug, Error)]
pub enum ImdsError {
    /// HTTP transport failure.
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("metadata request to {url} returned {status}")]
    Status { url: String, status: u16 },

    /// The identity document is not valid JSON.
    #[error("invalid identity document: {0}")]
    Document(#[from] serde_json::Error),

    /// A required value came back empty.
    #[error("metadata returned an empty {0}")]
    Empty(&'static str),
}

/// VPC and region the controller operates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub vpc_id: String,
    pub region: String,
}

impl NetworkContext {
    /// Build a context from explicit values; `None` if either is empty.
    pub fn from_parts(vpc_id: Option<&str>, region: Option<&str>) -> Option<Self> {
        match (vpc_id, region) {
            (Some(vpc_id), Some(region)) if !vpc_id.is_empty() && !region.is_empty() => {
                Some(Self {
                    vpc_id: vpc_id.to_string(),
                    region: region.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.vpc_id)
    }
}

#[derive(Debug, Deserialize)]
struct IdentityDocument {
    #[serde(default)]
    region: String,
}

/// Minimal IMDS client.
pub struct ImdsClient {
    client: reqwest::Client,
    base_url: String,
}

impl ImdsClient {
    /// Create a client for the given metadata endpoint.
    pub fn new(base_url: &str) -> Result<Self, ImdsError> {
        let client = reqwest::Client::builder().timeout(IMDS_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Discover the VPC and region of this host.
    pub async fn discover(&self) -> Result<NetworkContext, ImdsError> {
        let macs = self.get_text(MACS_PATH).await?;
        let mac = macs
            .lines()
            .map(|line| line.trim().trim_end_matches('/'))
            .find(|line| !line.is_empty())
            .ok_or(ImdsError::Empty("MAC list"))?;

        let vpc_id = self
            .get_text(&format!("{}{}/vpc-id", MACS_PATH, mac))
            .await?
            .trim()
            .to_string();
        if vpc_id.is_empty() {
            return Err(ImdsError::Empty("vpc-id"));
        }

        let document: IdentityDocument =
            serde_json::from_str(&self.get_text(IDENTITY_DOCUMENT_PATH).await?)?;
        if document.region.is_empty() {
            return Err(ImdsError::Empty("region"));
        }

        let context = NetworkContext {
            vpc_id,
            region: document.region,
        };
        info!(vpc_id = %context.vpc_id, region = %context.region, "Discovered network context from IMDS");
        Ok(context)
    }

    async fn get_text(&self, path: &str) -> Result<String, ImdsError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Querying instance metadata");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ImdsError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Use the configured context when complete, otherwise ask IMDS.
pub async fn resolve(
    vpc_id: Option<&str>,
    region: Option<&str>,
    imds_url: &str,
) -> Result<NetworkContext, ImdsError> {
    if let Some(context) = NetworkContext::from_parts(vpc_id, region) {
        debug!(context = %context, "Using configured network context");
        return Ok(context);
    }

    ImdsClient::new(imds_url)?.discover().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_parts() {
        assert_eq!(
            NetworkContext::from_parts(Some("vpc-1"), Some("us-east-1")),
            Some(NetworkContext {
                vpc_id: "vpc-1".to_string(),
                region: "us-east-1".to_string(),
            })
        );
        assert_eq!(NetworkContext::from_parts(Some("vpc-1"), None), None);
        assert_eq!(NetworkContext::from_parts(Some(""), Some("us-east-1")), None);
    }

    #[tokio::test]
    async fn test_resolve_prefers_configuration() {
        // The endpoint is never contacted when both values are configured.
        let context = resolve(Some("vpc-1"), Some("eu-west-1"), "http://127.0.0.1:1")
            .await
            .unwrap();
        assert_eq!(context.to_string(), "eu-west-1/vpc-1");
    }
}
