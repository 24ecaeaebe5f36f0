//! Azure Monitor input
//!
//! This module polls the Azure Monitor metrics REST API for a single resource
//! and republishes each distinct timestamp in the response as one sample of
//! the `azure_monitor` measurement, tagged with the resource id.
//!
//! A cycle is GET, parse, bucketize, emit. It holds no state between cycles
//! and never retries: any failure before emission aborts the cycle with
//! nothing emitted and the host simply tries again on its next tick.

pub mod bucket;
pub mod response;

use std::sync::Arc;

use async_trait::async_trait;
use azmon_capture::{Accumulator, Tags};
use futures::future::BoxFuture;
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info, trace};

use self::{
    bucket::{FieldSet, bucketize},
    response::{MonitorResponse, parse_response},
};
use crate::{
    credential::{self, Authorizer},
    inputs::{self, Input},
    registry::{self, Registration},
};

/// Name this input registers under.
pub const NAME: &str = "azure_monitor";
/// Measurement every sample of this input is emitted under.
pub const MEASUREMENT: &str = "azure_monitor";
/// Tag carrying the configured resource id.
pub const RESOURCE_ID_TAG: &str = "resource_id";

const DESCRIPTION: &str = "Gather Azure monitor metrics";

const SAMPLE_CONFIG: &str = r#"- azure_monitor:
    ## The Azure Resource ID for which metrics will be gathered
    ##   ex: resource_id: "/subscriptions/<subscription_id>/resourceGroups/<resource_group>/providers/Microsoft.Storage/storageAccounts/<storage_account>"
    resource_id: ""
    ## Base URI of the Azure Resource Manager endpoint
    # management_endpoint: "https://management.azure.com"
    ## Version of the metrics API to request
    # api_version: "2018-01-01"
"#;

const METRICS_PROVIDER: &str = "microsoft.insights";

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`AzureMonitor`]
pub enum Error {
    /// A required setting is missing or unusable.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// The identity provider did not hand out a credential.
    #[error("Failed to acquire credential: {0}")]
    Credential(#[from] credential::Error),
    /// The request could not be sent or its body not read.
    #[error("Azure monitor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The provider answered with a non-2xx status.
    #[error("Azure monitor request returned error. Status {status}:\n{body}")]
    Provider {
        /// HTTP status of the answer
        status: u16,
        /// Verbatim body of the answer
        body: String,
    },
    /// The body is not a metrics response.
    #[error("Failed to decode Azure monitor response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn default_management_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_api_version() -> String {
    "2018-01-01".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`AzureMonitor`]
pub struct Config {
    /// Fully qualified id of the resource to poll. Required.
    #[serde(default)]
    pub resource_id: String,
    /// Base URI of the Azure Resource Manager endpoint
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,
    /// Version of the metrics API to request
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Config {
    /// Create a [`Config`] for `resource_id` with every other setting at its
    /// default.
    #[must_use]
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            management_endpoint: default_management_endpoint(),
            api_version: default_api_version(),
        }
    }

    /// The URI metrics are requested from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `resource_id` is empty or the
    /// resulting URI does not parse.
    pub fn metrics_uri(&self) -> Result<reqwest::Url, Error> {
        let resource_id = self.resource_id.trim().trim_matches('/');
        if resource_id.is_empty() {
            return Err(Error::Configuration(
                "resource_id must be configured".to_string(),
            ));
        }

        let uri = format!(
            "{endpoint}/{resource_id}/providers/{METRICS_PROVIDER}/metrics?api-version={version}",
            endpoint = self.management_endpoint.trim_end_matches('/'),
            version = self.api_version,
        );
        reqwest::Url::parse(&uri)
            .map_err(|err| Error::Configuration(format!("invalid metrics uri {uri}: {err}")))
    }
}

/// The `AzureMonitor` input.
#[derive(Debug)]
pub struct AzureMonitor {
    resource_id: String,
    uri: reqwest::Url,
    client: reqwest::Client,
    authorizer: Arc<dyn Authorizer>,
    tags: Tags,
}

impl AzureMonitor {
    /// Create a new [`AzureMonitor`] instance
    ///
    /// The configuration is validated before the credential is acquired from
    /// the process environment, so a bad configuration never touches the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unusable configuration and
    /// [`Error::Credential`] if no credential could be acquired.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let uri = config.metrics_uri()?;
        let client = reqwest::Client::new();
        let credential = credential::from_environment(&client).await?;
        info!("Azure monitor input initialized for {}", config.resource_id);
        Ok(Self::assemble(config, uri, client, Arc::new(credential)))
    }

    /// Create a new [`AzureMonitor`] instance authorizing its requests with
    /// `authorizer` instead of a credential from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unusable configuration.
    pub fn with_authorizer(config: Config, authorizer: Arc<dyn Authorizer>) -> Result<Self, Error> {
        let uri = config.metrics_uri()?;
        Ok(Self::assemble(config, uri, reqwest::Client::new(), authorizer))
    }

    fn assemble(
        config: Config,
        uri: reqwest::Url,
        client: reqwest::Client,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let mut tags = Tags::new();
        tags.insert(RESOURCE_ID_TAG.to_string(), config.resource_id.clone());
        Self {
            resource_id: config.resource_id,
            uri,
            client,
            authorizer,
            tags,
        }
    }

    /// The [`Registration`] of this input.
    #[must_use]
    pub fn registration() -> Registration {
        Registration {
            name: NAME,
            description: DESCRIPTION,
            sample_config: SAMPLE_CONFIG,
            factory,
        }
    }

    /// Run one poll cycle, emitting into `acc`.
    ///
    /// Returns the number of samples emitted. A response without any point
    /// with a valid timestamp emits nothing and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if no token could be obtained, and
    /// [`Error::Transport`], [`Error::Provider`] or [`Error::Decode`] if the
    /// request or its response fail. Nothing is emitted in any of these cases.
    pub async fn gather(&self, acc: &mut dyn Accumulator) -> Result<usize, Error> {
        let resource_id = self.resource_id.clone();
        counter!("azure_monitor_polls", RESOURCE_ID_TAG => resource_id.clone()).increment(1);

        let response = match self.request().await {
            Ok(response) => response,
            Err(err) => {
                counter!("azure_monitor_poll_errors", RESOURCE_ID_TAG => resource_id).increment(1);
                return Err(err);
            }
        };

        let field_sets = bucketize(&response);
        let emitted = field_sets.len();
        for FieldSet { timestamp, fields } in field_sets {
            acc.add_fields(MEASUREMENT, fields, &self.tags, timestamp);
        }

        debug!(
            "emitted {emitted} samples from {} metrics for {resource_id}",
            response.value.len()
        );
        counter!("azure_monitor_samples_emitted", RESOURCE_ID_TAG => resource_id)
            .increment(emitted as u64);
        Ok(emitted)
    }

    async fn request(&self) -> Result<MonitorResponse, Error> {
        trace!("GET {}", self.uri);
        let response = self
            .authorizer
            .authorize(self.client.get(self.uri.clone()))
            .await?
            .send()
            .await?;
        parse_response(response).await
    }
}

fn factory(options: serde_yaml::Value) -> BoxFuture<'static, Result<Box<dyn Input>, registry::Error>> {
    Box::pin(async move {
        let config: Config = serde_yaml::from_value(options)?;
        let input = AzureMonitor::new(config)
            .await
            .map_err(inputs::Error::from)?;
        Ok(Box::new(input) as Box<dyn Input>)
    })
}

#[async_trait]
impl Input for AzureMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    async fn gather(&self, acc: &mut dyn Accumulator) -> Result<usize, inputs::Error> {
        AzureMonitor::gather(self, acc).await.map_err(Into::into)
    }
}
