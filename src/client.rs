//! DynamoDB client construction.
//!
//! Credentials are taken from, in order of priority:
//! 1. Static credentials (access_key, secret_key, session_token)
//! 2. An AWS profile from ~/.aws/credentials
//! 3. The default chain (environment variables, instance profile, etc.)

use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::{Credentials, Region};
use serde::Deserialize;
use tracing::debug;

use crate::transport::SdkTransport;

const FALLBACK_REGION: &str = "us-east-1";

/// Connection settings for the SDK client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub region: Option<String>,
    /// Custom endpoint for local testing (localstack, DynamoDB Local).
    pub endpoint_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
}

impl ClientConfig {
    /// Read `AWS_REGION`, `AWS_ENDPOINT_URL_DYNAMODB` (or `AWS_ENDPOINT_URL`)
    /// and `AWS_PROFILE`. Credentials are left to the default chain.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
            endpoint_url: var("AWS_ENDPOINT_URL_DYNAMODB").or_else(|| var("AWS_ENDPOINT_URL")),
            profile: var("AWS_PROFILE"),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self.session_token = session_token;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Static credentials, when both halves are set.
    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key, &self.secret_key) {
            (Some(ak), Some(sk)) => Some(Credentials::new(
                ak,
                sk,
                self.session_token.clone(),
                None,
                "dynomodel-static",
            )),
            _ => None,
        }
    }
}

/// Build the AWS SDK DynamoDB client.
///
/// Region priority: config > env/default provider > `us-east-1`.
pub async fn build_client(config: &ClientConfig) -> Client {
    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(FALLBACK_REGION);

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(creds) = config.static_credentials() {
        loader = loader.credentials_provider(creds);
    } else if let Some(profile_name) = &config.profile {
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(profile_name)
            .build();
        loader = loader.credentials_provider(profile_provider);
    }

    let sdk_config = loader.load().await;
    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
    if let Some(url) = &config.endpoint_url {
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    debug!(
        region = sdk_config.region().map(|r| r.as_ref()).unwrap_or(FALLBACK_REGION),
        endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
        "built DynamoDB client"
    );
    Client::from_conf(dynamo_config.build())
}

/// Build an [`SdkTransport`] from `config`.
pub async fn connect(config: &ClientConfig) -> SdkTransport {
    SdkTransport::new(build_client(config).await)
}
