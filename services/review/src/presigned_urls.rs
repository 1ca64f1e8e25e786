use crate::config::BlobConfig;
use crate::error::{Result, ReviewError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Bucket and key of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Resolve a storage locator to a bucket and key
    ///
    /// Accepted forms:
    /// - `s3://bucket/key`
    /// - `https://bucket.s3.<region>.amazonaws.com/key` (virtual-hosted)
    /// - `http(s)://host/bucket/key` (path-style, e.g. MinIO)
    /// - a bare `key`, when a default bucket is configured
    pub fn parse(locator: &str, default_bucket: Option<&str>) -> Result<Self> {
        let not_found = |reason: &str| {
            ReviewError::AssetResolutionFailed(format!("{reason}: {locator:?}"))
        };

        let (bucket, raw_key) = match Url::parse(locator) {
            Ok(url) => {
                let host = url.host_str().unwrap_or_default().to_string();
                let path = url.path().trim_start_matches('/').to_string();

                match url.scheme() {
                    "s3" => (host, path),
                    "http" | "https" => match virtual_hosted_bucket(&host) {
                        Some(bucket) => (bucket.to_string(), path),
                        None => match path.split_once('/') {
                            Some((bucket, key)) => (bucket.to_string(), key.to_string()),
                            None => return Err(not_found("locator has no object key")),
                        },
                    },
                    _ => return Err(not_found("unsupported locator scheme")),
                }
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => match default_bucket {
                Some(bucket) => (
                    bucket.to_string(),
                    locator.trim_start_matches('/').to_string(),
                ),
                None => return Err(not_found("relative locator without a default bucket")),
            },
            Err(_) => return Err(not_found("malformed locator")),
        };

        let key = percent_decode_str(&raw_key)
            .decode_utf8()
            .map_err(|_| not_found("object key is not valid UTF-8"))?
            .into_owned();

        if bucket.is_empty() {
            return Err(not_found("locator has no bucket"));
        }
        if key.is_empty() {
            return Err(not_found("locator has no object key"));
        }

        Ok(Self { bucket, key })
    }
}

/// Bucket name of an AWS virtual-hosted-style host, e.g. `images.s3.eu-west-1.amazonaws.com`
fn virtual_hosted_bucket(host: &str) -> Option<&str> {
    if !host.ends_with(".amazonaws.com") {
        return None;
    }
    host.find(".s3.")
        .or_else(|| host.find(".s3-"))
        .map(|idx| &host[..idx])
        .filter(|bucket| !bucket.is_empty())
}

/// A time-limited, read-only URL for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Produces signed GET URLs; the signing credential never leaves the implementor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn presign_read(
        &self,
        object: &ObjectRef,
        starts_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> Result<String>;
}

/// S3 presigner holding the service's signing credential
pub struct S3UrlSigner {
    client: S3Client,
}

impl S3UrlSigner {
    /// Create a new signer from the blob configuration
    pub async fn new(config: &BlobConfig) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "review-config",
            ));
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 URL signer initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    async fn presign_read(
        &self,
        object: &ObjectRef,
        starts_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> Result<String> {
        let presigning_config = PresigningConfig::builder()
            .start_time(starts_at.into())
            .expires_in(expires_in)
            .build()
            .map_err(|e| ReviewError::AssetResolutionFailed(e.to_string()))?;

        // GetObject only, so the URL carries read access and nothing else
        let presigned = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .presigned(presigning_config)
            .await
            .map_err(|e| ReviewError::AssetResolutionFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// Issues time-limited read URLs for image locators
#[derive(Clone)]
pub struct AssetUrlIssuer {
    signer: Arc<dyn UrlSigner>,
    default_bucket: Option<String>,
    validity_minutes: u32,
}

impl AssetUrlIssuer {
    pub fn new(
        signer: Arc<dyn UrlSigner>,
        default_bucket: Option<String>,
        validity_minutes: u32,
    ) -> Self {
        Self {
            signer,
            default_bucket,
            validity_minutes,
        }
    }

    /// Sign a URL valid from now for the configured number of minutes
    pub async fn issue(&self, locator: &str) -> Result<SignedUrl> {
        self.issue_at(locator, self.validity_minutes, Utc::now()).await
    }

    /// Sign a URL valid from `now` for `validity_minutes`
    #[instrument(skip(self))]
    pub async fn issue_at(
        &self,
        locator: &str,
        validity_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl> {
        let object = ObjectRef::parse(locator, self.default_bucket.as_deref())?;
        let expires_in = Duration::from_secs(u64::from(validity_minutes) * 60);

        let url = self.signer.presign_read(&object, now, expires_in).await?;
        let expires_at = now + chrono::Duration::minutes(i64::from(validity_minutes));

        debug!(
            bucket = %object.bucket,
            key = %object.key,
            expires_at = %expires_at,
            "Signed image URL issued"
        );

        Ok(SignedUrl {
            url,
            starts_at: now,
            expires_at,
        })
    }
}
