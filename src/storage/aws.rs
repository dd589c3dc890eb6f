//! AWS S3 archive backend.
//!
//! Reads the archive straight from S3 (or any S3-compatible endpoint).
//! Listings use `ListObjectsV2` with a delimiter; reads use `GetObject` and
//! hand the body stream through without buffering it.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless the config
//! carries explicit keys.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::{debug, info};

use super::backend::{ArchiveStore, ListPage, ObjectBody, ObjectEntry, StoreError};
use crate::config::AwsArchiveConfig;

/// Archive backend that forwards reads to AWS S3.
pub struct AwsArchive {
    /// AWS S3 SDK client.
    client: Client,
}

impl AwsArchive {
    /// Create a new AWS archive backend.
    ///
    /// Connect/read timeouts and the retry budget are configured on the SDK
    /// client; the gateway itself never retries.
    pub async fn new(config: &AwsArchiveConfig) -> anyhow::Result<Self> {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build();

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .timeout_config(timeouts)
            .retry_config(
                aws_config::retry::RetryConfig::standard().with_max_attempts(config.max_attempts),
            );

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        // If explicit credentials are provided, inject them as static credentials.
        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "corpora-gateway-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "AWS archive backend initialized: region={} endpoint='{}'",
            config.region, config.endpoint_url
        );

        Ok(Self { client })
    }

    /// Fold an SDK error into a [`StoreError`].
    fn map_sdk_error<E>(
        operation: &str,
        bucket: &str,
        key: &str,
        err: SdkError<E, HttpResponse>,
    ) -> StoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        if matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
        ) {
            return StoreError::Transient {
                operation: operation.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            };
        }
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err
            .as_service_error()
            .and_then(|e| e.code())
            .map(str::to_string);
        classify_reply(
            operation,
            bucket,
            key,
            status,
            code.as_deref(),
            DisplayErrorContext(&err).to_string(),
        )
    }
}

/// Classify a store reply by error code first, then by HTTP status.
fn classify_reply(
    operation: &str,
    bucket: &str,
    key: &str,
    status: Option<u16>,
    code: Option<&str>,
    message: String,
) -> StoreError {
    match (code, status) {
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (_, Some(404)) => {
            StoreError::not_found(bucket, key)
        }
        (Some("AccessDenied" | "AllAccessDisabled"), _) | (_, Some(403)) => {
            StoreError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        }
        (Some("SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable"), _) => {
            StoreError::Transient {
                operation: operation.to_string(),
                message,
            }
        }
        (_, Some(s)) if s >= 500 || s == 429 => StoreError::Transient {
            operation: operation.to_string(),
            message,
        },
        _ => StoreError::Other {
            operation: operation.to_string(),
            message,
        },
    }
}

/// Convert an SDK timestamp to UTC, falling back to the epoch.
fn to_utc(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    dt.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

impl ArchiveStore for AwsArchive {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        let continuation = continuation.map(|s| s.to_string());
        Box::pin(async move {
            debug!(
                "AWS list_objects_v2: bucket={} prefix={} continuation={:?}",
                bucket, prefix, continuation
            );

            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&prefix);
            if !delimiter.is_empty() {
                req = req.delimiter(&delimiter);
            }
            if let Some(ref token) = continuation {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_objects_v2", &bucket, &prefix, e))?;

            let prefixes = resp
                .common_prefixes()
                .iter()
                .filter_map(|cp| cp.prefix().map(|p| p.to_string()))
                .collect();

            let objects = resp
                .contents()
                .iter()
                .filter_map(|obj| {
                    obj.key().map(|k| ObjectEntry {
                        key: k.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified: to_utc(obj.last_modified()),
                    })
                })
                .collect();

            let next_continuation = if resp.is_truncated() == Some(true) {
                resp.next_continuation_token().map(|s| s.to_string())
            } else {
                None
            };

            Ok(ListPage {
                prefixes,
                objects,
                next_continuation,
            })
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StoreError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("AWS get_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_object", &bucket, &key, e))?;

            let content_length = resp.content_length().and_then(|n| u64::try_from(n).ok());
            let last_modified = resp.last_modified().map(|d| to_utc(Some(d)));

            let chunks = futures_util::stream::try_unfold(resp.body, |mut body| async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(StoreError::Transient {
                        operation: "get_object body".to_string(),
                        message: e.to_string(),
                    }),
                }
            })
            .boxed();

            Ok(ObjectBody {
                content_length,
                last_modified,
                chunks,
            })
        })
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: Option<u16>, code: Option<&str>) -> StoreError {
        classify_reply("get_object", "b", "k", status, code, "boom".to_string())
    }

    #[test]
    fn test_no_such_key_is_not_found() {
        assert!(matches!(
            classify(Some(404), Some("NoSuchKey")),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(classify(Some(404), None), StoreError::NotFound { .. }));
    }

    #[test]
    fn test_forbidden_is_access_denied() {
        assert!(matches!(
            classify(Some(403), Some("AccessDenied")),
            StoreError::AccessDenied { .. }
        ));
        assert!(matches!(classify(Some(403), None), StoreError::AccessDenied { .. }));
    }

    #[test]
    fn test_throttling_and_5xx_are_transient() {
        assert!(matches!(
            classify(Some(503), Some("SlowDown")),
            StoreError::Transient { .. }
        ));
        assert!(matches!(classify(Some(500), None), StoreError::Transient { .. }));
        assert!(matches!(classify(Some(429), None), StoreError::Transient { .. }));
    }

    #[test]
    fn test_other_client_errors() {
        let err = classify(Some(400), Some("InvalidArgument"));
        assert!(matches!(err, StoreError::Other { .. }));
        assert_eq!(err.kind(), "other");
    }

    #[test]
    fn test_not_found_keeps_bucket_and_key() {
        match classify(Some(404), Some("NoSuchKey")) {
            StoreError::NotFound { bucket, key } => {
                assert_eq!(bucket, "b");
                assert_eq!(key, "k");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_to_utc_conversion() {
        let dt = aws_sdk_s3::primitives::DateTime::from_secs(1_600_000_000);
        assert_eq!(to_utc(Some(&dt)).timestamp(), 1_600_000_000);
        assert_eq!(to_utc(None), DateTime::<Utc>::UNIX_EPOCH);
    }
}
