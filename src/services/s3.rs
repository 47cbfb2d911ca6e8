use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use crate::config::BlobConfig;

use super::blob::{BlobError, BlobStore, PutOptions, StoredBlob};

#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    pub bucket_name: String,
    public_base_url: Url,
}

impl S3BlobStore {
    pub async fn new(config: &BlobConfig) -> Result<Self, BlobError> {
        let region = Region::new(config.region.clone());

        let mut s3_config_builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let credentials = Credentials::new(
                    access_key_id.clone(),
                    secret_access_key.clone(),
                    None,
                    None,
                    "manual_config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        // Replays are driven by the uploader's RetryPolicy.
        s3_config_builder = s3_config_builder.retry_config(RetryConfig::disabled());

        let client = Client::from_conf(s3_config_builder.build());

        let base = match (&config.public_base_url, &config.endpoint) {
            (Some(public), _) => public.clone(),
            (None, Some(endpoint)) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket_name)
            }
            (None, None) => {
                format!("https://{}.s3.{}.amazonaws.com", config.bucket_name, config.region)
            }
        };
        let public_base_url = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .map_err(|e| BlobError::Permanent(format!("Invalid public base URL {}: {}", base, e)))?;

        Ok(Self {
            client,
            bucket_name: config.bucket_name.clone(),
            public_base_url,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        self.public_base_url
            .join(key)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.public_base_url, key))
    }

    pub async fn ensure_bucket_exists(&self) -> Result<(), BlobError> {
        if self.client.head_bucket().bucket(&self.bucket_name).send().await.is_err() {
            tracing::info!(
                bucket = %self.bucket_name,
                "Bucket does not exist, attempting to create it"
            );
            self.client
                .create_bucket()
                .bucket(&self.bucket_name)
                .send()
                .await
                .map_err(|e| {
                    BlobError::Permanent(format!(
                        "Failed to create bucket: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;
        }

        self.set_public_policy().await;
        Ok(())
    }

    /// Some S3-compatible providers reject bucket policies; that only costs us
    /// public reads, so it is logged and ignored.
    async fn set_public_policy(&self) {
        let policy = format!(
            r#"{{
                "Version": "2012-10-17",
                "Statement": [
                    {{
                        "Sid": "PublicReadIntakeObjects",
                        "Effect": "Allow",
                        "Principal": "*",
                        "Action": "s3:GetObject",
                        "Resource": "arn:aws:s3:::{}/intake/*"
                    }}
                ]
            }}"#,
            self.bucket_name
        );

        if let Err(e) = self
            .client
            .put_bucket_policy()
            .bucket(&self.bucket_name)
            .policy(policy)
            .send()
            .await
        {
            tracing::warn!(
                bucket = %self.bucket_name,
                error = %DisplayErrorContext(&e),
                "Failed to set bucket policy"
            );
        }
    }
}

fn classify_put_error(err: SdkError<PutObjectError>) -> BlobError {
    let message = format!("{}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            BlobError::Transient(message)
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            if status == 429 || status >= 500 {
                BlobError::Transient(message)
            } else {
                BlobError::Permanent(message)
            }
        }
        _ => BlobError::Permanent(message),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<StoredBlob, BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(&options.content_type)
            .content_disposition(&options.content_disposition)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(classify_put_error)?;

        Ok(StoredBlob {
            url: self.object_url(key),
            pathname: key.to_string(),
            content_type: options.content_type.clone(),
            content_disposition: options.content_disposition.clone(),
        })
    }
}
