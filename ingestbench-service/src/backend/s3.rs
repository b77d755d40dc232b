use std::fmt;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;

use super::common::{
    Backend, BackendError, BackendResult, EntityTag, ObjectTarget, PutResponse, UploadId,
    UploadPart,
};

/// Content type of objects uploaded in parts.
const MULTIPART_CONTENT_TYPE: &str = "application/octet-stream";

/// Connection settings for an [`S3Backend`].
///
/// Credentials are not part of this configuration. They are resolved by the AWS SDK's default
/// provider chain (environment, profile, or the execution role of the function).
#[derive(Clone, Debug, Default)]
pub struct S3BackendConfig {
    /// AWS region of the bucket. Falls back to the SDK's region resolution if unset.
    pub region: Option<String>,
    /// Custom endpoint, e.g. `http://localhost:9000` for MinIO.
    pub endpoint: Option<String>,
    /// Address buckets as a path segment instead of a subdomain.
    pub path_style: bool,
}

/// A [`Backend`] sending requests to S3 or an S3-compatible service.
pub struct S3Backend {
    client: Client,
    region: Option<String>,
}

impl S3Backend {
    /// Creates a new backend, resolving credentials and region from the environment.
    pub async fn new(config: &S3BackendConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            region: sdk_config.region().map(|region| region.to_string()),
        }
    }
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

fn sdk_error<E>(operation: &'static str, cause: E) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BackendError::S3 {
        context: format!("{operation} failed: {}", DisplayErrorContext(&cause)),
        cause: Box::new(cause),
    }
}

fn missing(operation: &'static str, field: &str) -> BackendError {
    BackendError::MalformedResponse {
        context: format!("{operation} returned no {field}"),
    }
}

fn sdk_part_number(part_number: u32) -> BackendResult<i32> {
    i32::try_from(part_number).map_err(|_| BackendError::Rejected {
        context: format!("part number {part_number} is out of range"),
    })
}

#[async_trait::async_trait]
impl Backend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[tracing::instrument(level = "trace", fields(%target), skip_all)]
    async fn put_object(
        &self,
        target: &ObjectTarget,
        content_type: &str,
        payload: Bytes,
    ) -> BackendResult<PutResponse> {
        tracing::debug!(bytes = payload.len(), "Writing object to s3");
        let output = self
            .client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .content_type(content_type)
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|err| sdk_error("put_object", err))?;

        Ok(PutResponse {
            entity_tag: output.e_tag().map(EntityTag::new),
        })
    }

    #[tracing::instrument(level = "trace", fields(%target), skip_all)]
    async fn initiate_upload(&self, target: &ObjectTarget) -> BackendResult<UploadId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .content_type(MULTIPART_CONTENT_TYPE)
            .send()
            .await
            .map_err(|err| sdk_error("create_multipart_upload", err))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| missing("create_multipart_upload", "upload id"))?;
        Ok(UploadId::new(upload_id))
    }

    #[tracing::instrument(level = "trace", fields(%target, part_number), skip_all)]
    async fn upload_part(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        part_number: u32,
        payload: Bytes,
    ) -> BackendResult<EntityTag> {
        let content_length = payload.len() as i64;
        let output = self
            .client
            .upload_part()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(upload_id.as_str())
            .part_number(sdk_part_number(part_number)?)
            .content_length(content_length)
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|err| sdk_error("upload_part", err))?;

        let entity_tag = output.e_tag().ok_or_else(|| missing("upload_part", "ETag"))?;
        Ok(EntityTag::new(entity_tag))
    }

    #[tracing::instrument(level = "trace", fields(%target, parts = parts.len()), skip_all)]
    async fn complete_upload(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        parts: &[UploadPart],
    ) -> BackendResult<String> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .part_number(sdk_part_number(part.part_number)?)
                    .e_tag(part.entity_tag.as_str())
                    .build())
            })
            .collect::<BackendResult<Vec<_>>>()?;

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(upload_id.as_str())
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| sdk_error("complete_multipart_upload", err))?;

        Ok(output
            .location()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("s3://{target}")))
    }

    #[tracing::instrument(level = "trace", fields(%target), skip_all)]
    async fn abort_upload(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
    ) -> BackendResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(|err| sdk_error("abort_multipart_upload", err))?;

        Ok(())
    }
}
