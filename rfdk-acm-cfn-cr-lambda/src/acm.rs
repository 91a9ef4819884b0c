use std::fmt;
use async_trait::async_trait;
use aws_sdk_acm as acm;
use acm::error::{ProvideErrorMetadata, SdkError};
use acm::primitives::Blob;
use rfdk_custom_resource::tag::Tag;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcmError {
    #[error("{operation} was throttled: {message}")]
    Throttled { operation: &'static str, message: String },
    #[error("{operation} was denied: {message}")]
    AccessDenied { operation: &'static str, message: String },
    #[error("certificate {0} was not found")]
    NotFound(String),
    #[error("{operation} failed: {message}")]
    Service { operation: &'static str, message: String },
}

#[derive(Clone)]
pub struct ImportCertificateRequest {
    /// Re-import over this certificate instead of creating a new one.
    pub certificate_arn: Option<String>,
    pub certificate: String,
    pub private_key: String,
    pub certificate_chain: Option<String>,
    /// Only applied to new certificates; ACM rejects tags on re-import.
    pub tags: Vec<Tag>,
}

impl fmt::Debug for ImportCertificateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportCertificateRequest")
            .field("certificate_arn", &self.certificate_arn)
            .field("private_key", &"<redacted>")
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// The slice of ACM the importer needs.
#[async_trait]
pub trait CertificateManager: Send + Sync + fmt::Debug {
    /// Returns the ARN of the imported certificate.
    async fn import_certificate(&self, request: ImportCertificateRequest) -> Result<String, AcmError>;

    /// Succeeds when the certificate exists.
    async fn get_certificate(&self, arn: &str) -> Result<(), AcmError>;

    /// ARNs of the resources using the certificate.
    async fn in_use_by(&self, arn: &str) -> Result<Vec<String>, AcmError>;

    async fn delete_certificate(&self, arn: &str) -> Result<(), AcmError>;
}

#[derive(Clone, Debug)]
pub struct AcmClient {
    client: acm::Client,
}

impl AcmClient {
    pub fn new(client: acm::Client) -> Self {
        AcmClient { client }
    }
}

fn classify<E>(operation: &'static str, arn: &str, err: SdkError<E>) -> AcmError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let message = err
        .as_service_error()
        .and_then(|e| e.message())
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    match code.as_deref() {
        Some("ThrottlingException") => AcmError::Throttled { operation, message },
        Some("AccessDeniedException") => AcmError::AccessDenied { operation, message },
        Some("ResourceNotFoundException") => AcmError::NotFound(arn.to_string()),
        _ => AcmError::Service { operation, message },
    }
}

#[async_trait]
impl CertificateManager for AcmClient {
    async fn import_certificate(&self, request: ImportCertificateRequest) -> Result<String, AcmError> {
        let tags = if request.certificate_arn.is_some() || request.tags.is_empty() {
            None
        } else {
            Some(
                request
                    .tags
                    .iter()
                    .map(|t| acm::types::Tag::builder().key(&t.key).value(&t.value).build())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| AcmError::Service {
                        operation: "ImportCertificate",
                        message: e.to_string(),
                    })?,
            )
        };
        let arn = request.certificate_arn.clone().unwrap_or_default();
        let output = self
            .client
            .import_certificate()
            .set_certificate_arn(request.certificate_arn)
            .certificate(Blob::new(request.certificate))
            .private_key(Blob::new(request.private_key))
            .set_certificate_chain(request.certificate_chain.map(Blob::new))
            .set_tags(tags)
            .send()
            .await
            .map_err(|e| classify("ImportCertificate", &arn, e))?;
        output
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| AcmError::Service {
                operation: "ImportCertificate",
                message: "Expected certificate ARN was unavailable after importing certificate".to_string(),
            })
    }

    async fn get_certificate(&self, arn: &str) -> Result<(), AcmError> {
        self.client
            .get_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|e| classify("GetCertificate", arn, e))?;
        Ok(())
    }

    async fn in_use_by(&self, arn: &str) -> Result<Vec<String>, AcmError> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|e| classify("DescribeCertificate", arn, e))?;
        let in_use_by = output
            .certificate()
            .map(|detail| detail.in_use_by().to_vec())
            .unwrap_or_default();
        debug!("{} in use by {} resources", arn, in_use_by.len());
        Ok(in_use_by)
    }

    async fn delete_certificate(&self, arn: &str) -> Result<(), AcmError> {
        self.client
            .delete_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|e| classify("DeleteCertificate", arn, e))?;
        Ok(())
    }
}
