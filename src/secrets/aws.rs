use async_trait::async_trait;
use aws_sdk_secretsmanager as secretsmanager;
use bytes::Bytes;
use secretsmanager::error::{ProvideErrorMetadata, SdkError};
use secretsmanager::primitives::Blob;
use tracing::debug;
use super::{CreateSecretRequest, SecretValue, SecretsError, SecretsStore};

/// `SecretsStore` over AWS Secrets Manager.
#[derive(Clone, Debug)]
pub struct SecretsManagerStore {
    client: secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(client: secretsmanager::Client) -> Self {
        SecretsManagerStore { client }
    }
}

fn classify<E>(operation: &'static str, id: &str, err: SdkError<E>) -> SecretsError
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
        Some("AccessDeniedException") => SecretsError::AccessDenied {
            arn: id.to_string(),
            message,
        },
        Some("ResourceNotFoundException") => SecretsError::NotFound(id.to_string()),
        Some("ResourceExistsException") => SecretsError::AlreadyExists(id.to_string()),
        _ => SecretsError::Service { operation, message },
    }
}

#[async_trait]
impl SecretsStore for SecretsManagerStore {
    async fn create_secret(&self, request: CreateSecretRequest) -> Result<String, SecretsError> {
        let tags = request
            .tags
            .iter()
            .map(|t| secretsmanager::types::Tag::builder().key(&t.key).value(&t.value).build())
            .collect::<Vec<_>>();
        let mut create = self
            .client
            .create_secret()
            .name(&request.name)
            .description(&request.description)
            .set_kms_key_id(request.encryption_key.clone())
            .set_tags(if tags.is_empty() { None } else { Some(tags) });
        create = match request.value {
            SecretValue::Text(s) => create.secret_string(s),
            SecretValue::Binary(b) => create.secret_binary(Blob::new(b.to_vec())),
        };
        let output = create
            .send()
            .await
            .map_err(|e| classify("CreateSecret", &request.name, e))?;
        let arn = output.arn().ok_or_else(|| SecretsError::Service {
            operation: "CreateSecret",
            message: format!("no ARN returned for secret {}", &request.name),
        })?;
        debug!("created secret {}", arn);
        Ok(arn.to_string())
    }

    async fn put_secret_value(&self, arn: &str, value: SecretValue) -> Result<(), SecretsError> {
        let put = self.client.put_secret_value().secret_id(arn);
        let put = match value {
            SecretValue::Text(s) => put.secret_string(s),
            SecretValue::Binary(b) => put.secret_binary(Blob::new(b.to_vec())),
        };
        put.send()
            .await
            .map_err(|e| classify("PutSecretValue", arn, e))?;
        Ok(())
    }

    async fn get_secret_value(&self, arn: &str) -> Result<SecretValue, SecretsError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(arn)
            .send()
            .await
            .map_err(|e| classify("GetSecretValue", arn, e))?;
        if let Some(s) = output.secret_string() {
            return Ok(SecretValue::Text(s.to_string()));
        }
        if let Some(b) = output.secret_binary() {
            return Ok(SecretValue::Binary(Bytes::copy_from_slice(b.as_ref())));
        }
        Err(SecretsError::UnexpectedFormat {
            arn: arn.to_string(),
            expected: "string or binary",
        })
    }

    async fn delete_secret(&self, arn: &str, force: bool) -> Result<(), SecretsError> {
        self.client
            .delete_secret()
            .secret_id(arn)
            .force_delete_without_recovery(force)
            .send()
            .await
            .map_err(|e| classify("DeleteSecret", arn, e))?;
        Ok(())
    }
}
