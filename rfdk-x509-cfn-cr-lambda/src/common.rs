use std::sync::Arc;
use anyhow::{anyhow, Context};
use aws_config::SdkConfig;
use aws_sdk_dynamodb as dynamodb;
use aws_sdk_secretsmanager as secretsmanager;
use rfdk_custom_resource::config::HandlerSettings;
use rfdk_custom_resource::custom_resource::{database_permissions_check, secrets_permissions_check};
use rfdk_custom_resource::dynamodb::{CompositeStringIndexTable, DynamoDbBackend, PutItemArgs};
use rfdk_custom_resource::secrets::{
    read_certificate_chain,
    read_certificate_data,
    read_text_secret,
    sanitize_secret_name,
    CreateSecretRequest,
    SecretValue,
    SecretsError,
    SecretsManagerStore,
    SecretsStore,
};
use rfdk_custom_resource::tag::Tag;
use rfdk_x509::Certificate;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use crate::properties::{CertificateSecretArns, SecretProperties};

/// Bookkeeping attribute holding the secret ARN.
pub const ARN_ATTRIBUTE: &str = "ARN";

/// State shared by the X.509 custom resources: the bookkeeping table and the
/// secrets store every generated artifact lands in.
#[derive(Clone, Debug)]
pub struct X509Common {
    table: CompositeStringIndexTable,
    secrets: Arc<dyn SecretsStore>,
    debug: bool,
}

impl X509Common {
    pub fn new(table: CompositeStringIndexTable, secrets: Arc<dyn SecretsStore>, debug: bool) -> Self {
        X509Common { table, secrets, debug }
    }

    /// Attaches to the table named by `DATABASE` with AWS clients.
    pub async fn connect(aws_config: &SdkConfig, settings: &HandlerSettings) -> anyhow::Result<Self> {
        let table_name = settings.require_table_name()?;
        let backend = Arc::new(DynamoDbBackend::new(dynamodb::Client::new(aws_config)));
        let table = CompositeStringIndexTable::from_existing(backend, table_name).await?;
        let secrets = Arc::new(SecretsManagerStore::new(secretsmanager::Client::new(aws_config)));
        Ok(X509Common::new(table, secrets, settings.debug))
    }

    pub fn secrets(&self) -> &dyn SecretsStore {
        self.secrets.as_ref()
    }

    pub async fn check_permissions(&self, tags: &[Tag]) -> anyhow::Result<()> {
        secrets_permissions_check(self.secrets(), tags, self.debug).await?;
        database_permissions_check(&self.table, self.debug).await?;
        Ok(())
    }

    pub async fn read_passphrase(&self, arn: &str) -> anyhow::Result<String> {
        read_text_secret(self.secrets(), arn)
            .await
            .with_context(|| format!("Failed to read passphrase from {}", arn))
    }

    /// Loads certificate material whose parts live in separate secrets. An
    /// empty chain ARN counts as no chain.
    pub async fn read_certificate(&self, arns: &CertificateSecretArns) -> anyhow::Result<Certificate> {
        let cert = read_certificate_data(self.secrets(), &arns.cert).await?;
        let key = read_text_secret(self.secrets(), &arns.key).await?;
        let passphrase = self.read_passphrase(&arns.passphrase).await?;
        let cert_chain = match arns.cert_chain.as_deref().filter(|arn| !arn.is_empty()) {
            Some(arn) => read_certificate_chain(self.secrets(), arn).await?,
            None => String::new(),
        };
        Ok(Certificate {
            cert,
            key,
            passphrase,
            cert_chain,
        })
    }

    /// Stores `value` as the `purpose` secret of `physical_id`. A secret
    /// already recorded for that pair gets a new value; otherwise a new secret
    /// is created and recorded. Returns the secret ARN.
    pub async fn create_or_update_secret(
        &self,
        physical_id: &str,
        purpose: &str,
        secret: &SecretProperties,
        value: SecretValue,
    ) -> anyhow::Result<String> {
        if let Some(arn) = self.recorded_arn(physical_id, purpose).await? {
            info!("updating existing {} secret {}", purpose, &arn);
            self.secrets
                .put_secret_value(&arn, value)
                .await
                .with_context(|| format!("Failed to update {} secret {}", purpose, &arn))?;
            return Ok(arn);
        }

        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let name = sanitize_secret_name(&format!("{}-X.509-{}-{}", &secret.name_prefix, purpose, timestamp));
        let arn = self
            .secrets
            .create_secret(CreateSecretRequest {
                name,
                description: secret.description.clone(),
                value: value.clone(),
                encryption_key: secret.encryption_key.clone(),
                tags: secret.tags.clone(),
            })
            .await
            .with_context(|| format!("Failed to create {} secret", purpose))?;
        info!("created {} secret {}", purpose, &arn);

        let recorded = self
            .table
            .put_item(PutItemArgs::new(physical_id, purpose).attribute(ARN_ATTRIBUTE, &arn))
            .await?;
        if recorded {
            return Ok(arn);
        }

        // A concurrent invocation recorded its secret first; keep that one.
        warn!("{} secret for {} was recorded concurrently; discarding {}", purpose, physical_id, &arn);
        self.secrets.delete_secret(&arn, true).await?;
        let winner = self
            .recorded_arn(physical_id, purpose)
            .await?
            .ok_or_else(|| anyhow!("Record for {} ({}) vanished after a conflicting write", physical_id, purpose))?;
        self.secrets.put_secret_value(&winner, value).await?;
        Ok(winner)
    }

    async fn recorded_arn(&self, physical_id: &str, purpose: &str) -> anyhow::Result<Option<String>> {
        match self.table.get_item(physical_id, purpose).await? {
            None => Ok(None),
            Some(attributes) => attributes
                .get(ARN_ATTRIBUTE)
                .cloned()
                .map(Some)
                .ok_or_else(|| anyhow!("Record for {} ({}) has no {}", physical_id, purpose, ARN_ATTRIBUTE)),
        }
    }

    /// Force-deletes every secret recorded under `physical_id` and then its
    /// record. Secrets already gone, or that cannot be deleted for lack of
    /// permission, are logged and skipped.
    pub async fn delete_resources(&self, physical_id: &str) -> anyhow::Result<()> {
        let records = self.table.query(physical_id, Some(25)).await?;
        for (purpose, attributes) in records {
            info!("deleting {} resource for {}", &purpose, physical_id);
            if let Some(arn) = attributes.get(ARN_ATTRIBUTE) {
                match self.secrets.delete_secret(arn, true).await {
                    Ok(()) => {}
                    Err(SecretsError::NotFound(_)) => info!("secret {} was already deleted", arn),
                    Err(SecretsError::AccessDenied { .. }) => {
                        warn!("Could not delete Secret {}. Please ensure it has been deleted.", arn)
                    }
                    Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to delete secret {}", arn))),
                }
            }
            self.table.delete_item(physical_id, &purpose).await?;
        }
        Ok(())
    }
}
