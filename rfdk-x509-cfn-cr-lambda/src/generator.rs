use async_trait::async_trait;
use rfdk_custom_resource::custom_resource::{CustomResource, ValidationError};
use rfdk_custom_resource::secrets::SecretValue;
use rfdk_x509::Certificate;
use serde_derive::Serialize;
use serde_json::Value;
use tracing::info;
use crate::common::X509Common;
use crate::properties::X509GeneratorProperties;

pub const CERTIFICATE_PURPOSE: &str = "Certificate";
pub const PRIVATE_KEY_PURPOSE: &str = "Private Key";
pub const CERTIFICATE_CHAIN_PURPOSE: &str = "Certificate Chain";

/// Secret ARNs of the generated certificate, key and chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct X509GeneratorData {
    pub cert: String,
    pub key: String,
    pub cert_chain: String,
}

#[derive(Clone, Debug)]
pub struct X509Generator {
    common: X509Common,
}

impl X509Generator {
    pub fn new(common: X509Common) -> Self {
        X509Generator { common }
    }
}

#[async_trait]
impl CustomResource for X509Generator {
    type Properties = X509GeneratorProperties;
    type Data = X509GeneratorData;

    fn validate_input(&self, properties: &Value) -> Result<Self::Properties, ValidationError> {
        let props: X509GeneratorProperties =
            serde_json::from_value(properties.clone()).map_err(|e| ValidationError(e.to_string()))?;
        if !props.distinguished_name.is_valid() {
            return Err(ValidationError(format!(
                "DistinguishedName fields may not contain '/': {}",
                props.distinguished_name
            )));
        }
        props.valid_days().map_err(ValidationError)?;
        Ok(props)
    }

    async fn do_create(&self, physical_id: &str, props: X509GeneratorProperties) -> anyhow::Result<X509GeneratorData> {
        self.common.check_permissions(&props.secret.tags).await?;

        let passphrase = self.common.read_passphrase(&props.passphrase).await?;
        let signing_certificate = match &props.signing_certificate {
            Some(arns) => Some(self.common.read_certificate(arns).await?),
            None => None,
        };
        let valid_days = props.valid_days().map_err(anyhow::Error::msg)?;
        let subject = props.distinguished_name.clone();
        // Key generation is CPU bound.
        let certificate = tokio::task::spawn_blocking(move || {
            Certificate::from_generated(&subject, &passphrase, valid_days, signing_certificate.as_ref())
        })
        .await??;
        info!("generated certificate for {}", &props.distinguished_name);

        let cert = self
            .common
            .create_or_update_secret(
                physical_id,
                CERTIFICATE_PURPOSE,
                &props.secret,
                SecretValue::Text(certificate.cert.clone()),
            )
            .await?;
        let key = self
            .common
            .create_or_update_secret(
                physical_id,
                PRIVATE_KEY_PURPOSE,
                &props.secret,
                SecretValue::Text(certificate.key.clone()),
            )
            .await?;
        let cert_chain = self
            .common
            .create_or_update_secret(
                physical_id,
                CERTIFICATE_CHAIN_PURPOSE,
                &props.secret,
                SecretValue::Text(certificate.cert_chain.clone()),
            )
            .await?;

        Ok(X509GeneratorData { cert, key, cert_chain })
    }

    async fn do_delete(&self, physical_id: &str, _props: X509GeneratorProperties) -> anyhow::Result<()> {
        self.common.delete_resources(physical_id).await
    }
}
