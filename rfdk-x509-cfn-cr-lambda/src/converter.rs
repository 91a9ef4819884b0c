use async_trait::async_trait;
use rfdk_custom_resource::custom_resource::CustomResource;
use rfdk_custom_resource::secrets::SecretValue;
use serde_derive::Serialize;
use crate::common::X509Common;
use crate::properties::X509Pkcs12Properties;

pub const PKCS12_PURPOSE: &str = "CertificatePKCS12";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct X509Pkcs12Data {
    /// ARN of the binary secret holding the PKCS #12 bundle.
    pub cert: String,
}

/// Bundles an existing certificate, its chain and key into PKCS #12.
#[derive(Clone, Debug)]
pub struct X509ToPkcs12 {
    common: X509Common,
}

impl X509ToPkcs12 {
    pub fn new(common: X509Common) -> Self {
        X509ToPkcs12 { common }
    }
}

#[async_trait]
impl CustomResource for X509ToPkcs12 {
    type Properties = X509Pkcs12Properties;
    type Data = X509Pkcs12Data;

    async fn do_create(&self, physical_id: &str, props: X509Pkcs12Properties) -> anyhow::Result<X509Pkcs12Data> {
        self.common.check_permissions(&props.secret.tags).await?;

        let certificate = self.common.read_certificate(&props.certificate).await?;
        let passphrase = self.common.read_passphrase(&props.passphrase).await?;
        let pkcs12 = tokio::task::spawn_blocking(move || certificate.to_pkcs12(&passphrase)).await??;

        let cert = self
            .common
            .create_or_update_secret(physical_id, PKCS12_PURPOSE, &props.secret, SecretValue::Binary(pkcs12))
            .await?;
        Ok(X509Pkcs12Data { cert })
    }

    async fn do_delete(&self, physical_id: &str, _props: X509Pkcs12Properties) -> anyhow::Result<()> {
        self.common.delete_resources(physical_id).await
    }
}
