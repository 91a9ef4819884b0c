use rfdk_custom_resource::tag::Tag;
use rfdk_x509::DistinguishedName;
use serde_derive::{Deserialize, Serialize};

/// Where and how a generated secret is stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretProperties {
    pub name_prefix: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Secret ARNs holding an existing certificate's material.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateSecretArns {
    pub cert: String,
    pub key: String,
    pub passphrase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct X509GeneratorProperties {
    pub distinguished_name: DistinguishedName,
    /// ARN of the secret holding the new key's passphrase.
    pub passphrase: String,
    pub secret: SecretProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_certificate: Option<CertificateSecretArns>,
    /// Days, as CloudFormation passes numbers to custom resources as strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_valid_for: Option<String>,
}

impl X509GeneratorProperties {
    pub fn valid_days(&self) -> Result<Option<u32>, String> {
        match &self.certificate_valid_for {
            None => Ok(None),
            Some(days) => match days.trim().parse::<u32>() {
                Ok(d) if d > 0 => Ok(Some(d)),
                _ => Err(format!("CertificateValidFor must be a positive whole number of days, got '{}'", days)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct X509Pkcs12Properties {
    pub certificate: CertificateSecretArns,
    /// ARN of the secret holding the bundle passphrase.
    pub passphrase: String,
    pub secret: SecretProperties,
}
