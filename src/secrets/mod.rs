//! Secrets: the secondary resource most custom resources create.
mod aws;
mod memory;

use std::fmt;
use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use crate::tag::Tag;

pub use self::aws::SecretsManagerStore;
pub use memory::MemorySecretsStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretsError {
    #[error("access denied to secret {arn}: {message}")]
    AccessDenied { arn: String, message: String },
    #[error("secret {0} was not found")]
    NotFound(String),
    #[error("a secret named {0} already exists")]
    AlreadyExists(String),
    #[error("secret {arn} has no {expected} value")]
    UnexpectedFormat { arn: String, expected: &'static str },
    #[error("secret {arn} does not contain a PEM encoded certificate")]
    NotACertificate { arn: String },
    #[error("{operation} failed: {message}")]
    Service { operation: &'static str, message: String },
}

#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    Text(String),
    Binary(Bytes),
}

// Secret contents never appear in logs.
impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Text(s) => write!(f, "Text(<{} bytes redacted>)", s.len()),
            SecretValue::Binary(b) => write!(f, "Binary(<{} bytes redacted>)", b.len()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CreateSecretRequest {
    pub name: String,
    pub description: String,
    pub value: SecretValue,
    /// KMS key used to encrypt the secret; the account default when `None`.
    pub encryption_key: Option<String>,
    pub tags: Vec<Tag>,
}

#[async_trait]
pub trait SecretsStore: Send + Sync + fmt::Debug {
    /// Creates the secret and returns its ARN.
    async fn create_secret(&self, request: CreateSecretRequest) -> Result<String, SecretsError>;

    async fn put_secret_value(&self, arn: &str, value: SecretValue) -> Result<(), SecretsError>;

    async fn get_secret_value(&self, arn: &str) -> Result<SecretValue, SecretsError>;

    /// `force` skips the recovery window.
    async fn delete_secret(&self, arn: &str, force: bool) -> Result<(), SecretsError>;
}

lazy_static! {
    static ref INVALID_SECRET_NAME_CHARS: Regex = Regex::new(r"[^A-Za-z0-9/_+=.@-]").unwrap();
    static ref PEM_CERTIFICATE: Regex =
        Regex::new(r"-----BEGIN CERTIFICATE-----[\s\S]+?-----END CERTIFICATE-----").unwrap();
}

/// Secret names may only hold ASCII letters, digits and `/_+=.@-`.
pub fn sanitize_secret_name(name: &str) -> String {
    INVALID_SECRET_NAME_CHARS.replace_all(name, "").into_owned()
}

pub async fn read_text_secret(store: &dyn SecretsStore, arn: &str) -> Result<String, SecretsError> {
    match store.get_secret_value(arn).await? {
        SecretValue::Text(s) => Ok(s),
        SecretValue::Binary(_) => Err(SecretsError::UnexpectedFormat {
            arn: arn.to_string(),
            expected: "string",
        }),
    }
}

pub async fn read_binary_secret(store: &dyn SecretsStore, arn: &str) -> Result<Bytes, SecretsError> {
    match store.get_secret_value(arn).await? {
        SecretValue::Binary(b) => Ok(b),
        SecretValue::Text(_) => Err(SecretsError::UnexpectedFormat {
            arn: arn.to_string(),
            expected: "binary",
        }),
    }
}

/// Reads a text secret that must hold at least one PEM certificate.
pub async fn read_certificate_data(store: &dyn SecretsStore, arn: &str) -> Result<String, SecretsError> {
    let data = read_text_secret(store, arn).await?;
    if !PEM_CERTIFICATE.is_match(&data) {
        return Err(SecretsError::NotACertificate { arn: arn.to_string() });
    }
    Ok(data)
}

/// Reads a certificate chain secret. Certificates without issuers have a
/// blank chain, which is returned as is; anything else must hold PEM.
pub async fn read_certificate_chain(store: &dyn SecretsStore, arn: &str) -> Result<String, SecretsError> {
    let data = read_text_secret(store, arn).await?;
    if !data.trim().is_empty() && !PEM_CERTIFICATE.is_match(&data) {
        return Err(SecretsError::NotACertificate { arn: arn.to_string() });
    }
    Ok(data)
}
