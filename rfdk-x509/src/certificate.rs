use std::fmt;
use std::string::FromUtf8Error;
use bytes::Bytes;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::extension::{
    AuthorityKeyIdentifier,
    BasicConstraints,
    KeyUsage,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509, X509Builder, X509Req, X509ReqBuilder};
use thiserror::Error;
#[cfg(feature = "tracing")]
use tracing::debug;
use crate::distinguished_name::DistinguishedName;
use crate::serial_number::random_serial;
use crate::validity::Validity;

pub const RSA_KEY_BITS: u32 = 2048;
/// Three years.
pub const DEFAULT_VALID_DAYS: u32 = 1095;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Invalid distinguished name '{0}': fields may not contain '/'")]
    InvalidDistinguishedName(String),
    #[error("Certificate validity must be at least one day")]
    InvalidValidity,
    #[error("A passphrase is required to protect the private key")]
    EmptyPassphrase,
    #[error("Signing key does not match the signing certificate")]
    SigningKeyMismatch,
    #[error("Failed to {operation}: {source}")]
    OpenSsl {
        operation: &'static str,
        #[source]
        source: ErrorStack,
    },
    #[error("PEM output was not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

trait Context<T> {
    fn context(self, operation: &'static str) -> Result<T, CertificateError>;
}

impl<T> Context<T> for Result<T, ErrorStack> {
    fn context(self, operation: &'static str) -> Result<T, CertificateError> {
        self.map_err(|source| CertificateError::OpenSsl { operation, source })
    }
}

/// PEM certificate, its passphrase-encrypted private key, and the chain of
/// issuers above it. `cert_chain` is empty for self-signed certificates.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub cert: String,
    pub key: String,
    pub passphrase: String,
    pub cert_chain: String,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("cert", &self.cert)
            .field("key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("cert_chain", &self.cert_chain)
            .finish()
    }
}

fn check_inputs(subject: &DistinguishedName, passphrase: &str, valid_days: u32) -> Result<(), CertificateError> {
    if !subject.is_valid() {
        return Err(CertificateError::InvalidDistinguishedName(subject.to_string()));
    }
    if passphrase.is_empty() {
        return Err(CertificateError::EmptyPassphrase);
    }
    if valid_days == 0 {
        return Err(CertificateError::InvalidValidity);
    }
    Ok(())
}

fn new_key_pair() -> Result<PKey<Private>, CertificateError> {
    let rsa = Rsa::generate(RSA_KEY_BITS).context("generate RSA key")?;
    PKey::from_rsa(rsa).context("wrap RSA key")
}

fn encrypt_key(pkey: &PKey<Private>, passphrase: &str) -> Result<String, CertificateError> {
    let pem = pkey
        .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())
        .context("encrypt private key")?;
    Ok(String::from_utf8(pem)?)
}

fn read_key(key_pem: &str, passphrase: &str) -> Result<PKey<Private>, CertificateError> {
    PKey::private_key_from_pem_passphrase(key_pem.as_bytes(), passphrase.as_bytes())
        .context("decrypt private key")
}

// Version, serial, validity and public key; names and extensions are left
// to the caller.
fn base_builder(pkey: &PKey<Private>, valid_days: u32) -> Result<X509Builder, CertificateError> {
    let mut builder = X509::builder().context("create certificate")?;
    builder.set_version(2).context("set certificate version")?;
    let serial = random_serial().context("generate serial number")?;
    builder.set_serial_number(&serial).context("set serial number")?;
    let (not_before, not_after) = Validity::days_from_now(valid_days)
        .to_asn1()
        .context("encode validity")?;
    builder.set_not_before(&not_before).context("set validity")?;
    builder.set_not_after(&not_after).context("set validity")?;
    builder.set_pubkey(pkey).context("set public key")?;
    Ok(builder)
}

fn to_pem(cert: &X509) -> Result<String, CertificateError> {
    let pem = cert.to_pem().context("encode certificate")?;
    Ok(String::from_utf8(pem)?)
}

fn signing_request(subject: &DistinguishedName, pkey: &PKey<Private>) -> Result<X509Req, CertificateError> {
    let name = subject.to_x509_name().context("encode subject")?;
    let mut req = X509ReqBuilder::new().context("create signing request")?;
    req.set_subject_name(&name).context("set request subject")?;
    req.set_pubkey(pkey).context("set request public key")?;
    req.sign(pkey, MessageDigest::sha256()).context("sign request")?;
    Ok(req.build())
}

impl Certificate {
    /// Fresh RSA key pair and a CA certificate that signs itself.
    pub fn generate_self_signed(
        subject: &DistinguishedName,
        passphrase: &str,
        valid_days: u32,
    ) -> Result<Certificate, CertificateError> {
        check_inputs(subject, passphrase, valid_days)?;
        #[cfg(feature = "tracing")]
        debug!("generating self-signed certificate for {}", subject);

        let pkey = new_key_pair()?;
        let name = subject.to_x509_name().context("encode subject")?;
        let mut builder = base_builder(&pkey, valid_days)?;
        builder.set_subject_name(&name).context("set subject")?;
        builder.set_issuer_name(&name).context("set issuer")?;
        let basic_constraints = BasicConstraints::new()
            .critical()
            .ca()
            .build()
            .context("build basic constraints")?;
        builder.append_extension(basic_constraints).context("add basic constraints")?;
        let key_usage = KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()
            .context("build key usage")?;
        builder.append_extension(key_usage).context("add key usage")?;
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .context("build subject key identifier")?;
        builder.append_extension(ski).context("add subject key identifier")?;
        builder.sign(&pkey, MessageDigest::sha256()).context("sign certificate")?;

        Ok(Certificate {
            cert: to_pem(&builder.build())?,
            key: encrypt_key(&pkey, passphrase)?,
            passphrase: passphrase.to_string(),
            cert_chain: String::new(),
        })
    }

    /// Fresh RSA key pair whose certificate is issued by `signing_certificate`.
    /// The chain is the signer's certificate followed by the signer's chain.
    pub fn generate_signed(
        subject: &DistinguishedName,
        passphrase: &str,
        valid_days: u32,
        signing_certificate: &Certificate,
    ) -> Result<Certificate, CertificateError> {
        check_inputs(subject, passphrase, valid_days)?;
        #[cfg(feature = "tracing")]
        debug!("generating certificate for {} signed by a CA", subject);

        let ca_cert = X509::from_pem(signing_certificate.cert.as_bytes()).context("read signing certificate")?;
        let ca_key = read_key(&signing_certificate.key, &signing_certificate.passphrase)?;
        let ca_public = ca_cert.public_key().context("read signing certificate public key")?;
        if !ca_public.public_eq(&ca_key) {
            return Err(CertificateError::SigningKeyMismatch);
        }

        let pkey = new_key_pair()?;
        let req = signing_request(subject, &pkey)?;
        let mut builder = base_builder(&pkey, valid_days)?;
        builder.set_subject_name(req.subject_name()).context("set subject")?;
        builder.set_issuer_name(ca_cert.subject_name()).context("set issuer")?;
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(&*ca_cert), None))
            .context("build subject key identifier")?;
        builder.append_extension(ski).context("add subject key identifier")?;
        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(&*ca_cert), None))
            .context("build authority key identifier")?;
        builder.append_extension(aki).context("add authority key identifier")?;
        builder.sign(&ca_key, MessageDigest::sha256()).context("sign certificate")?;

        Ok(Certificate {
            cert: to_pem(&builder.build())?,
            key: encrypt_key(&pkey, passphrase)?,
            passphrase: passphrase.to_string(),
            cert_chain: format!("{}{}", signing_certificate.cert, signing_certificate.cert_chain),
        })
    }

    /// Self-signed without a signer, signed by it otherwise.
    pub fn from_generated(
        subject: &DistinguishedName,
        passphrase: &str,
        valid_days: Option<u32>,
        signing_certificate: Option<&Certificate>,
    ) -> Result<Certificate, CertificateError> {
        let valid_days = valid_days.unwrap_or(DEFAULT_VALID_DAYS);
        match signing_certificate {
            Some(signer) => Self::generate_signed(subject, passphrase, valid_days, signer),
            None => Self::generate_self_signed(subject, passphrase, valid_days),
        }
    }

    /// Unencrypted PKCS#8 PEM of an encrypted private key.
    pub fn decrypt_key(key_pem: &str, passphrase: &str) -> Result<String, CertificateError> {
        let pkey = read_key(key_pem, passphrase)?;
        let pem = pkey.private_key_to_pem_pkcs8().context("encode private key")?;
        Ok(String::from_utf8(pem)?)
    }

    /// DER PKCS#12 bundle of the certificate, its chain and its key,
    /// protected by `passphrase`.
    pub fn to_pkcs12(&self, passphrase: &str) -> Result<Bytes, CertificateError> {
        if passphrase.is_empty() {
            return Err(CertificateError::EmptyPassphrase);
        }
        let cert = X509::from_pem(self.cert.as_bytes()).context("read certificate")?;
        let pkey = read_key(&self.key, &self.passphrase)?;
        let mut ca = Stack::new().context("create certificate stack")?;
        if !self.cert_chain.trim().is_empty() {
            for chained in X509::stack_from_pem(self.cert_chain.as_bytes()).context("read certificate chain")? {
                ca.push(chained).context("add chain certificate")?;
            }
        }
        let mut builder = Pkcs12::builder();
        builder.pkey(&pkey);
        builder.cert(&cert);
        builder.ca(ca);
        let pkcs12 = builder.build2(passphrase).context("build PKCS #12 bundle")?;
        let der = pkcs12.to_der().context("encode PKCS #12 bundle")?;
        Ok(Bytes::from(der))
    }
}
