//! Shared plumbing for the local certificate tools.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use rfdk_x509::{Certificate, DistinguishedName};
use thiserror::Error;

pub const PASSPHRASE_ENV: &str = "RFDK_PASSPHRASE";
pub const SIGNER_PASSPHRASE_ENV: &str = "RFDK_SIGNER_PASSPHRASE";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("environment variable {0} must hold the passphrase")]
    MissingPassphrase(String),
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Certificate(#[from] rfdk_x509::CertificateError),
}

/// Passphrases are only ever taken from the environment so they stay out of
/// shell history and process listings.
pub fn passphrase_from_env(var: &str) -> Result<String, CliError> {
    lookup_passphrase(var, |name| std::env::var(name).ok())
}

fn lookup_passphrase<F>(var: &str, lookup: F) -> Result<String, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CliError::MissingPassphrase(var.to_string()))
}

pub fn subject(common_name: String, organization: Option<String>, unit: Option<String>) -> DistinguishedName {
    let mut dn = DistinguishedName::new(common_name);
    dn.o = organization;
    dn.ou = unit;
    dn
}

pub fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_file(path: PathBuf, contents: &[u8]) -> Result<PathBuf, CliError> {
    match fs::write(&path, contents) {
        Ok(()) => Ok(path),
        Err(source) => Err(CliError::Write { path, source }),
    }
}

/// Loads `<name>.crt`, `<name>.key` and, when present, `<name>.chain.pem`.
pub fn read_certificate(dir: &Path, name: &str, passphrase: String) -> Result<Certificate, CliError> {
    let chain_path = dir.join(format!("{}.chain.pem", name));
    let cert_chain = if chain_path.exists() {
        read_file(&chain_path)?
    } else {
        String::new()
    };
    Ok(Certificate {
        cert: read_file(&dir.join(format!("{}.crt", name)))?,
        key: read_file(&dir.join(format!("{}.key", name)))?,
        passphrase,
        cert_chain,
    })
}

/// Writes the certificate, its encrypted key and any chain next to each
/// other, returning the paths written.
pub fn write_certificate(dir: &Path, name: &str, certificate: &Certificate) -> Result<Vec<PathBuf>, CliError> {
    fs::create_dir_all(dir).map_err(|source| CliError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = vec![
        write_file(dir.join(format!("{}.crt", name)), certificate.cert.as_bytes())?,
        write_file(dir.join(format!("{}.key", name)), certificate.key.as_bytes())?,
    ];
    if !certificate.cert_chain.is_empty() {
        written.push(write_file(
            dir.join(format!("{}.chain.pem", name)),
            certificate.cert_chain.as_bytes(),
        )?);
    }
    Ok(written)
}
