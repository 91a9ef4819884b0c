//! X.509 material for custom resources: RSA key pairs, self-signed and
//! CA-signed certificates, key decryption and PKCS#12 bundles.
pub mod certificate;
pub mod distinguished_name;
mod serial_number;
mod validity;

pub use certificate::{Certificate, CertificateError, DEFAULT_VALID_DAYS, RSA_KEY_BITS};
pub use distinguished_name::DistinguishedName;
