use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::Value;

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(digest(&SHA256, data.as_ref()).as_ref())
}

/// Hash of a JSON value. `serde_json` maps keep their keys sorted, so equal
/// objects hash equally regardless of the order the keys arrived in.
pub fn sha256_json(value: &Value) -> String {
    sha256_hex(value.to_string())
}

/// `len` random bytes, hex encoded.
pub fn random_hex(rnd: &SystemRandom, len: usize) -> Result<String, ring::error::Unspecified> {
    let mut bytes = vec![0u8; len];
    rnd.fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}
