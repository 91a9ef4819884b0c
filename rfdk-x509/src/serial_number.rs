use openssl::asn1::Asn1Integer;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;

/// Bits of randomness in a serial; keeps the DER integer positive and
/// within the 20 octets RFC 5280 allows.
pub const SERIAL_BITS: i32 = 159;

pub fn random_serial() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}
