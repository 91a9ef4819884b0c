//! Custom resources that mint X.509 certificates into Secrets Manager.
pub mod common;
pub mod converter;
pub mod generator;
pub mod properties;

pub use common::X509Common;
pub use converter::X509ToPkcs12;
pub use generator::X509Generator;
