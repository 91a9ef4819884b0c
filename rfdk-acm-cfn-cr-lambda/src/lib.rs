//! Imports certificates held in Secrets Manager into ACM.
pub mod acm;
pub mod importer;

pub use importer::AcmCertificateImporter;
