//! Building blocks for idempotent CloudFormation custom resources.
pub mod backoff;
pub mod config;
pub mod custom_resource;
pub mod digest;
pub mod dynamodb;
pub mod secrets;
pub mod tag;
