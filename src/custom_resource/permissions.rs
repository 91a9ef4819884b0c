//! Debug-mode probes that exercise the permissions a handler needs before it
//! touches anything real.
use ring::rand::SystemRandom;
use thiserror::Error;
use tracing::{debug, info};
use crate::digest::random_hex;
use crate::dynamodb::{CompositeStringIndexTable, PutItemArgs};
use crate::secrets::{CreateSecretRequest, SecretValue, SecretsStore};
use crate::tag::Tag;

#[derive(Debug, Error)]
#[error("Permissions check failed -- {0}")]
pub struct PermissionsError(pub String);

fn probe_id(rnd: &SystemRandom) -> Result<String, PermissionsError> {
    random_hex(rnd, 16).map_err(|_| PermissionsError("could not generate a probe id".to_string()))
}

/// Writes, reads, queries and deletes a throwaway record. Does nothing unless
/// `debug` is set.
pub async fn database_permissions_check(
    table: &CompositeStringIndexTable,
    debug: bool,
) -> Result<(), PermissionsError> {
    if !debug {
        return Ok(());
    }
    let rnd = SystemRandom::new();
    let primary = probe_id(&rnd)?;
    let sort = probe_id(&rnd)?;
    let fail = |e: crate::dynamodb::TableError| PermissionsError(e.to_string());
    info!("checking table permissions");

    let written = table
        .put_item(PutItemArgs::new(&primary, &sort).attribute("Probe", "true"))
        .await
        .map_err(fail)?;
    if !written {
        return Err(PermissionsError(format!("probe record ({}, {}) already existed", &primary, &sort)));
    }
    table.get_item(&primary, &sort).await.map_err(fail)?;
    table.query(&primary, None).await.map_err(fail)?;
    table.delete_item(&primary, &sort).await.map_err(fail)?;
    debug!("table permissions ok");
    Ok(())
}

/// Creates, updates, reads and force-deletes a throwaway secret carrying
/// `tags`. Does nothing unless `debug` is set.
pub async fn secrets_permissions_check(
    store: &dyn SecretsStore,
    tags: &[Tag],
    debug: bool,
) -> Result<(), PermissionsError> {
    if !debug {
        return Ok(());
    }
    let rnd = SystemRandom::new();
    let fail = |e: crate::secrets::SecretsError| PermissionsError(e.to_string());
    info!("checking secrets permissions");

    let arn = store
        .create_secret(CreateSecretRequest {
            name: format!("PermissionsCheck-{}", probe_id(&rnd)?),
            description: "Permissions check".to_string(),
            value: SecretValue::Text("Test 1".to_string()),
            encryption_key: None,
            tags: tags.to_vec(),
        })
        .await
        .map_err(fail)?;
    store
        .put_secret_value(&arn, SecretValue::Text("Test 2".to_string()))
        .await
        .map_err(fail)?;
    store.get_secret_value(&arn).await.map_err(fail)?;
    store.delete_secret(&arn, true).await.map_err(fail)?;
    debug!("secrets permissions ok");
    Ok(())
}
