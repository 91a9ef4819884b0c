use std::collections::HashMap;
use std::sync::Mutex;
use async_trait::async_trait;
use super::{CreateSecretRequest, SecretValue, SecretsError, SecretsStore};

#[derive(Clone, Debug)]
pub struct StoredSecret {
    pub name: String,
    pub description: String,
    pub value: SecretValue,
    pub encryption_key: Option<String>,
    pub tags: Vec<crate::tag::Tag>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    secrets: HashMap<String, StoredSecret>,
    denied: Vec<String>,
}

/// In-process `SecretsStore` for tests and local runs. ARNs look like
/// `arn:aws:secretsmanager:local:000000000000:secret:<name>-<n>`.
#[derive(Debug, Default)]
pub struct MemorySecretsStore {
    state: Mutex<State>,
}

impl MemorySecretsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, arn: &str) -> Option<StoredSecret> {
        self.lock().secrets.get(arn).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every later call touching `arn` fails with `AccessDenied`.
    pub fn deny(&self, arn: &str) {
        self.lock().denied.push(arn.to_string());
    }

    fn check_access(state: &State, arn: &str) -> Result<(), SecretsError> {
        if state.denied.iter().any(|d| d == arn) {
            return Err(SecretsError::AccessDenied {
                arn: arn.to_string(),
                message: "User is not authorized to perform this operation".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecretsStore for MemorySecretsStore {
    async fn create_secret(&self, request: CreateSecretRequest) -> Result<String, SecretsError> {
        let mut state = self.lock();
        if state.secrets.values().any(|s| s.name == request.name) {
            return Err(SecretsError::AlreadyExists(request.name));
        }
        state.next_id += 1;
        let arn = format!(
            "arn:aws:secretsmanager:local:000000000000:secret:{}-{}",
            &request.name, state.next_id
        );
        state.secrets.insert(
            arn.clone(),
            StoredSecret {
                name: request.name,
                description: request.description,
                value: request.value,
                encryption_key: request.encryption_key,
                tags: request.tags,
            },
        );
        Ok(arn)
    }

    async fn put_secret_value(&self, arn: &str, value: SecretValue) -> Result<(), SecretsError> {
        let mut state = self.lock();
        Self::check_access(&state, arn)?;
        let secret = state
            .secrets
            .get_mut(arn)
            .ok_or_else(|| SecretsError::NotFound(arn.to_string()))?;
        secret.value = value;
        Ok(())
    }

    async fn get_secret_value(&self, arn: &str) -> Result<SecretValue, SecretsError> {
        let state = self.lock();
        Self::check_access(&state, arn)?;
        state
            .secrets
            .get(arn)
            .map(|s| s.value.clone())
            .ok_or_else(|| SecretsError::NotFound(arn.to_string()))
    }

    async fn delete_secret(&self, arn: &str, _force: bool) -> Result<(), SecretsError> {
        let mut state = self.lock();
        Self::check_access(&state, arn)?;
        state
            .secrets
            .remove(arn)
            .map(|_| ())
            .ok_or_else(|| SecretsError::NotFound(arn.to_string()))
    }
}
