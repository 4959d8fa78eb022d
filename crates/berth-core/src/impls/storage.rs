//! InMemoryStorageIssuer - バケットと認証情報の発行（開発用）

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::RngCore;

use crate::config::BucketConfig;
use crate::ports::{BucketCredentials, PortError, StorageIssuer};

#[derive(Default)]
struct StorageState {
    buckets: HashMap<String, BucketCredentials>,
    fail_next: Option<PortError>,
}

pub struct InMemoryStorageIssuer {
    endpoint: String,
    location_constraint: bool,
    state: Mutex<StorageState>,
}

impl InMemoryStorageIssuer {
    pub fn new(config: &BucketConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            location_constraint: config.location_constraint,
            state: Mutex::new(StorageState::default()),
        }
    }

    pub fn prepare_failure(&self, error: PortError) {
        self.lock().fail_next = Some(error);
    }

    pub fn bucket(&self, app: &str) -> Option<BucketCredentials> {
        self.lock().buckets.get(app).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[async_trait]
impl StorageIssuer for InMemoryStorageIssuer {
    async fn create_bucket(&self, app: &str, bucket: &str) -> Result<BucketCredentials, PortError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        if state.buckets.contains_key(app) {
            return Err(PortError::AlreadyExists(format!("bucket for {app}")));
        }
        let credentials = BucketCredentials {
            bucket: bucket.to_string(),
            endpoint: self.endpoint.clone(),
            access_key: random_hex(10).to_uppercase(),
            secret_key: random_hex(20),
            location_constraint: self.location_constraint,
        };
        state.buckets.insert(app.to_string(), credentials.clone());
        Ok(credentials)
    }

    async fn destroy_bucket(&self, app: &str) -> Result<(), PortError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state
            .buckets
            .remove(app)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("bucket for {app}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issues_distinct_credentials_per_app() {
        let issuer = InMemoryStorageIssuer::new(&BucketConfig::default());

        let a = issuer.create_bucket("a", "a-bucket").await.unwrap();
        let b = issuer.create_bucket("b", "b-bucket").await.unwrap();

        assert_eq!(a.bucket, "a-bucket");
        assert_eq!(a.endpoint, "https://s3.amazonaws.com");
        assert_ne!(a.access_key, b.access_key);
        assert_eq!(a.secret_key.len(), 40);
    }

    #[tokio::test]
    async fn destroy_of_missing_bucket_is_not_found() {
        let issuer = InMemoryStorageIssuer::new(&BucketConfig::default());

        let err = issuer.destroy_bucket("ghost").await.unwrap_err();

        assert!(err.is_not_found());
    }
}
