//! StorageIssuer port - オブジェクトストレージと認証情報の発行
//!
//! `bucket_support` が無効な場合、エンジンはこの port を呼びません。

use async_trait::async_trait;

use super::PortError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketCredentials {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub location_constraint: bool,
}

#[async_trait]
pub trait StorageIssuer: Send + Sync {
    /// Creates `bucket` and credentials restricted to it.
    async fn create_bucket(&self, app: &str, bucket: &str) -> Result<BucketCredentials, PortError>;

    /// Removes the app's bucket and credentials. `NotFound` when there are none.
    async fn destroy_bucket(&self, app: &str) -> Result<(), PortError>;
}
