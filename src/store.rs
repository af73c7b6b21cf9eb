use std::convert::TryFrom;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rusoto_core::RusotoError;
use rusoto_s3::{
    DeleteObjectRequest, GetObjectError, GetObjectRequest, PutObjectRequest, S3Client,
    StreamingBody, S3,
};
use uuid::Uuid;

use crate::errors::BackendError;

pub mod memory;

pub use memory::MemoryStore;

/// Blob storage for recording files, addressed by opaque keys.
pub trait Store: Send + Sync {
    /// Saves the given data under the given key.
    fn save(
        &self,
        key: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<(), BackendError>>;

    /// Reads back the data saved under the given key.
    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>>;

    /// Deletes the given object.
    fn delete(&self, key: &str) -> BoxFuture<Result<(), BackendError>>;
}

/// Generates a fresh key for a recording file.
pub fn new_key() -> String {
    format!("raw/{}", Uuid::new_v4())
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    bucket: String,
    cache_control: String,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(client: Arc<S3Client>, bucket: String, cache_control: String) -> Self {
        Self {
            client,
            bucket,
            cache_control,
        }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");
        let cache_control = get_variable("BACKEND_S3_CACHE_CONTROL");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        Ok(S3Store::new(client, bucket, cache_control))
    }
}

impl Store for S3Store {
    fn save(
        &self,
        key: &str,
        content_type: String,
        raw: Vec<u8>,
    ) -> BoxFuture<Result<(), BackendError>> {
        upload(self, key.to_owned(), content_type, raw).boxed()
    }

    fn retrieve(&self, key: &str) -> BoxFuture<Result<Vec<u8>, BackendError>> {
        download(self, key.to_owned()).boxed()
    }

    fn delete(&self, key: &str) -> BoxFuture<Result<(), BackendError>> {
        delete(self, key.to_owned()).boxed()
    }
}

async fn delete(store: &S3Store, key: String) -> Result<(), BackendError> {
    let request = DeleteObjectRequest {
        bucket: store.bucket.clone(),
        key,
        ..Default::default()
    };

    let result = store.client.delete_object(request).await;

    result
        .map(|_| ())
        .map_err(|source| BackendError::DeleteFailed { source })
}

async fn download(store: &S3Store, key: String) -> Result<Vec<u8>, BackendError> {
    use futures::TryStreamExt;

    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key: key.clone(),
        ..Default::default()
    };

    let output = store
        .client
        .get_object(request)
        .await
        .map_err(|source| match source {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => {
                BackendError::FileNotFound(key.clone())
            }
            source => BackendError::RetrieveFailed { source },
        })?;

    let body: StreamingBody = output
        .body
        .ok_or_else(|| BackendError::FileNotFound(key.clone()))?;

    body.map_ok(|chunk| chunk.to_vec())
        .try_concat()
        .await
        .map_err(BackendError::ReadFailed)
}

async fn upload(
    store: &S3Store,
    key: String,
    content_type: String,
    raw: Vec<u8>,
) -> Result<(), BackendError> {
    let len = i64::try_from(raw.len()).map_err(|_| BackendError::FileTooLarge(raw.len()))?;

    let request = PutObjectRequest {
        body: Some(StreamingBody::from(raw)),
        bucket: store.bucket.clone(),
        cache_control: Some(store.cache_control.clone()),
        content_length: Some(len),
        content_type: Some(content_type),
        key,
        ..Default::default()
    };

    let result = store.client.put_object(request).await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(BackendError::UploadFailed { source: e }),
    }
}
