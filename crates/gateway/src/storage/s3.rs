//! # S3互換 Blob Store 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIに署名済みファイルを保存する。

use super::{content_type_for, validate_filename, BlobStore, StorageError};

/// オブジェクトキーのプレフィックス
const KEY_PREFIX: &str = "signed";

/// S3互換ストレージによるBlob Store実装。
pub struct S3BlobStore {
    bucket: s3::Bucket,
}

impl S3BlobStore {
    /// S3互換バケットからBlobStoreを構築する。
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// S3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        // AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを自動検出。
        // 非AWSエンドポイントではus-east-1をフォールバックとして使用。
        let detected_region = std::env::var("S3_REGION").ok().unwrap_or_else(|| {
            endpoint
                .find("s3.")
                .and_then(|start| {
                    let rest = &endpoint[start + 3..];
                    rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
                })
                .unwrap_or_else(|| "us-east-1".to_string())
        });
        let region = s3::Region::Custom {
            region: detected_region,
            endpoint: endpoint.to_string(),
        };

        let credentials = s3::creds::Credentials::new(
            Some(access_key),
            Some(secret_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)?.with_path_style();

        Ok(*bucket)
    }

    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoint = std::env::var("S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let access_key =
            std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "xmlsig-signed".to_string());

        tracing::info!(s3_endpoint = %endpoint, s3_bucket = %bucket_name, "S3互換ストレージを使用");

        let bucket = Self::init_bucket(&endpoint, &access_key, &secret_key, &bucket_name)?;
        Ok(Self::new(bucket))
    }

    fn object_key(filename: &str) -> String {
        format!("{KEY_PREFIX}/{filename}")
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
        validate_filename(filename)?;

        let key = Self::object_key(filename);
        let response = self
            .bucket
            .put_object_with_content_type(&key, bytes, content_type_for(filename))
            .await
            .map_err(|e| StorageError::Backend(format!("PUT失敗 ({key}): {e}")))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Backend(format!(
                "PUTでHTTPエラー: ステータス {status} ({key})"
            )));
        }

        Ok(filename.to_string())
    }

    async fn fetch(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_filename(filename)?;

        let key = Self::object_key(filename);
        let response = self
            .bucket
            .get_object(&key)
            .await
            .map_err(|e| StorageError::Backend(format!("GET失敗 ({key}): {e}")))?;

        match response.status_code() {
            200..=299 => Ok(Some(response.bytes().to_vec())),
            404 => Ok(None),
            status => Err(StorageError::Backend(format!(
                "GETでHTTPエラー: ステータス {status} ({key})"
            ))),
        }
    }
}
