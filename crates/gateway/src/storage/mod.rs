//! # Blob Store
//!
//! 署名済みファイルを保存する抽象インターフェース。
//!
//! ## 実装
//! - `LocalBlobStore`: ローカルディレクトリ（開発環境用）
//! - `S3BlobStore`: S3互換オブジェクトストレージ（`vendor-aws` feature）

pub mod local;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use local::LocalBlobStore;
#[cfg(feature = "vendor-aws")]
pub use s3::S3BlobStore;

/// ファイル名の最大長
const MAX_FILENAME_LEN: usize = 255;

/// Blob Storeのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// ファイル名が不正（パス区切り文字・親ディレクトリ参照等）
    #[error("不正なファイル名: {0}")]
    InvalidName(String),
    /// バックエンドの読み書きに失敗
    #[error("ストレージ操作に失敗: {0}")]
    Backend(String),
}

/// Blob Storeの抽象インターフェース。
///
/// 同一ファイル名・同一バイト列での `store` は冪等。
/// ファイル名は呼び出し側が `generate_filename` で事前に確保する。
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// `filename` でバイト列を保存し、取得に使えるファイル名を返す。
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// 保存済みのバイト列を取得する。存在しない場合は `None`。
    async fn fetch(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// 衝突しにくいファイル名（UUID v4 + 拡張子）を生成する。
///
/// `extension` は先頭の `.` の有無を問わない。
pub fn generate_filename(extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        format!("{}.{extension}", uuid::Uuid::new_v4())
    }
}

/// ファイル名がストレージのキーとして安全か検証する。
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
        return Err(StorageError::InvalidName(format!(
            "長さは1〜{MAX_FILENAME_LEN}文字である必要があります"
        )));
    }
    if filename.starts_with('.') {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !filename.chars().all(allowed) {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(())
}

/// 拡張子からContent-Typeを決定する。
pub fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
