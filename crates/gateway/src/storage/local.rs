//! # ローカルディレクトリ Blob Store
//!
//! 指定ディレクトリにファイルとして保存する。開発環境用。

use std::path::PathBuf;

use super::{validate_filename, BlobStore, StorageError};

/// ローカルディレクトリに保存するBlob Store。
///
/// 一時ファイルに書き込んでからリネームするため、
/// 途中で失敗しても中途半端なファイルは残らない。
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    /// 新しいLocalBlobStoreを作成する。ディレクトリは初回保存時に作成される。
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
        validate_filename(filename)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StorageError::Backend(format!("ディレクトリ作成失敗 ({}): {e}", self.dir.display()))
        })?;

        let path = self.dir.join(filename);
        let tmp_path = self
            .dir
            .join(format!(".{filename}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::Backend(format!(
                "書き込み失敗 ({}): {e}",
                tmp_path.display()
            )));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::Backend(format!(
                "リネーム失敗 ({}): {e}",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), size = bytes.len(), "ファイルを保存");
        Ok(filename.to_string())
    }

    async fn fetch(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_filename(filename)?;

        let path = self.dir.join(filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Backend(format!(
                "読み込み失敗 ({}): {e}",
                path.display()
            ))),
        }
    }
}
