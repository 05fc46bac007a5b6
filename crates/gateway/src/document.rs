//! # 署名対象ドキュメント
//!
//! ドキュメント参照（ドキュメントディレクトリ直下のファイル名）を
//! XMLのバイト列に解決する。アップロードされたXMLの保存も担う。

use std::path::{Component, Path, PathBuf};

/// ドキュメント解決のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// 参照の形式が不正（パス区切り・親ディレクトリ参照・絶対パス等）
    #[error("不正なドキュメント参照: {0}")]
    MalformedRef(String),
    /// ドキュメントが存在しない、または読み込めない
    #[error("ドキュメントを読み込めません: {0}")]
    Unavailable(String),
    /// アップロードされた内容がXMLではない
    #[error("XMLドキュメントではありません")]
    NotXml,
    /// 保存に失敗
    #[error("ドキュメントの保存に失敗: {0}")]
    Write(String),
}

/// ドキュメントディレクトリからXMLを読み出す。
#[derive(Debug, Clone)]
pub struct DocumentSource {
    dir: PathBuf,
}

impl DocumentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 参照をディレクトリ直下のパスに解決する。
    fn resolve_path(&self, document_ref: &str) -> Result<PathBuf, DocumentError> {
        let mut components = Path::new(document_ref).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None)
                if !document_ref.contains(['/', '\\', '\0']) =>
            {
                Ok(self.dir.join(name))
            }
            _ => Err(DocumentError::MalformedRef(document_ref.to_string())),
        }
    }

    /// ドキュメントを読み込む。
    ///
    /// 存在しない・読めない・空のファイルは `Unavailable`。
    pub async fn read(&self, document_ref: &str) -> Result<Vec<u8>, DocumentError> {
        let path = self.resolve_path(document_ref)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DocumentError::Unavailable(format!("{document_ref}: {e}")))?;
        if bytes.is_empty() {
            return Err(DocumentError::Unavailable(format!(
                "{document_ref}: 空のファイルです"
            )));
        }
        Ok(bytes)
    }

    /// アップロードされたXMLを新しい参照名で保存し、その参照を返す。
    pub async fn save_upload(&self, bytes: &[u8]) -> Result<String, DocumentError> {
        if !looks_like_xml(bytes) {
            return Err(DocumentError::NotXml);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DocumentError::Write(format!("{}: {e}", self.dir.display())))?;

        let document_ref = format!("{}_upload.xml", uuid::Uuid::new_v4());
        let path = self.dir.join(&document_ref);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DocumentError::Write(format!("{}: {e}", path.display())))?;

        Ok(document_ref)
    }
}

/// 先頭（BOM・空白を除く）が `<` で始まるかどうか。
pub(crate) fn looks_like_xml(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}
