//! # Gatewayエンドポイント
//!
//! - `POST /signature` — Phase 1（署名セッション開始）
//! - `POST /signature/{token}` — Phase 2（署名の確定・保存）
//! - `POST /documents` — 署名対象XMLのアップロード
//! - `GET /files/{filename}` — 署名済みXMLのダウンロード
//! - `PUT /files/{filename}` — 保存に失敗した署名の再保存
//! - `GET /health` — ヘルスチェック

pub mod documents;
pub mod files;
pub mod signature;

pub use documents::handle_upload_document;
pub use files::{handle_download_file, handle_store_pending};
pub use signature::{handle_complete, handle_start};

/// GET /health
pub async fn handle_health() -> &'static str {
    "ok"
}
