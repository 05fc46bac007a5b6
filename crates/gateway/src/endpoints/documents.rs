//! # POST /documents
//!
//! 署名対象XMLのアップロード。保存したドキュメント参照を返し、
//! クライアントはそれを `POST /signature` の `document` に指定する。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use xmlsig_types::UploadDocumentResponse;

use crate::config::GatewayState;
use crate::document::DocumentError;
use crate::error::GatewayError;

/// POST /documents — XMLドキュメントを保存する。
pub async fn handle_upload_document(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Json<UploadDocumentResponse>, GatewayError> {
    if body.len() > state.max_upload_size {
        return Err(GatewayError::PayloadTooLarge(format!(
            "{} bytes (上限: {} bytes)",
            body.len(),
            state.max_upload_size
        )));
    }

    let document = state
        .documents
        .save_upload(&body)
        .await
        .map_err(|e| match e {
            DocumentError::NotXml => GatewayError::BadRequest(e.to_string()),
            other => GatewayError::Storage(other.to_string()),
        })?;

    tracing::info!(document = %document, size = body.len(), "ドキュメントを保存");

    Ok(Json(UploadDocumentResponse {
        document,
        size: body.len() as u64,
    }))
}
