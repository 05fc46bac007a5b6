//! # GET /files/{filename}, PUT /files/{filename}
//!
//! 署名済みXMLのダウンロードと、保存に失敗した署名の再保存。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use xmlsig_types::{CompleteSignatureResponse, StorePendingRequest};

use crate::config::GatewayState;
use crate::document::looks_like_xml;
use crate::error::GatewayError;
use crate::orchestrator::PendingStorage;
use crate::session::SessionToken;
use crate::storage::{content_type_for, validate_filename};

/// GET /files/{filename} — 保存済みファイルを返す。
pub async fn handle_download_file(
    State(state): State<Arc<GatewayState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    validate_filename(&filename).map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let bytes = state
        .blob_store
        .fetch(&filename)
        .await
        .map_err(|e| GatewayError::Storage(e.to_string()))?
        .ok_or_else(|| GatewayError::NotFound(filename.clone()))?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], bytes))
}

/// PUT /files/{filename} — 保存に失敗した署名を予約済みファイル名で保存し直す。
///
/// `POST /signature/{token}` の503レスポンスの内容をそのまま送り返す。
/// 既に存在するファイルは上書きしない。
pub async fn handle_store_pending(
    State(state): State<Arc<GatewayState>>,
    Path(filename): Path<String>,
    Json(body): Json<StorePendingRequest>,
) -> Result<Json<CompleteSignatureResponse>, GatewayError> {
    validate_filename(&filename).map_err(|e| GatewayError::BadRequest(e.to_string()))?;
    if !filename.ends_with(".xml") {
        return Err(GatewayError::BadRequest(format!(
            "署名済みファイルの拡張子は .xml である必要があります: {filename}"
        )));
    }
    let token =
        SessionToken::parse(&body.token).map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let signed_bytes = base64::engine::general_purpose::STANDARD
        .decode(&body.signed_xml)
        .map_err(|e| GatewayError::BadRequest(format!("signed_xmlのBase64デコードに失敗: {e}")))?;
    if !looks_like_xml(&signed_bytes) {
        return Err(GatewayError::BadRequest(
            "signed_xmlがXMLドキュメントではありません".to_string(),
        ));
    }

    let existing = state
        .blob_store
        .fetch(&filename)
        .await
        .map_err(|e| GatewayError::Storage(e.to_string()))?;
    if existing.is_some() {
        return Err(GatewayError::Conflict(filename));
    }

    let result = state
        .orchestrator
        .store_pending(PendingStorage::new(
            token.to_string(),
            filename,
            signed_bytes,
            body.certificate,
        ))
        .await?;

    Ok(Json(CompleteSignatureResponse {
        filename: result.stored_filename,
        certificate: result.signer_certificate,
        sha256: result.sha256,
    }))
}
