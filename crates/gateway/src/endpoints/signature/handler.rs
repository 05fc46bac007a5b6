use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use xmlsig_types::{CompleteSignatureResponse, StartSignatureRequest, StartSignatureResponse};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::orchestrator::StartParams;

/// POST /signature — 署名セッションを開始する。
///
/// ボディは省略可能。省略されたフィールドには設定の既定値を使う。
/// ボディがある場合は `Content-Type: application/json` が必要。
/// トークンはキャッシュさせない。
pub async fn handle_start(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let request = parse_start_request(&headers, &body)?;
    let defaults = &state.defaults;

    let params = StartParams {
        document_ref: request.document.unwrap_or_else(|| defaults.document.clone()),
        element_id: request
            .element_id
            .unwrap_or_else(|| defaults.element_id.clone()),
        policy: request.policy.unwrap_or_else(|| defaults.policy.clone()),
    };

    let session = state.orchestrator.start(params).await?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(StartSignatureResponse {
            token: session.into_token().to_string(),
        }),
    ))
}

/// 空のボディは既定値のみのリクエストとして扱う。
fn parse_start_request(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StartSignatureRequest, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartSignatureRequest::default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if mime != "application/json" && !mime.ends_with("+json") {
        return Err(GatewayError::UnsupportedMediaType(if content_type.is_empty() {
            "Content-Typeが指定されていません".to_string()
        } else {
            content_type.to_string()
        }));
    }

    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("リクエストボディが不正です: {e}")))
}

/// POST /signature/{token} — 署名を確定し、署名済みXMLを保存する。
pub async fn handle_complete(
    State(state): State<Arc<GatewayState>>,
    Path(token): Path<String>,
) -> Result<Json<CompleteSignatureResponse>, GatewayError> {
    let result = state.orchestrator.complete(&token).await?;

    Ok(Json(CompleteSignatureResponse {
        filename: result.stored_filename,
        certificate: result.signer_certificate,
        sha256: result.sha256,
    }))
}
