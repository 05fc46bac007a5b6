//! # Gateway エラー型
//!
//! `SignError` は署名オーケストレーターのエラー分類、
//! `GatewayError` はHTTPエンドポイント共通のエラー型。
//! どちらもカテゴリごとに異なるHTTPステータスに対応する。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use xmlsig_types::PendingStorageResponse;

use crate::orchestrator::PendingStorage;
use crate::remote::RemoteError;
use crate::storage::StorageError;

/// 署名処理のエラー分類。
///
/// リモート署名サービスのエラーはいずれも自動リトライしない。
/// `StorageFailed` のみ、保持している `PendingStorage` で保存だけを再実行できる。
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// 不正なリクエスト（ドキュメント参照・トークンの形式、未知のポリシー等）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 署名対象ドキュメントを読み込めない（トークンは発行されていない）
    #[error("ドキュメントを読み込めません: {0}")]
    DocumentUnavailable(String),
    /// リモート署名サービスが登録を拒否した、または通信に失敗した
    #[error("署名の登録に失敗: {0}")]
    RemoteRegistrationFailed(#[source] RemoteError),
    /// トークンが存在しない・期限切れ・使用済み
    #[error("トークンが無効または期限切れです: {0}")]
    InvalidOrExpiredToken(String),
    /// クライアント側の署名がまだ行われていない
    #[error("クライアント側の署名が完了していません: {0}")]
    SignatureNotReady(String),
    /// リモート署名サービスでの確定に失敗
    #[error("署名の確定に失敗: {0}")]
    RemoteFinalizationFailed(#[source] RemoteError),
    /// 確定済みの署名の保存に失敗
    #[error("署名は確定しましたが保存に失敗しました（予約ファイル名: {}）: {source}", .pending.filename())]
    StorageFailed {
        /// 保存の再実行に必要な署名済みバイト列と予約ファイル名
        pending: Box<PendingStorage>,
        #[source]
        source: StorageError,
    },
}

impl SignError {
    /// HTTPステータスコード。
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SignError::DocumentUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SignError::InvalidOrExpiredToken(_) => StatusCode::NOT_FOUND,
            SignError::SignatureNotReady(_) => StatusCode::CONFLICT,
            SignError::RemoteRegistrationFailed(_) | SignError::RemoteFinalizationFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            SignError::StorageFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 署名処理のエラー
    #[error(transparent)]
    Sign(#[from] SignError),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// リクエストサイズ超過
    #[error("ペイロードサイズが上限を超えています: {0}")]
    PayloadTooLarge(String),
    /// JSON以外のContent-Type
    #[error("サポートされていないContent-Type: {0}")]
    UnsupportedMediaType(String),
    /// ファイルが存在しない
    #[error("ファイルが見つかりません: {0}")]
    NotFound(String),
    /// ファイルが既に存在する
    #[error("ファイルが既に存在します: {0}")]
    Conflict(String),
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Sign(e) => e.status_code(),
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();

        // 確定済みの署名は再取得できないため、署名済みXMLごと返す
        if let GatewayError::Sign(SignError::StorageFailed { pending, .. }) = self {
            let body = PendingStorageResponse {
                message,
                token: pending.token().to_string(),
                reserved_filename: pending.filename().to_string(),
                signed_xml: base64::engine::general_purpose::STANDARD
                    .encode(pending.signed_bytes()),
                certificate: pending.certificate().clone(),
            };
            return (status, Json(body)).into_response();
        }

        (status, message).into_response()
    }
}
