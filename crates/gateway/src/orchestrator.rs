//! # 署名オーケストレーター
//!
//! 2フェーズ署名の手順を管理する。
//!
//! ## 処理フロー
//! 1. Phase 1 (`start`): ドキュメントを読み込み、リモート署名サービスに
//!    ドキュメント・対象要素・ポリシーを登録してトークンを受け取る
//! 2. クライアント（ブラウザ・ローカル証明書ストア等）がトークンを使って
//!    秘密鍵による署名を行う（このプロセスの外）
//! 3. Phase 2 (`complete`): トークンで署名を確定し、署名済みバイト列を
//!    予約したファイル名でBlob Storeに保存する
//!
//! Phase 1 と Phase 2 の間にプロセス内の状態は持たない。
//! 確定（finalize）は冪等ではないため再実行しない。保存のみ再試行できる。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use xmlsig_types::CertificateInfo;

use crate::document::{DocumentError, DocumentSource};
use crate::error::SignError;
use crate::remote::{RegistrationRequest, RemoteError, RemoteSigningClient};
use crate::session::{SessionState, SessionToken, SigningSession};
use crate::storage::{generate_filename, BlobStore, StorageError};

/// 署名済みファイルの拡張子
const SIGNED_EXTENSION: &str = ".xml";

/// オーケストレーターの設定。構築後は変更しない。
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// 署名ポリシーのエイリアス → リモートサービス側のポリシーID
    pub policies: HashMap<String, String>,
    /// 証明書チェーンの信頼判定に使うセキュリティコンテキストID
    pub security_context_id: Option<String>,
    /// 保存の最大試行回数（1以上）
    pub max_storage_attempts: u32,
    /// 保存の再試行までの待機時間
    pub storage_retry_backoff: Duration,
}

/// Phase 1 の入力。
#[derive(Debug, Clone)]
pub struct StartParams {
    pub document_ref: String,
    pub element_id: String,
    pub policy: String,
}

/// 完了した署名セッションの結果。
/// 確定と保存の両方に成功した場合にのみ存在する。
#[derive(Debug, Clone)]
pub struct SignatureResult {
    /// Blob Storeが返したファイル名
    pub stored_filename: String,
    /// 署名者証明書の情報
    pub signer_certificate: CertificateInfo,
    /// 保存したバイト列のSHA-256（Hex）
    pub sha256: String,
}

/// 確定済みだが未保存の署名。
///
/// 保存に失敗した場合に `SignError::StorageFailed` に含まれて呼び出し元に返る。
/// `SignatureOrchestrator::store_pending` に渡すと、同じファイル名で保存だけを再実行する。
pub struct PendingStorage {
    token: String,
    filename: String,
    signed_bytes: Vec<u8>,
    certificate: CertificateInfo,
}

impl PendingStorage {
    pub fn new(
        token: String,
        filename: String,
        signed_bytes: Vec<u8>,
        certificate: CertificateInfo,
    ) -> Self {
        Self {
            token,
            filename,
            signed_bytes,
            certificate,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// 予約済みファイル名
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn signed_bytes(&self) -> &[u8] {
        &self.signed_bytes
    }

    pub fn certificate(&self) -> &CertificateInfo {
        &self.certificate
    }

    fn into_result(self, stored_filename: String) -> SignatureResult {
        SignatureResult {
            stored_filename,
            signer_certificate: self.certificate,
            sha256: hex::encode(Sha256::digest(&self.signed_bytes)),
        }
    }
}

impl fmt::Debug for PendingStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStorage")
            .field("token", &self.token)
            .field("filename", &self.filename)
            .field("signed_bytes_len", &self.signed_bytes.len())
            .finish_non_exhaustive()
    }
}

/// 2フェーズ署名のオーケストレーター。
pub struct SignatureOrchestrator {
    remote: Arc<dyn RemoteSigningClient>,
    blob_store: Arc<dyn BlobStore>,
    documents: DocumentSource,
    config: SignatureConfig,
}

impl SignatureOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteSigningClient>,
        blob_store: Arc<dyn BlobStore>,
        documents: DocumentSource,
        config: SignatureConfig,
    ) -> Self {
        Self {
            remote,
            blob_store,
            documents,
            config,
        }
    }

    /// Phase 1: 署名対象を登録し、セッションを開始する。
    ///
    /// ドキュメントを読み込めない場合はリモートサービスを呼ばず、トークンも発行されない。
    pub async fn start(&self, params: StartParams) -> Result<SigningSession, SignError> {
        let policy_id = self.config.policies.get(&params.policy).ok_or_else(|| {
            SignError::BadRequest(format!("未知の署名ポリシー: {}", params.policy))
        })?;

        if params.element_id.trim().is_empty() {
            return Err(SignError::BadRequest(
                "署名対象要素のIDが指定されていません".to_string(),
            ));
        }

        let document = self
            .documents
            .read(&params.document_ref)
            .await
            .map_err(|e| match e {
                e @ DocumentError::MalformedRef(_) => SignError::BadRequest(e.to_string()),
                DocumentError::Unavailable(detail) => SignError::DocumentUnavailable(detail),
                other => SignError::DocumentUnavailable(other.to_string()),
            })?;

        let raw_token = self
            .remote
            .register(RegistrationRequest {
                document,
                element_id: params.element_id.clone(),
                policy_id: policy_id.clone(),
                security_context_id: self.config.security_context_id.clone(),
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    document = %params.document_ref,
                    element_id = %params.element_id,
                    error = %e,
                    "署名の登録に失敗"
                );
                SignError::RemoteRegistrationFailed(e)
            })?;

        let token = SessionToken::parse(&raw_token).map_err(|e| {
            SignError::RemoteRegistrationFailed(RemoteError::Unavailable(format!(
                "リモートサービスが不正なトークンを返しました: {e}"
            )))
        })?;

        let session = SigningSession::started(
            token,
            params.document_ref,
            params.element_id,
            params.policy,
        );

        tracing::info!(
            token = %session.token(),
            document = %session.document_ref(),
            element_id = %session.element_id(),
            policy = %session.policy(),
            state = ?session.state(),
            "署名セッションを開始"
        );

        Ok(session)
    }

    /// Phase 2: 署名を確定し、署名済みファイルを保存する。
    ///
    /// 保存に失敗した場合、確定は取り消されない。`SignError::StorageFailed` に
    /// 含まれる `PendingStorage` で `store_pending` を呼べば保存だけを再実行できる。
    pub async fn complete(&self, raw_token: &str) -> Result<SignatureResult, SignError> {
        let token =
            SessionToken::parse(raw_token).map_err(|e| SignError::BadRequest(e.to_string()))?;

        let outcome = self.finalize_and_store(&token).await;

        let state = SessionState::after(&outcome);

        match &outcome {
            Ok(result) => tracing::info!(
                token = %token,
                state = ?state,
                filename = %result.stored_filename,
                sha256 = %result.sha256,
                "署名セッションが完了"
            ),
            Err(e) => tracing::warn!(token = %token, state = ?state, error = %e, "署名セッションが失敗"),
        }

        outcome
    }

    /// 確定済みの署名を予約済みのファイル名で保存し直す。
    pub async fn store_pending(&self, pending: PendingStorage) -> Result<SignatureResult, SignError> {
        tracing::info!(
            token = %pending.token(),
            filename = %pending.filename(),
            "保存を再実行"
        );
        self.store_with_retry(pending).await
    }

    async fn finalize_and_store(&self, token: &SessionToken) -> Result<SignatureResult, SignError> {
        let finalized = self
            .remote
            .finalize(token.as_str())
            .await
            .map_err(|e| match e {
                RemoteError::TokenNotFound(detail) => SignError::InvalidOrExpiredToken(detail),
                RemoteError::NotReady(detail) => SignError::SignatureNotReady(detail),
                other => SignError::RemoteFinalizationFailed(other),
            })?;

        let pending = PendingStorage::new(
            token.to_string(),
            generate_filename(SIGNED_EXTENSION),
            finalized.signed_bytes,
            finalized.certificate,
        );

        self.store_with_retry(pending).await
    }

    /// 保存を最大 `max_storage_attempts` 回試行する。
    /// ファイル名が不正な場合は再試行しない。
    async fn store_with_retry(&self, pending: PendingStorage) -> Result<SignatureResult, SignError> {
        let max_attempts = self.config.max_storage_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .blob_store
                .store(pending.filename(), pending.signed_bytes())
                .await
            {
                Ok(stored_filename) => return Ok(pending.into_result(stored_filename)),
                Err(e @ StorageError::Backend(_)) if attempt < max_attempts => {
                    tracing::warn!(
                        token = %pending.token(),
                        filename = %pending.filename(),
                        attempt,
                        error = %e,
                        "保存に失敗、再試行します"
                    );
                    tokio::time::sleep(self.config.storage_retry_backoff).await;
                    attempt += 1;
                }
                Err(source) => {
                    tracing::error!(
                        token = %pending.token(),
                        filename = %pending.filename(),
                        attempt,
                        error = %source,
                        "署名済みファイルの保存に失敗"
                    );
                    return Err(SignError::StorageFailed {
                        pending: Box::new(pending),
                        source,
                    });
                }
            }
        }
    }
}
