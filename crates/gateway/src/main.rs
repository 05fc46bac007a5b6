//! # XmlSig Gateway
//!
//! リモート署名サービス（REST PKI）を使ったXML要素の2フェーズ署名Gateway。
//!
//! ## 役割
//! - 署名対象XMLの読み込みとリモート署名サービスへの登録（Phase 1）
//! - クライアント側署名後の確定と署名済みXMLの保存（Phase 2）
//! - 署名対象XMLのアップロード・署名済みXMLのダウンロード
//!
//! ## API エンドポイント
//! - `POST /signature` — 署名セッション開始、トークンを返す
//! - `POST /signature/{token}` — 署名の確定・保存
//! - `POST /documents` — 署名対象XMLのアップロード
//! - `GET /files/{filename}` — 署名済みXMLのダウンロード
//! - `PUT /files/{filename}` — 保存に失敗した署名の再保存（503レスポンスの内容を送り返す）
//! - `GET /health` — ヘルスチェック

mod config;
mod document;
mod endpoints;
mod error;
mod orchestrator;
mod remote;
mod session;
mod storage;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tracing_subscriber::EnvFilter;

use config::{GatewayConfig, GatewayState, StorageBackend};
use document::DocumentSource;
use endpoints::{
    handle_complete, handle_download_file, handle_health, handle_start, handle_store_pending,
    handle_upload_document,
};
use orchestrator::SignatureOrchestrator;
use remote::{RemoteSigningClient, RestPkiClient};
use storage::{BlobStore, LocalBlobStore};

// ---------------------------------------------------------------------------
// 構築
// ---------------------------------------------------------------------------

/// 設定に従ってBlob Storeを構築する。
fn build_blob_store(backend: &StorageBackend) -> anyhow::Result<Arc<dyn BlobStore>> {
    match backend {
        StorageBackend::Local(dir) => {
            tracing::info!(dir = %dir.display(), "ローカルストレージを使用");
            Ok(Arc::new(LocalBlobStore::new(dir)))
        }
        #[cfg(feature = "vendor-aws")]
        StorageBackend::S3 => Ok(Arc::new(storage::S3BlobStore::from_env()?)),
        #[cfg(not(feature = "vendor-aws"))]
        StorageBackend::S3 => {
            anyhow::bail!("STORAGE_BACKEND=s3 には vendor-aws フィーチャーが必要です")
        }
    }
}

/// 設定とリモートクライアント・Blob StoreからGatewayStateを構築する。
fn build_state(
    config: &GatewayConfig,
    remote: Arc<dyn RemoteSigningClient>,
    blob_store: Arc<dyn BlobStore>,
) -> Arc<GatewayState> {
    let documents = DocumentSource::new(&config.documents_dir);
    let orchestrator = SignatureOrchestrator::new(
        remote,
        blob_store.clone(),
        documents.clone(),
        config.signature_config(),
    );

    Arc::new(GatewayState {
        orchestrator,
        documents,
        blob_store,
        defaults: config.signature_defaults(),
        max_upload_size: config.max_upload_size,
    })
}

/// HTTPルーターを構築する。
fn router(state: Arc<GatewayState>) -> axum::Router {
    let max_upload_size = state.max_upload_size;
    axum::Router::new()
        .route("/signature", post(handle_start))
        .route("/signature/{token}", post(handle_complete))
        .route(
            "/documents",
            post(handle_upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/files/{filename}",
            get(handle_download_file)
                .put(handle_store_pending)
                // 署名済みXMLはBase64で送られるため元のサイズより大きい
                .layer(DefaultBodyLimit::max(max_upload_size.saturating_mul(2))),
        )
        .route("/health", get(handle_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    let http_client = reqwest::Client::builder()
        .timeout(config.remote_timeout)
        .build()?;
    let remote = RestPkiClient::new(
        http_client,
        &config.restpki_endpoint,
        config.restpki_access_token.clone(),
    );
    tracing::info!(
        endpoint = %config.restpki_endpoint,
        policies = config.policies.len(),
        default_policy = %config.default_policy,
        "リモート署名サービスを設定"
    );

    let blob_store = build_blob_store(&config.storage_backend)?;
    let state = build_state(&config, Arc::new(remote), blob_store);
    let app = router(state);

    tracing::info!("Gatewayを {} で起動します", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
