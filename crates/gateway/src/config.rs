//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ読み込み、以後は変更しない。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::document::DocumentSource;
use crate::orchestrator::{SignatureConfig, SignatureOrchestrator};
use crate::storage::BlobStore;

/// 署名済みファイルの保存先。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// ローカルディレクトリ
    Local(PathBuf),
    /// S3互換ストレージ（接続情報は `S3_*` 環境変数）
    S3,
}

/// Gatewayの設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// REST PKI のベースURL
    pub restpki_endpoint: String,
    /// REST PKI のAPIアクセストークン
    pub restpki_access_token: String,
    /// 署名ポリシーのエイリアス → リモートサービス側のポリシーID
    pub policies: HashMap<String, String>,
    /// リクエストで省略された場合の署名ポリシー
    pub default_policy: String,
    /// セキュリティコンテキストID（省略時はポリシーの既定に従う）
    pub security_context_id: Option<String>,
    /// 署名対象ドキュメントのディレクトリ
    pub documents_dir: PathBuf,
    /// リクエストで省略された場合のドキュメント
    pub default_document: String,
    /// リクエストで省略された場合の署名対象要素ID
    pub default_element_id: String,
    /// 署名済みファイルの保存先
    pub storage_backend: StorageBackend,
    /// リモート署名サービスへのリクエストタイムアウト
    pub remote_timeout: Duration,
    /// 保存の最大試行回数
    pub max_storage_attempts: u32,
    /// 保存の再試行までの待機時間
    pub storage_retry_backoff: Duration,
    /// POST /documents の最大サイズ（バイト）
    pub max_upload_size: usize,
    /// リッスンアドレス
    pub bind_addr: String,
}

impl GatewayConfig {
    /// 環境変数から読み込む。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数から読み込む。
    ///
    /// 必須: `RESTPKI_ACCESS_TOKEN`, `SIGNATURE_POLICIES`（`alias=id,alias=id` 形式）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let restpki_access_token = lookup("RESTPKI_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .context("RESTPKI_ACCESS_TOKENが設定されていません")?;
        if restpki_access_token.contains(" API ") {
            bail!("RESTPKI_ACCESS_TOKENがプレースホルダーのままです");
        }

        let policies = parse_policies(&get("SIGNATURE_POLICIES", ""))?;
        let default_policy = get("DEFAULT_POLICY", "NFePadraoNacional");
        if !policies.contains_key(&default_policy) {
            bail!("DEFAULT_POLICY '{default_policy}' がSIGNATURE_POLICIESに含まれていません");
        }

        let storage_backend = match get("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackend::Local(PathBuf::from(get("STORAGE_DIR", "./app-data"))),
            "s3" => StorageBackend::S3,
            other => bail!("不明なSTORAGE_BACKEND: {other}"),
        };

        let max_storage_attempts: u32 = parse_number(&get("MAX_STORAGE_ATTEMPTS", "3"), "MAX_STORAGE_ATTEMPTS")?;
        if max_storage_attempts == 0 {
            bail!("MAX_STORAGE_ATTEMPTSは1以上である必要があります");
        }

        Ok(Self {
            restpki_endpoint: get("RESTPKI_ENDPOINT", "https://pki.rest/"),
            restpki_access_token,
            policies,
            default_policy,
            security_context_id: lookup("SECURITY_CONTEXT_ID").filter(|s| !s.is_empty()),
            documents_dir: PathBuf::from(get("DOCUMENTS_DIR", "./documents")),
            default_document: get("DEFAULT_DOCUMENT", "sample-nfe.xml"),
            default_element_id: get(
                "DEFAULT_ELEMENT_ID",
                "NFe35141214314050000662550010001084271182362300",
            ),
            storage_backend,
            remote_timeout: Duration::from_secs(parse_number(
                &get("REMOTE_TIMEOUT_SECS", "30"),
                "REMOTE_TIMEOUT_SECS",
            )?),
            max_storage_attempts,
            storage_retry_backoff: Duration::from_millis(parse_number(
                &get("STORAGE_RETRY_BACKOFF_MS", "200"),
                "STORAGE_RETRY_BACKOFF_MS",
            )?),
            max_upload_size: parse_number(
                &get("MAX_UPLOAD_SIZE", "10485760"),
                "MAX_UPLOAD_SIZE",
            )?,
            bind_addr: get("BIND_ADDR", "0.0.0.0:3000"),
        })
    }

    /// オーケストレーター用の設定を取り出す。
    pub fn signature_config(&self) -> SignatureConfig {
        SignatureConfig {
            policies: self.policies.clone(),
            security_context_id: self.security_context_id.clone(),
            max_storage_attempts: self.max_storage_attempts,
            storage_retry_backoff: self.storage_retry_backoff,
        }
    }

    /// リクエストで省略された値の既定値。
    pub fn signature_defaults(&self) -> SignatureDefaults {
        SignatureDefaults {
            document: self.default_document.clone(),
            element_id: self.default_element_id.clone(),
            policy: self.default_policy.clone(),
        }
    }
}

/// `alias=id,alias=id` 形式のポリシー一覧をパースする。
fn parse_policies(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut policies = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (alias, id) = entry
            .split_once('=')
            .with_context(|| format!("SIGNATURE_POLICIESの形式が不正です: {entry}"))?;
        let (alias, id) = (alias.trim(), id.trim());
        if alias.is_empty() || id.is_empty() {
            bail!("SIGNATURE_POLICIESの形式が不正です: {entry}");
        }
        policies.insert(alias.to_string(), id.to_string());
    }
    if policies.is_empty() {
        bail!("SIGNATURE_POLICIESが設定されていません");
    }
    Ok(policies)
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}の値が不正です: {raw}"))
}

/// リクエストで省略された値の既定値。
#[derive(Debug, Clone)]
pub struct SignatureDefaults {
    pub document: String,
    pub element_id: String,
    pub policy: String,
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// 署名オーケストレーター
    pub orchestrator: SignatureOrchestrator,
    /// 署名対象ドキュメント（POST /documents の保存先）
    pub documents: DocumentSource,
    /// 署名済みファイルの保存先（GET /files の取得元）
    pub blob_store: Arc<dyn BlobStore>,
    /// リクエストで省略された値の既定値
    pub defaults: SignatureDefaults,
    /// POST /documents の最大サイズ（バイト）
    pub max_upload_size: usize,
}
