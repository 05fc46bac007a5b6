//! # リモート署名サービス
//!
//! 署名の登録（Phase 1）と確定（Phase 2）を行う外部トラストサービスの抽象インターフェース。
//! REST PKI 互換サービスの実装は `restpki` サブモジュールを参照。
//!
//! どちらの操作も遅く、失敗し得て、冪等性が保証されないネットワーク呼び出しとして扱う。
//! このモジュールはリトライを行わない。

pub mod restpki;

pub use restpki::RestPkiClient;

use xmlsig_types::CertificateInfo;

/// リモート署名サービスのエラー分類。
///
/// トランスポート層のエラーもここで分類し、呼び出し元に生のエラーを渡さない。
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// トークンが存在しない、期限切れ、または使用済み
    #[error("トークンが無効または期限切れです: {0}")]
    TokenNotFound(String),
    /// クライアント側の署名処理がまだ行われていない
    #[error("クライアント側の署名が完了していません: {0}")]
    NotReady(String),
    /// リクエスト内容が拒否された（不明な要素ID、不正なポリシー等）
    #[error("リクエストが拒否されました: {0}")]
    Rejected(String),
    /// 通信失敗・サーバーエラー・不正なレスポンス
    #[error("リモート署名サービスとの通信に失敗: {0}")]
    Unavailable(String),
}

/// Phase 1 で登録する署名対象。
/// 1つのドキュメントと1つの対象要素に束縛される。
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// 署名対象XMLのバイト列
    pub document: Vec<u8>,
    /// 署名対象要素のID属性値
    pub element_id: String,
    /// リモートサービス側の署名ポリシーID
    pub policy_id: String,
    /// 証明書チェーンの信頼判定に使うセキュリティコンテキストID
    pub security_context_id: Option<String>,
}

/// Phase 2 の確定結果。
#[derive(Debug, Clone)]
pub struct FinalizedSignature {
    /// 署名済みXMLのバイト列
    pub signed_bytes: Vec<u8>,
    /// 署名者証明書の情報
    pub certificate: CertificateInfo,
}

/// リモート署名サービスの抽象インターフェース。
///
/// セッション状態はリモートサービス側がトークンをキーとして保持する。
#[async_trait::async_trait]
pub trait RemoteSigningClient: Send + Sync {
    /// 署名対象を登録し、不透明トークンを返す。
    async fn register(&self, request: RegistrationRequest) -> Result<String, RemoteError>;

    /// トークンに対応する署名を確定し、署名済みバイト列と証明書情報を返す。
    /// 確定に成功したトークンは再利用できない。
    /// クライアント側の署名前であれば `NotReady` を返し、トークンはそのまま使える。
    async fn finalize(&self, token: &str) -> Result<FinalizedSignature, RemoteError>;
}
