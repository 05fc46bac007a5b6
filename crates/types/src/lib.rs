//! # XmlSig Gateway 共有型定義
//!
//! Gatewayの HTTP API とリモート署名サービスの間でやり取りされる
//! データ構造をRust構造体として提供する。
//!
//! ## エンコーディング規則
//! - Base64: XMLドキュメント・署名済みXML等のバイナリデータ
//! - Hex: SHA-256ダイジェスト
//! - 日時: リモート署名サービスが返すISO 8601文字列をそのまま保持する

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// POST /signature (Phase 1)
// ---------------------------------------------------------------------------

/// POST /signature リクエスト。
///
/// 全フィールドが省略可能。省略時はGateway設定のデフォルト値を使用する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSignatureRequest {
    /// 署名対象ドキュメントの参照（ドキュメントディレクトリからの相対ファイル名）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// 署名対象要素のID属性値
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// 署名ポリシーのエイリアス（例: "NFePadraoNacional"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// POST /signature レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSignatureResponse {
    /// リモート署名サービスが発行した不透明トークン。
    /// クライアント側の署名処理と Phase 2 の呼び出しに使用する。
    pub token: String,
}

// ---------------------------------------------------------------------------
// POST /signature/{token} (Phase 2)
// ---------------------------------------------------------------------------

/// POST /signature/{token} レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteSignatureResponse {
    /// Blob Storeに保存された署名済みXMLのファイル名
    pub filename: String,
    /// 署名者証明書の情報
    pub certificate: CertificateInfo,
    /// 保存したバイト列のSHA-256（Hex）
    pub sha256: String,
}

/// POST /signature/{token} が保存に失敗した場合（503）のレスポンス。
///
/// 確定済みの署名はリモート署名サービス側では再取得できないため、
/// 署名済みXMLをそのまま返す。クライアントは `PUT /files/{reserved_filename}` に
/// `StorePendingRequest` として送り返すことで保存だけを再実行できる。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingStorageResponse {
    /// エラーメッセージ
    pub message: String,
    /// 確定に使用したトークン
    pub token: String,
    /// 予約済みファイル名
    pub reserved_filename: String,
    /// 署名済みXML（Base64）
    pub signed_xml: String,
    /// 署名者証明書の情報
    pub certificate: CertificateInfo,
}

// ---------------------------------------------------------------------------
// PUT /files/{filename}
// ---------------------------------------------------------------------------

/// PUT /files/{filename} リクエスト。保存に失敗した署名の再保存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePendingRequest {
    /// 確定に使用したトークン
    pub token: String,
    /// 署名済みXML（Base64）
    pub signed_xml: String,
    /// 署名者証明書の情報
    pub certificate: CertificateInfo,
}

// ---------------------------------------------------------------------------
// 証明書情報
// ---------------------------------------------------------------------------

/// 署名者証明書のメタデータ。
///
/// 表示用の整形は行わず、リモート署名サービスが返した値を保持するだけのデータ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// サブジェクト名
    pub subject_name: NameInfo,
    /// 発行者名
    pub issuer_name: NameInfo,
    /// シリアル番号（Hex）
    pub serial_number: String,
    /// 有効期間の開始日時
    pub validity_start: String,
    /// 有効期間の終了日時
    pub validity_end: String,
    /// メールアドレス（証明書に含まれる場合）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// ICP-Brasil固有フィールド（ICP-Brasil証明書の場合）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_brazil: Option<PkiBrazilInfo>,
}

/// X.500 名の主要な属性。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameInfo {
    /// CN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    /// O
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// OU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_unit: Option<String>,
    /// C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// ICP-Brasil証明書の個人・法人識別情報。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiBrazilInfo {
    /// 個人納税者番号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    /// 法人納税者番号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnpj: Option<String>,
    /// 法人証明書の責任者名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsavel: Option<String>,
    /// 法人名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /documents
// ---------------------------------------------------------------------------

/// POST /documents レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDocumentResponse {
    /// POST /signature の `document` に指定できる参照
    pub document: String,
    /// 保存したドキュメントのサイズ（バイト）
    pub size: u64,
}
