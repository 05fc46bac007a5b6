//! # REST PKI クライアント
//!
//! REST PKI 互換のトラストサービスに対するXML要素署名の開始・確定。
//!
//! ## エンドポイント
//! - `POST Api/XmlSignatures/XmlElementSignature` — 署名対象の登録、トークン発行
//! - `POST Api/XmlSignatures/{token}/Finalize` — 署名の確定、署名済みXMLの取得

use base64::Engine;
use serde::{Deserialize, Serialize};
use xmlsig_types::{CertificateInfo, NameInfo, PkiBrazilInfo};

use super::{FinalizedSignature, RegistrationRequest, RemoteError, RemoteSigningClient};

/// Base64エンジン（Standard）
fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// 署名開始リクエスト（REST PKI ワイヤ形式）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct XmlElementSignatureRequest {
    xml: String,
    element_to_sign_id: String,
    signature_policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_context_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlElementSignatureResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeResponse {
    signed_xml: String,
    certificate: WireCertificate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCertificate {
    #[serde(default)]
    subject_name: WireName,
    #[serde(default)]
    issuer_name: WireName,
    #[serde(default)]
    serial_number: String,
    #[serde(default)]
    validity_start: String,
    #[serde(default)]
    validity_end: String,
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    pki_brazil: Option<WirePkiBrazil>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireName {
    #[serde(default)]
    common_name: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    organization_unit: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePkiBrazil {
    #[serde(default)]
    cpf: Option<String>,
    #[serde(default)]
    cnpj: Option<String>,
    #[serde(default)]
    responsavel: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
}

/// エラーレスポンス本文。メッセージ抽出にのみ使う。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<WireName> for NameInfo {
    fn from(name: WireName) -> Self {
        NameInfo {
            common_name: name.common_name,
            organization: name.organization,
            organization_unit: name.organization_unit,
            country: name.country,
        }
    }
}

impl From<WireCertificate> for CertificateInfo {
    fn from(cert: WireCertificate) -> Self {
        CertificateInfo {
            subject_name: cert.subject_name.into(),
            issuer_name: cert.issuer_name.into(),
            serial_number: cert.serial_number,
            validity_start: cert.validity_start,
            validity_end: cert.validity_end,
            email_address: cert.email_address,
            pki_brazil: cert.pki_brazil.map(|p| PkiBrazilInfo {
                cpf: p.cpf,
                cnpj: p.cnpj,
                responsavel: p.responsavel,
                company_name: p.company_name,
            }),
        }
    }
}

/// HTTPステータスとレスポンス本文からエラーを分類する。
///
/// - 404 / 410: トークンが存在しない・期限切れ・使用済み
/// - 409 / 425: クライアント側の署名が未完了
/// - その他の4xx: リクエストの拒否
/// - 5xx: サービス側の障害
fn classify_error(status: reqwest::StatusCode, body: &str) -> RemoteError {
    let detail = match serde_json::from_str::<WireErrorBody>(body) {
        Ok(WireErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("HTTP {status} [{code}] {message}"),
        Ok(WireErrorBody {
            message: Some(message),
            ..
        }) => format!("HTTP {status} {message}"),
        _ => format!("HTTP {status} - {body}"),
    };

    match status.as_u16() {
        404 | 410 => RemoteError::TokenNotFound(detail),
        409 | 425 => RemoteError::NotReady(detail),
        400..=499 => RemoteError::Rejected(detail),
        _ => RemoteError::Unavailable(detail),
    }
}

/// REST PKI 互換サービスのクライアント。
pub struct RestPkiClient {
    /// HTTPクライアント（タイムアウトは構築側で設定する）
    http_client: reqwest::Client,
    /// サービスのベースURL（末尾の `/` は除去済み）
    endpoint: String,
    /// APIアクセストークン
    access_token: String,
}

impl RestPkiClient {
    /// 新しいRestPkiClientを作成する。
    ///
    /// # 引数
    /// - `http_client`: 共有HTTPクライアント
    /// - `endpoint`: サービスのベースURL（例: "https://pki.rest/"）
    /// - `access_token`: APIアクセストークン
    pub fn new(http_client: reqwest::Client, endpoint: &str, access_token: String) -> Self {
        Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// JSONボディをPOSTし、成功時のレスポンス本文を返す。
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("レスポンス読み取り失敗: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &response_body));
        }

        Ok(response_body)
    }
}

#[async_trait::async_trait]
impl RemoteSigningClient for RestPkiClient {
    async fn register(&self, request: RegistrationRequest) -> Result<String, RemoteError> {
        let body = XmlElementSignatureRequest {
            xml: b64().encode(&request.document),
            element_to_sign_id: request.element_id,
            signature_policy_id: request.policy_id,
            security_context_id: request.security_context_id,
        };

        let response_body = self
            .post_json("Api/XmlSignatures/XmlElementSignature", &body)
            .await?;

        let response: XmlElementSignatureResponse = serde_json::from_str(&response_body)
            .map_err(|e| RemoteError::Unavailable(format!("レスポンスのパースに失敗: {e}")))?;

        if response.token.is_empty() {
            return Err(RemoteError::Unavailable(
                "空のトークンが返されました".to_string(),
            ));
        }

        Ok(response.token)
    }

    async fn finalize(&self, token: &str) -> Result<FinalizedSignature, RemoteError> {
        let path = format!("Api/XmlSignatures/{token}/Finalize");
        let response_body = self.post_json(&path, &serde_json::json!({})).await?;

        let response: FinalizeResponse = serde_json::from_str(&response_body)
            .map_err(|e| RemoteError::Unavailable(format!("レスポンスのパースに失敗: {e}")))?;

        let signed_bytes = b64().decode(&response.signed_xml).map_err(|e| {
            RemoteError::Unavailable(format!("signedXmlのBase64デコードに失敗: {e}"))
        })?;

        Ok(FinalizedSignature {
            signed_bytes,
            certificate: response.certificate.into(),
        })
    }
}
