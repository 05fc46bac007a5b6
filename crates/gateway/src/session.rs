//! # 署名セッション
//!
//! 2フェーズ署名の1回分を表す。セッション状態はリモート署名サービスが
//! トークンをキーとして保持しており、このモジュールはプロセス内に
//! セッションを保存しない。Phase 1 と Phase 2 はトークンだけで関連付けられる。

use std::fmt;

/// トークンの最大長
const MAX_TOKEN_LEN: usize = 128;

/// リモート署名サービスが発行した不透明トークン。
///
/// 呼び出し元から受け取った値は構文だけをここで検証し、
/// 存在・有効期限の判定はリモートサービスに委ねる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

/// トークンの構文エラー。
#[derive(Debug, thiserror::Error)]
#[error("不正なトークン形式: {0}")]
pub struct MalformedToken(String);

impl SessionToken {
    /// URLセーフな英数字（`[A-Za-z0-9_-]`、1〜128文字）のみを受け付ける。
    pub fn parse(raw: &str) -> Result<Self, MalformedToken> {
        if raw.is_empty() || raw.len() > MAX_TOKEN_LEN {
            return Err(MalformedToken(format!(
                "長さは1〜{MAX_TOKEN_LEN}文字である必要があります"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(MalformedToken(
                "使用できない文字が含まれています".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 署名セッションの状態。
///
/// `Started → Completed` または `Started → Failed`。終端状態からは遷移しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Phase 1 完了、Phase 2 待ち
    Started,
    /// 確定と保存の両方に成功
    Completed,
    /// いずれかのフェーズで回復不能なエラー
    Failed,
}

impl SessionState {
    /// Phase 2 の結果から終端状態を決める。
    /// 使用済みトークンはリモートサービスが拒否するため、終端状態から先の遷移はない。
    pub fn after<T, E>(outcome: &Result<T, E>) -> SessionState {
        match outcome {
            Ok(_) => SessionState::Completed,
            Err(_) => SessionState::Failed,
        }
    }
}

/// Phase 1 で開始された署名セッション。
///
/// ドキュメント参照・対象要素・ポリシーは開始後に変更できない。
#[derive(Debug, Clone)]
pub struct SigningSession {
    token: SessionToken,
    document_ref: String,
    element_id: String,
    policy: String,
    state: SessionState,
}

impl SigningSession {
    pub(crate) fn started(
        token: SessionToken,
        document_ref: String,
        element_id: String,
        policy: String,
    ) -> Self {
        Self {
            token,
            document_ref,
            element_id,
            policy,
            state: SessionState::Started,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn document_ref(&self) -> &str {
        &self.document_ref
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// トークンを取り出してセッションを消費する。
    pub fn into_token(self) -> SessionToken {
        self.token
    }
}
