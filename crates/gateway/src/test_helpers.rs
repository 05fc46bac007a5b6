//! # テスト用共通ヘルパー
//!
//! オーケストレーター・エンドポイントのテストで共有するモック実装。

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xmlsig_types::{CertificateInfo, NameInfo, PkiBrazilInfo};

use crate::config::{GatewayState, SignatureDefaults};
use crate::document::DocumentSource;
use crate::orchestrator::{SignatureConfig, SignatureOrchestrator};
use crate::remote::{FinalizedSignature, RegistrationRequest, RemoteError, RemoteSigningClient};
use crate::storage::{BlobStore, StorageError};

/// テスト用の一時ディレクトリパス（未作成）
pub fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("xmlsig-{label}-{}", uuid::Uuid::new_v4()))
}

/// ドキュメントディレクトリにファイルを書き込む。
pub fn write_document(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), bytes).unwrap();
}

/// モックが返す署名者証明書
pub fn test_certificate() -> CertificateInfo {
    CertificateInfo {
        subject_name: NameInfo {
            common_name: Some("ALAN MATHISON TURING".to_string()),
            country: Some("BR".to_string()),
            ..Default::default()
        },
        issuer_name: NameInfo {
            common_name: Some("AC Teste".to_string()),
            organization: Some("ICP-Brasil".to_string()),
            ..Default::default()
        },
        serial_number: "0a1b2c3d".to_string(),
        validity_start: "2024-01-01T00:00:00Z".to_string(),
        validity_end: "2027-01-01T00:00:00Z".to_string(),
        email_address: None,
        pki_brazil: Some(PkiBrazilInfo {
            cpf: Some("56072386105".to_string()),
            ..Default::default()
        }),
    }
}

struct MockSession {
    document: Vec<u8>,
    signed: bool,
    consumed: bool,
}

#[derive(Default)]
struct MockRemoteInner {
    queued_tokens: VecDeque<String>,
    next_id: u32,
    sessions: HashMap<String, MockSession>,
    registrations: Vec<RegistrationRequest>,
    finalize_calls: usize,
    finalize_failure: Option<String>,
}

/// メモリ内でトークンを管理するモックリモート署名サービス。
///
/// - 登録ごとにトークンを発行する（事前に指定したトークンを優先）
/// - `sign_out_of_band` でクライアント側の署名をシミュレートする
/// - 確定に成功したトークンは使用済みになり、以後は `TokenNotFound`
pub struct MockRemote {
    inner: Mutex<MockRemoteInner>,
    reject_registration: Option<String>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockRemoteInner::default()),
            reject_registration: None,
        }
    }

    /// 指定したトークンを順に発行する。
    pub fn with_tokens<const N: usize>(tokens: [&str; N]) -> Self {
        let remote = Self::new();
        remote
            .inner
            .lock()
            .unwrap()
            .queued_tokens
            .extend(tokens.iter().map(|t| t.to_string()));
        remote
    }

    /// 全ての登録を拒否する。
    pub fn rejecting_registration(reason: &str) -> Self {
        Self {
            inner: Mutex::new(MockRemoteInner::default()),
            reject_registration: Some(reason.to_string()),
        }
    }

    /// クライアント側の署名（ブラウザ等での秘密鍵操作）が行われたことにする。
    pub fn sign_out_of_band(&self, token: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.get_mut(token).unwrap().signed = true;
    }

    /// 次の確定呼び出しを通信障害として失敗させる。
    pub fn fail_next_finalize(&self, reason: &str) {
        self.inner.lock().unwrap().finalize_failure = Some(reason.to_string());
    }

    pub fn register_calls(&self) -> usize {
        self.inner.lock().unwrap().registrations.len()
    }

    pub fn finalize_calls(&self) -> usize {
        self.inner.lock().unwrap().finalize_calls
    }

    pub fn last_registration(&self) -> Option<RegistrationRequest> {
        self.inner.lock().unwrap().registrations.last().cloned()
    }

    /// ドキュメントに対してモックが返す署名済みバイト列
    pub fn signed_bytes_for(document: &[u8]) -> Vec<u8> {
        [document, b"<!-- signed -->"].concat()
    }
}

#[async_trait::async_trait]
impl RemoteSigningClient for MockRemote {
    async fn register(&self, request: RegistrationRequest) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.registrations.push(request.clone());

        if let Some(reason) = &self.reject_registration {
            return Err(RemoteError::Rejected(reason.clone()));
        }

        let token = match inner.queued_tokens.pop_front() {
            Some(token) => token,
            None => {
                inner.next_id += 1;
                format!("tok{:06}", inner.next_id)
            }
        };
        inner.sessions.insert(
            token.clone(),
            MockSession {
                document: request.document,
                signed: false,
                consumed: false,
            },
        );
        Ok(token)
    }

    async fn finalize(&self, token: &str) -> Result<FinalizedSignature, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.finalize_calls += 1;

        if let Some(reason) = inner.finalize_failure.take() {
            return Err(RemoteError::Unavailable(reason));
        }

        let session = inner
            .sessions
            .get_mut(token)
            .ok_or_else(|| RemoteError::TokenNotFound(token.to_string()))?;
        if session.consumed {
            return Err(RemoteError::TokenNotFound(format!("{token}: 使用済み")));
        }
        if !session.signed {
            return Err(RemoteError::NotReady(token.to_string()));
        }
        session.consumed = true;

        Ok(FinalizedSignature {
            signed_bytes: Self::signed_bytes_for(&session.document),
            certificate: test_certificate(),
        })
    }
}

/// メモリ内のモックBlob Store。指定回数だけ保存を失敗させられる。
pub struct MockBlobStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failures_remaining: AtomicU32,
    store_calls: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// 最初の `failures` 回の保存を一時的な障害として失敗させる。
    pub fn failing(failures: u32) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            failures_remaining: AtomicU32::new(failures),
            store_calls: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(filename).cloned()
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BlobStore for MockBlobStore {
    async fn store(&self, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::Backend("一時的な障害".to_string()));
        }
        self.files
            .lock()
            .unwrap()
            .insert(filename.to_string(), bytes.to_vec());
        Ok(filename.to_string())
    }

    async fn fetch(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get(filename))
    }
}

/// モックを組み込んだテスト用GatewayStateを構築する。
///
/// ドキュメントディレクトリには `sample.xml` が配置される。
pub fn test_state(remote: Arc<MockRemote>, store: Arc<MockBlobStore>) -> Arc<GatewayState> {
    let dir = temp_dir("endpoints");
    write_document(
        &dir,
        "sample.xml",
        b"<NFe><infNFe Id=\"NFe35141214314050000662550010001084271182362300\"/></NFe>",
    );
    let documents = DocumentSource::new(dir);

    let orchestrator = SignatureOrchestrator::new(
        remote,
        store.clone(),
        documents.clone(),
        SignatureConfig {
            policies: HashMap::from([(
                "NFePadraoNacional".to_string(),
                "policy-nfe-id".to_string(),
            )]),
            security_context_id: None,
            max_storage_attempts: 1,
            storage_retry_backoff: Duration::from_millis(1),
        },
    );

    Arc::new(GatewayState {
        orchestrator,
        documents,
        blob_store: store,
        defaults: SignatureDefaults {
            document: "sample.xml".to_string(),
            element_id: "NFe35141214314050000662550010001084271182362300".to_string(),
            policy: "NFePadraoNacional".to_string(),
        },
        max_upload_size: 1024,
    })
}
