use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use xmlsig_types::{
    PendingStorageResponse, StartSignatureRequest, StartSignatureResponse, StorePendingRequest,
};

use super::*;
use crate::endpoints::handle_store_pending;
use crate::test_helpers::{test_state, MockBlobStore, MockRemote};

async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn json_body(request: &StartSignatureRequest) -> Bytes {
    Bytes::from(serde_json::to_vec(request).unwrap())
}

/// ボディ省略時に既定値で登録され、トークンがキャッシュ禁止で返ることを確認
#[tokio::test]
async fn test_start_with_defaults() {
    let remote = Arc::new(MockRemote::with_tokens(["tokA"]));
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));

    let response = handle_start(State(state), HeaderMap::new(), Bytes::new())
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let body: StartSignatureResponse = body_json(response).await;
    assert_eq!(body.token, "tokA");

    let registration = remote.last_registration().unwrap();
    assert_eq!(
        registration.element_id,
        "NFe35141214314050000662550010001084271182362300"
    );
    assert_eq!(registration.policy_id, "policy-nfe-id");
}

#[tokio::test]
async fn test_start_with_unknown_policy_is_bad_request() {
    let remote = Arc::new(MockRemote::new());
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));

    let result = handle_start(
        State(state),
        json_headers(),
        json_body(&StartSignatureRequest {
            policy: Some("Unknown".to_string()),
            ..Default::default()
        }),
    )
    .await;

    let response = result.err().unwrap().into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(remote.register_calls(), 0);
}

#[tokio::test]
async fn test_start_with_missing_document_is_unprocessable() {
    let remote = Arc::new(MockRemote::new());
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));

    let result = handle_start(
        State(state),
        json_headers(),
        json_body(&StartSignatureRequest {
            document: Some("missing.xml".to_string()),
            ..Default::default()
        }),
    )
    .await;

    let response = result.err().unwrap().into_response();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(remote.register_calls(), 0);
}

/// 開始→クライアント署名→完了の一連の流れを確認
#[tokio::test]
async fn test_complete_after_out_of_band_signing() {
    let remote = Arc::new(MockRemote::with_tokens(["tokA"]));
    let store = Arc::new(MockBlobStore::new());
    let state = test_state(remote.clone(), store.clone());

    handle_start(State(state.clone()), HeaderMap::new(), Bytes::new())
        .await
        .unwrap();

    // クライアント側の署名前は 409
    let not_ready = handle_complete(State(state.clone()), Path("tokA".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(not_ready.status(), StatusCode::CONFLICT);

    remote.sign_out_of_band("tokA");
    let response = handle_complete(State(state.clone()), Path("tokA".to_string()))
        .await
        .unwrap()
        .0;

    assert!(response.filename.ends_with(".xml"));
    assert_eq!(
        response.certificate.subject_name.common_name.as_deref(),
        Some("ALAN MATHISON TURING")
    );
    let stored = store.get(&response.filename).unwrap();
    assert!(stored.ends_with(b"<!-- signed -->"));
    assert_eq!(response.sha256.len(), 64);

    // 使用済みトークンは 404
    let again = handle_complete(State(state), Path("tokA".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_complete_with_malformed_token_is_bad_request() {
    let remote = Arc::new(MockRemote::new());
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));

    let response = handle_complete(State(state), Path("a.b".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(remote.finalize_calls(), 0);
}

#[tokio::test]
async fn test_complete_storage_failure_is_service_unavailable() {
    let remote = Arc::new(MockRemote::with_tokens(["tokA"]));
    let store = Arc::new(MockBlobStore::failing(1));
    let state = test_state(remote.clone(), store.clone());

    handle_start(State(state.clone()), HeaderMap::new(), Bytes::new())
        .await
        .unwrap();
    remote.sign_out_of_band("tokA");

    let response = handle_complete(State(state), Path("tokA".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(remote.finalize_calls(), 1);
    assert_eq!(store.store_calls(), 1);
}

#[tokio::test]
async fn test_remote_registration_failure_is_bad_gateway() {
    let remote = Arc::new(MockRemote::rejecting_registration("policy not allowed"));
    let state = test_state(remote, Arc::new(MockBlobStore::new()));

    let response = handle_start(State(state), HeaderMap::new(), Bytes::new())
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

/// 保存に失敗した署名を503レスポンスの内容から同じファイル名で保存し直せることを確認
#[tokio::test]
async fn test_storage_failure_then_store_pending_over_http() {
    let remote = Arc::new(MockRemote::with_tokens(["tokA"]));
    let store = Arc::new(MockBlobStore::failing(1));
    let state = test_state(remote.clone(), store.clone());

    handle_start(State(state.clone()), HeaderMap::new(), Bytes::new())
        .await
        .unwrap();
    remote.sign_out_of_band("tokA");

    let failed = handle_complete(State(state.clone()), Path("tokA".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(failed.status(), StatusCode::SERVICE_UNAVAILABLE);
    let pending: PendingStorageResponse = body_json(failed).await;
    assert_eq!(pending.token, "tokA");
    let signed_xml = base64::engine::general_purpose::STANDARD
        .decode(&pending.signed_xml)
        .unwrap();
    assert!(signed_xml.ends_with(b"<!-- signed -->"));
    assert!(store.get(&pending.reserved_filename).is_none());

    // トークンは使用済みのため確定はやり直せない
    let again = handle_complete(State(state.clone()), Path("tokA".to_string()))
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let stored = handle_store_pending(
        State(state),
        Path(pending.reserved_filename.clone()),
        Json(StorePendingRequest {
            token: pending.token,
            signed_xml: pending.signed_xml,
            certificate: pending.certificate,
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(stored.filename, pending.reserved_filename);
    assert_eq!(store.get(&stored.filename).unwrap(), signed_xml);
    assert_eq!(
        stored.certificate.subject_name.common_name.as_deref(),
        Some("ALAN MATHISON TURING")
    );
    assert_eq!(remote.finalize_calls(), 2);
}

/// JSON以外のボディで既定値に黙って置き換えないことを確認
#[tokio::test]
async fn test_start_body_without_json_content_type_is_rejected() {
    let remote = Arc::new(MockRemote::new());
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));
    let body = json_body(&StartSignatureRequest {
        document: Some("other.xml".to_string()),
        ..Default::default()
    });

    let mut text_headers = HeaderMap::new();
    text_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

    for headers in [HeaderMap::new(), text_headers] {
        let response = handle_start(State(state.clone()), headers, body.clone())
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
    assert_eq!(remote.register_calls(), 0);
}

#[tokio::test]
async fn test_start_with_malformed_json_is_bad_request() {
    let remote = Arc::new(MockRemote::new());
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));

    let body = Bytes::from_static(b"{\"document\":");
    let response = handle_start(State(state), json_headers(), body)
        .await
        .err()
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(remote.register_calls(), 0);
}

#[tokio::test]
async fn test_start_with_json_charset_uses_body() {
    let remote = Arc::new(MockRemote::with_tokens(["tokB"]));
    let state = test_state(remote.clone(), Arc::new(MockBlobStore::new()));
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );

    let response = handle_start(
        State(state),
        headers,
        json_body(&StartSignatureRequest {
            element_id: Some("NFe99".to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remote.last_registration().unwrap().element_id, "NFe99");
}
