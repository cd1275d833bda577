//! Document store client tests against an in-process mock of the store API.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{Multipart, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};

use paperchat::docstore::{DocStoreClient, DocStoreError};

const PDF_BYTES: &[u8] = b"%PDF-1.4 fake";

async fn health() -> axum::Json<Value> {
    axum::Json(json!({"status": "ok", "service": "mock-store"}))
}

async fn list_documents() -> axum::Json<Value> {
    axum::Json(json!([
        {"filename": "paper.pdf", "size": 13, "upload_time": "1717000000.0"},
        {"filename": "survey.pdf", "size": 999, "upload_time": "1717000001.0"},
    ]))
}

async fn upload_document(mut multipart: Multipart) -> impl IntoResponse {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap_or_default();

        // the mock refuses "bad.pdf" so the client's 400 mapping is testable
        if filename.starts_with("bad") {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({"detail": "Only PDF files are allowed"})),
            );
        }
        return (
            StatusCode::OK,
            axum::Json(json!({
                "filename": filename,
                "size": data.len(),
                "message": "File uploaded successfully",
            })),
        );
    }
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({"detail": "missing file field"})),
    )
}

async fn fetch_document(Path(filename): Path<String>) -> impl IntoResponse {
    if filename == "paper.pdf" {
        (StatusCode::OK, PDF_BYTES.to_vec()).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"detail": "Document not found"})),
        )
            .into_response()
    }
}

async fn delete_document(Path(filename): Path<String>) -> impl IntoResponse {
    if filename == "paper.pdf" {
        (
            StatusCode::OK,
            axum::Json(json!({"message": "Document paper.pdf deleted successfully"})),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"detail": "Document not found"})),
        )
            .into_response()
    }
}

async fn spawn_mock_store() -> SocketAddr {
    let app = Router::new()
        .route("/health", get(health))
        .route("/documents", get(list_documents))
        .route("/documents/upload", axum::routing::post(upload_document))
        .route(
            "/documents/{filename}",
            get(fetch_document).delete(delete_document),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn client() -> DocStoreClient {
    let addr = spawn_mock_store().await;
    DocStoreClient::new(format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn test_health() {
    let client = client().await;
    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn test_list_documents() {
    let client = client().await;
    let documents = client.list().await.unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].filename, "paper.pdf");
    assert_eq!(documents[0].size, 13);
    assert_eq!(documents[1].filename, "survey.pdf");
}

#[tokio::test]
async fn test_upload() {
    let client = client().await;
    let receipt = client
        .upload("paper.pdf", PDF_BYTES.to_vec())
        .await
        .unwrap();
    assert_eq!(receipt.filename, "paper.pdf");
    assert_eq!(receipt.size, PDF_BYTES.len() as u64);
}

#[tokio::test]
async fn test_upload_rejected_by_store() {
    let client = client().await;
    let err = client
        .upload("bad.pdf", PDF_BYTES.to_vec())
        .await
        .unwrap_err();
    match err {
        DocStoreError::InvalidDocument(message) => {
            assert!(message.contains("Only PDF files are allowed"));
        }
        other => panic!("expected InvalidDocument, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_document() {
    let client = client().await;
    let content = client.fetch("paper.pdf").await.unwrap();
    assert_eq!(content.as_ref(), PDF_BYTES);
}

#[tokio::test]
async fn test_fetch_missing_document() {
    let client = client().await;
    let err = client.fetch("nope.pdf").await.unwrap_err();
    assert!(matches!(err, DocStoreError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_document() {
    let client = client().await;
    client.delete("paper.pdf").await.unwrap();

    let err = client.delete("nope.pdf").await.unwrap_err();
    assert!(matches!(err, DocStoreError::NotFound(_)));
}
