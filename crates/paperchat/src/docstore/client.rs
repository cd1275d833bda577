//! HTTP client for the document store.

use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::error::{DocStoreError, DocStoreResult};

/// One stored document, as the store reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size: u64,
    pub upload_time: String,
}

/// The store's answer to a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub size: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// Client for the document store API.
#[derive(Debug, Clone)]
pub struct DocStoreClient {
    client: Client,
    base_url: String,
}

impl DocStoreClient {
    /// Create a new client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> DocStoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    /// Check whether the store is up.
    pub async fn health(&self) -> DocStoreResult<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| DocStoreError::Parse(e.to_string()))?;
        Ok(body.status == "ok")
    }

    /// List all stored documents.
    pub async fn list(&self) -> DocStoreResult<Vec<DocumentInfo>> {
        let url = format!("{}/documents", self.base_url);
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Upload a PDF document.
    ///
    /// Non-PDF filenames are rejected locally; the store enforces the same
    /// rule server-side.
    pub async fn upload(&self, filename: &str, content: Vec<u8>) -> DocStoreResult<UploadReceipt> {
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(DocStoreError::InvalidDocument(format!(
                "{filename}: only PDF files are allowed"
            )));
        }

        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| DocStoreError::InvalidDocument(e.to_string()))?;
        let form = Form::new().part("file", part);

        let url = format!("{}/documents/upload", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;
        self.handle_response(response).await
    }

    /// Download a document's raw bytes.
    pub async fn fetch(&self, filename: &str) -> DocStoreResult<Bytes> {
        let url = format!("{}/documents/{}", self.base_url, filename);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(DocStoreError::NotFound(filename.to_string())),
            status => Err(self.api_error(status, response).await),
        }
    }

    /// Delete a document.
    pub async fn delete(&self, filename: &str) -> DocStoreResult<()> {
        let url = format!("{}/documents/{}", self.base_url, filename);
        let response = self.client.delete(&url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(DocStoreError::NotFound(filename.to_string())),
            status => Err(self.api_error(status, response).await),
        }
    }

    /// Parse a JSON body or map the failure status.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> DocStoreResult<T> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| DocStoreError::Parse(e.to_string()))
        } else if status == StatusCode::BAD_REQUEST {
            let message = self.error_message(response).await;
            Err(DocStoreError::InvalidDocument(message))
        } else {
            Err(self.api_error(status, response).await)
        }
    }

    async fn api_error(&self, status: StatusCode, response: reqwest::Response) -> DocStoreError {
        let message = self.error_message(response).await;
        DocStoreError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// The store reports errors as `{"detail": "..."}`; fall back to the
    /// raw body when it doesn't.
    async fn error_message(&self, response: reqwest::Response) -> String {
        match response.text().await {
            Ok(body) => match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => parsed.detail,
                Err(_) => body,
            },
            Err(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_stripped() {
        let client = DocStoreClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_non_pdf_upload_rejected_locally() {
        let client = DocStoreClient::new("http://127.0.0.1:1").unwrap();
        let err = client.upload("notes.txt", b"hello".to_vec()).await.unwrap_err();
        assert!(matches!(err, DocStoreError::InvalidDocument(_)));
    }
}
