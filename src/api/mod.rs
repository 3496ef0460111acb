//! Document-fetch API client.

use futures::future::BoxFuture;
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::models::{DocumentPage, DocumentRecord, ListQuery};
use crate::services::transport::{Session, CLIENT_ID_HEADER};

/// Authoritative reads of document snapshots.
pub trait DocumentApi: Send + Sync + 'static {
    fn fetch_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<DocumentRecord, ApiError>>;

    fn fetch_page<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, Result<DocumentPage, ApiError>>;
}

/// HTTP client for the backend's document endpoints.
pub struct HttpDocumentApi {
    client: reqwest::Client,
    base_url: String,
    session: Session,
}

impl HttpDocumentApi {
    /// `base_url` should be like `http://localhost:8000` (no trailing slash).
    pub fn new(base_url: &str, session: Session) -> Self {
        HttpDocumentApi {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn document_url(&self, id: &str) -> String {
        format!("{}/api/documents/{}", self.base_url, id)
    }

    pub fn list_url(&self) -> String {
        format!("{}/api/documents", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        debug!(url = %url, "fetching");
        let mut request = self
            .client
            .get(url)
            .query(params)
            .header(CLIENT_ID_HEADER, self.session.client_id.to_string());
        if let Some(cookie) = &self.session.cookie {
            request = request.header(COOKIE, cookie.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl DocumentApi for HttpDocumentApi {
    fn fetch_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<DocumentRecord, ApiError>> {
        Box::pin(async move {
            let url = self.document_url(id);
            self.get_json(&url, &[]).await
        })
    }

    fn fetch_page<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, Result<DocumentPage, ApiError>> {
        Box::pin(async move {
            let url = self.list_url();
            let mut page: DocumentPage = self.get_json(&url, &query.to_params()).await?;
            if page.page_size == 0 {
                page.page_size = query.page_size;
            }
            Ok(page)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let api = HttpDocumentApi::new("http://localhost:8000/", Session::anonymous());
        assert_eq!(api.base_url, "http://localhost:8000");
        assert_eq!(api.document_url("abc"), "http://localhost:8000/api/documents/abc");
        assert_eq!(api.list_url(), "http://localhost:8000/api/documents");
    }

    #[test]
    fn document_json_from_backend() {
        let json = r#"{
            "id": "b3f1",
            "status": "Analizado",
            "upload_date": "2024-05-02T14:21:09",
            "balance_date": "2023-12-31",
            "page_count": 18,
            "file_name": "EECC_2023.pdf",
            "validation": {"status": "Validado", "message": []},
            "processing_time": {"upload_convert": 4.2, "recognize": 31.0, "extract": 55.8, "validation": 2.1, "total": 93.1}
        }"#;
        let record: DocumentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.page_count, Some(18));
        assert_eq!(record.processing_time.as_ref().unwrap().total, Some(93.1));
        assert_eq!(record.file_name(), Some("EECC_2023.pdf"));
    }
}
