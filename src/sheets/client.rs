use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::auth::{ServiceAccountKey, TokenProvider};
use super::SpreadsheetService;
use crate::error::ServiceError;
use crate::models::Cell;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Sheets API v4 over plain REST calls.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsClient {
    pub fn new(key: ServiceAccountKey) -> Self {
        let http = reqwest::Client::new();
        Self {
            tokens: TokenProvider::new(key, http.clone()),
            http,
            base_url: SHEETS_API.to_string(),
        }
    }

    /// Points the client at another endpoint, e.g. a local emulator.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn account(&self) -> &str {
        self.tokens.client_email()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ServiceError::Transport(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ServiceError> {
        let token = self.tokens.token().await?;
        let mut request = self.http.request(method.clone(), url.clone()).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!(%method, %url, "Sheets API request");
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, self.account(), &body))
    }
}

/// Maps a non-success response status to a service error.
pub fn status_error(status: StatusCode, account: &str, body: &str) -> ServiceError {
    match status {
        StatusCode::NOT_FOUND => ServiceError::DocumentNotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ServiceError::Transport(format!("unauthorized ({}) for {}: {}", status, account, body))
        }
        _ => ServiceError::Transport(format!("HTTP {}: {}", status, body)),
    }
}

/// Quotes a tab title for A1 range notation.
pub fn a1_range(tab_title: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", tab_title.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{}!{}", quoted, cell),
        None => quoted,
    }
}

#[async_trait]
impl SpreadsheetService for GoogleSheetsClient {
    async fn tab_titles(&self, document_id: &str) -> Result<Vec<String>, ServiceError> {
        let mut url = self.url(&[document_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");

        let meta: SpreadsheetMeta = self
            .send(Method::GET, url, None)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Transport(format!("malformed spreadsheet metadata: {}", e)))?;

        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn read_tab(&self, document_id: &str, tab_title: &str) -> Result<Vec<Vec<Cell>>, ServiceError> {
        let range = a1_range(tab_title, None);
        let mut url = self.url(&[document_id, "values", &range])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        let values: ValueRange = self
            .send(Method::GET, url, None)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Transport(format!("malformed value range: {}", e)))?;

        Ok(values
            .values
            .iter()
            .map(|row| row.iter().map(Cell::from_json).collect())
            .collect())
    }

    async fn clear_tab(&self, document_id: &str, tab_title: &str) -> Result<(), ServiceError> {
        let range = format!("{}:clear", a1_range(tab_title, None));
        let url = self.url(&[document_id, "values", &range])?;
        self.send(Method::POST, url, Some(json!({}))).await?;
        Ok(())
    }

    async fn write_block(
        &self,
        document_id: &str,
        tab_title: &str,
        start_cell: &str,
        values: &[Vec<Cell>],
    ) -> Result<(), ServiceError> {
        let range = a1_range(tab_title, Some(start_cell));
        let mut url = self.url(&[document_id, "values", &range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let rows: Vec<Vec<serde_json::Value>> = values
            .iter()
            .map(|row| row.iter().map(Cell::to_json).collect())
            .collect();
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });

        self.send(Method::PUT, url, Some(body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleSheetsClient {
        let key = ServiceAccountKey {
            client_email: "sync@example.com".into(),
            private_key: String::new(),
            private_key_id: None,
            token_uri: "http://127.0.0.1:9/token".into(),
        };
        GoogleSheetsClient::new(key)
    }

    #[test]
    fn range_quotes_tab_titles() {
        assert_eq!(a1_range("Data", Some("A1")), "'Data'!A1");
        assert_eq!(a1_range("1-Month-Back Data", None), "'1-Month-Back Data'");
        assert_eq!(a1_range("Bob's", None), "'Bob''s'");
    }

    #[test]
    fn urls_encode_ranges_as_path_segments() {
        let url = client()
            .url(&["doc", "values", &a1_range("Month Back", Some("A1"))])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/doc/values/'Month%20Back'!A1"
        );
    }

    #[test]
    fn missing_document_maps_to_not_found() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "sync@example.com", "Requested entity was not found."),
            ServiceError::DocumentNotFound
        );
    }

    #[test]
    fn auth_failures_are_transport_errors_naming_the_account() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            match status_error(status, "sync@example.com", "caller does not have permission") {
                ServiceError::Transport(reason) => {
                    assert!(reason.starts_with("unauthorized"), "{reason}");
                    assert!(reason.contains("sync@example.com"));
                    assert!(reason.contains("caller does not have permission"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn other_statuses_carry_code_and_body() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "sync@example.com", "quota"),
            ServiceError::Transport("HTTP 429 Too Many Requests: quota".into())
        );
    }

    #[test]
    fn base_url_override_with_trailing_slash() {
        let url = client().with_base_url("http://localhost:8080/v4/spreadsheets/").url(&["doc"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v4/spreadsheets/doc");
    }
}
