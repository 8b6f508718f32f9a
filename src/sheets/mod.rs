use async_trait::async_trait;
use serde::Deserialize;

/// Path marker that precedes the spreadsheet id in a full Sheets URL.
const SHEET_URL_MARKER: &str = "/spreadsheets/d/";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Opaque credential bundle for the spreadsheet API.
///
/// Produced by whatever authorization flow provisioned the operator's token;
/// the monitoring core never inspects or refreshes it.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.trim().is_empty()
    }
}

/// Source of spreadsheet rows — implement for any tabular backend.
///
/// Failures are uniform: the caller does not distinguish auth expiry from
/// network errors, so implementations just return whatever context they have.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch the full current set of rows for the given sheet.
    async fn fetch_rows(
        &self,
        credentials: &Credentials,
        sheet_id: &str,
    ) -> anyhow::Result<Vec<Vec<String>>>;
}

/// Reduce a sheet reference to its bare spreadsheet id.
///
/// Accepts either a bare id or a full URL like
/// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`.
pub fn normalize_sheet_id(reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }

    let id = match trimmed.find(SHEET_URL_MARKER) {
        Some(start) => {
            let rest = &trimmed[start + SHEET_URL_MARKER.len()..];
            rest.split(['/', '?', '#']).next().unwrap_or("")
        }
        None => trimmed,
    };

    if id.is_empty() || id.contains('/') || id.contains(char::is_whitespace) {
        None
    } else {
        Some(id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets v4 client — reads a fixed range via the `values` endpoint.
pub struct SheetsClient {
    api_base: String,
    range: String,
    client: reqwest::Client,
}

impl SheetsClient {
    pub fn new(api_base: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            range: range.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn values_url(&self, sheet_id: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{sheet_id}/values/{}",
            self.api_base.trim_end_matches('/'),
            self.range
        )
    }

    fn rows_from_response(response: ValuesResponse) -> Vec<Vec<String>> {
        response
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect()
    }
}

fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl RowSource for SheetsClient {
    async fn fetch_rows(
        &self,
        credentials: &Credentials,
        sheet_id: &str,
    ) -> anyhow::Result<Vec<Vec<String>>> {
        let response = self
            .client
            .get(self.values_url(sheet_id))
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {body}")
            };
            anyhow::bail!("Sheets API error: {detail}");
        }

        let parsed: ValuesResponse = response.json().await?;
        Ok(Self::rows_from_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_passes_through() {
        assert_eq!(
            normalize_sheet_id("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms").as_deref(),
            Some("1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms")
        );
    }

    #[test]
    fn full_url_reduces_to_id() {
        let url = "https://docs.google.com/spreadsheets/d/1BxiMVs0XRA5nFMdK/edit#gid=0";
        assert_eq!(normalize_sheet_id(url).as_deref(), Some("1BxiMVs0XRA5nFMdK"));
    }

    #[test]
    fn url_without_trailing_segment_reduces_to_id() {
        let url = "https://docs.google.com/spreadsheets/d/abc123";
        assert_eq!(normalize_sheet_id(url).as_deref(), Some("abc123"));
    }

    #[test]
    fn url_with_query_reduces_to_id() {
        let url = "https://docs.google.com/spreadsheets/d/abc123?usp=sharing";
        assert_eq!(normalize_sheet_id(url).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_reference_rejected() {
        assert_eq!(normalize_sheet_id(""), None);
        assert_eq!(normalize_sheet_id("   "), None);
    }

    #[test]
    fn url_with_empty_id_segment_rejected() {
        assert_eq!(normalize_sheet_id("https://docs.google.com/spreadsheets/d/"), None);
        assert_eq!(
            normalize_sheet_id("https://docs.google.com/spreadsheets/d//edit"),
            None
        );
    }

    #[test]
    fn reference_with_whitespace_inside_rejected() {
        assert_eq!(normalize_sheet_id("abc 123"), None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(normalize_sheet_id("  abc123  ").as_deref(), Some("abc123"));
    }

    #[test]
    fn values_url_joins_base_id_and_range() {
        let client = SheetsClient::new("https://sheets.googleapis.com", "A:ZZ");
        assert_eq!(
            client.values_url("abc123"),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/A:ZZ"
        );
    }

    #[test]
    fn values_url_tolerates_trailing_slash_in_base() {
        let client = SheetsClient::new("https://sheets.googleapis.com/", "A:ZZ");
        assert_eq!(
            client.values_url("abc123"),
            "https://sheets.googleapis.com/v4/spreadsheets/abc123/values/A:ZZ"
        );
    }

    #[test]
    fn rows_parse_from_values_payload() {
        let parsed: ValuesResponse = serde_json::from_value(serde_json::json!({
            "range": "Sheet1!A1:ZZ3",
            "majorDimension": "ROWS",
            "values": [["Name", "Email"], ["Ada", "ada@example.com"]],
        }))
        .unwrap();

        let rows = SheetsClient::rows_from_response(parsed);
        assert_eq!(
            rows,
            vec![
                vec!["Name".to_string(), "Email".to_string()],
                vec!["Ada".to_string(), "ada@example.com".to_string()],
            ]
        );
    }

    #[test]
    fn rows_parse_missing_values_as_empty() {
        let parsed: ValuesResponse =
            serde_json::from_value(serde_json::json!({ "range": "Sheet1!A1:ZZ1" })).unwrap();
        assert!(SheetsClient::rows_from_response(parsed).is_empty());
    }

    #[test]
    fn non_string_cells_are_stringified() {
        let parsed: ValuesResponse = serde_json::from_value(serde_json::json!({
            "values": [["Ada", 42, true]],
        }))
        .unwrap();

        let rows = SheetsClient::rows_from_response(parsed);
        assert_eq!(rows, vec![vec!["Ada".to_string(), "42".to_string(), "true".to_string()]]);
    }

    #[test]
    fn empty_credentials_detected() {
        assert!(Credentials::new("").is_empty());
        assert!(Credentials::new("   ").is_empty());
        assert!(!Credentials::new("ya29.token").is_empty());
    }
}
