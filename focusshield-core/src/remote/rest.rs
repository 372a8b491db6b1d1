//! HTTP adapter for a PostgREST-style endpoint
//!
//! Rows live under `{url}/rest/v1/{table}`. Filters are query parameters of
//! the form `column=eq.value`; upserts use `Prefer: resolution=merge-duplicates`
//! with an `on_conflict` column list.

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};

use super::{Filters, RemoteStore, Table};

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";
const MINIMAL_PREFER: &str = "return=minimal";

/// Async HTTP client for the remote tables.
pub struct RestClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Create a client from configuration
    ///
    /// Returns an error if the configuration is invalid or incomplete.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("remote.url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let anon_key = config
            .anon_key
            .as_deref()
            .ok_or_else(|| Error::Config("remote.anon_key is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(anon_key)
                .map_err(|e| Error::Config(format!("invalid anon_key: {}", e)))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", anon_key))
                .map_err(|e| Error::Config(format!("invalid anon_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// `GET /rest/v1/{table}?{key}=eq.{value}&select=*`
    pub async fn select(&self, table: Table, filters: &Filters<'_>) -> Result<Vec<Value>> {
        let url = format!("{}?{}select=*", self.table_url(table), query_filters(filters));

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("HTTP request failed: {}", e)))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("failed to parse response: {}", e)))
    }

    /// `POST /rest/v1/{table}?on_conflict={conflict_key}&columns={..}` with merge-duplicates
    ///
    /// The server requires every object in a bulk body to have the same keys
    /// unless `columns` names them, and rows whose optional fields are unset
    /// omit those keys.
    pub async fn upsert(&self, table: Table, rows: &[Value], conflict_key: &str) -> Result<()> {
        let url = self.upsert_url(table, rows, conflict_key);

        let response = self
            .http_client
            .post(&url)
            .header("Prefer", UPSERT_PREFER)
            .json(rows)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("HTTP request failed: {}", e)))?;

        check_status(response).await.map(|_| ())
    }

    /// `PATCH /rest/v1/{table}?{key}=eq.{value}`
    pub async fn update(&self, table: Table, filters: &Filters<'_>, patch: &Value) -> Result<()> {
        if filters.is_empty() {
            return Err(Error::Remote(format!(
                "refusing to update every row of {}",
                table
            )));
        }
        let url = format!(
            "{}?{}",
            self.table_url(table),
            query_filters(filters).trim_end_matches('&')
        );

        let response = self
            .http_client
            .patch(&url)
            .header("Prefer", MINIMAL_PREFER)
            .json(patch)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("HTTP request failed: {}", e)))?;

        check_status(response).await.map(|_| ())
    }

    fn upsert_url(&self, table: Table, rows: &[Value], conflict_key: &str) -> String {
        let mut url = format!(
            "{}?on_conflict={}",
            self.table_url(table),
            urlencoding::encode(conflict_key)
        );
        let columns = column_list(rows);
        if !columns.is_empty() {
            url.push_str("&columns=");
            url.push_str(&columns);
        }
        url
    }

    /// `POST /rest/v1/{table}`
    pub async fn insert(&self, table: Table, row: &Value) -> Result<()> {
        let response = self
            .http_client
            .post(self.table_url(table))
            .header("Prefer", MINIMAL_PREFER)
            .json(row)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("HTTP request failed: {}", e)))?;

        check_status(response).await.map(|_| ())
    }
}

/// `key=eq.value` with both sides percent-encoded.
fn eq_filter(key: &str, value: &str) -> String {
    format!(
        "{}=eq.{}",
        urlencoding::encode(key),
        urlencoding::encode(value)
    )
}

/// Filters as query parameters, each followed by `&`.
fn query_filters(filters: &Filters<'_>) -> String {
    filters
        .iter()
        .map(|(key, value)| format!("{}&", eq_filter(key, value)))
        .collect()
}

/// Sorted union of the keys of every object row, comma-separated and encoded.
fn column_list(rows: &[Value]) -> String {
    let columns: BTreeSet<&str> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|fields| fields.keys().map(String::as_str))
        .collect();
    columns
        .into_iter()
        .map(|column| urlencoding::encode(column).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(Error::Remote(format!("API error ({}): {}", status, error_text)))
}

/// Blocking [`RemoteStore`] over [`RestClient`]
///
/// Owns a current-thread runtime and blocks on each request, so it must not
/// be called from inside another tokio runtime.
pub struct RestRemoteStore {
    client: RestClient,
    runtime: tokio::runtime::Runtime,
}

impl RestRemoteStore {
    /// Create a store from configuration
    ///
    /// Returns None if the remote is not configured.
    pub fn new(config: &RemoteConfig) -> Result<Option<Self>> {
        if !config.is_ready() {
            return Ok(None);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Remote(format!("failed to create runtime: {}", e)))?;

        let client = RestClient::new(config)?;
        tracing::debug!(url = %client.base_url(), "Remote store configured");
        Ok(Some(Self { client, runtime }))
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

impl RemoteStore for RestRemoteStore {
    fn select_where(&self, table: Table, filters: &Filters<'_>) -> Result<Vec<Value>> {
        self.runtime.block_on(self.client.select(table, filters))
    }

    fn upsert(&self, table: Table, rows: &[Value], conflict_key: &str) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.runtime
            .block_on(self.client.upsert(table, rows, conflict_key))
    }

    fn update_where(&self, table: Table, filters: &Filters<'_>, patch: &Value) -> Result<()> {
        self.runtime
            .block_on(self.client.update(table, filters, patch))
    }

    fn insert(&self, table: Table, row: &Value) -> Result<()> {
        self.runtime.block_on(self.client.insert(table, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::to_remote_row;
    use crate::types::{ShipNote, SyncState};

    fn configured() -> RemoteConfig {
        RemoteConfig {
            url: Some("https://project.example.com/".to_string()),
            anon_key: Some("public-anon-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        let config = RemoteConfig {
            url: Some("https://project.example.com".to_string()),
            ..Default::default()
        };
        assert!(RestClient::new(&config).is_err());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = RestClient::new(&configured()).unwrap();
        assert_eq!(client.base_url(), "https://project.example.com");
        assert_eq!(
            client.table_url(Table::FocusSessions),
            "https://project.example.com/rest/v1/focus_sessions"
        );
    }

    #[test]
    fn test_store_unconfigured_is_none() {
        let store = RestRemoteStore::new(&RemoteConfig::default()).unwrap();
        assert!(store.is_none());
    }

    #[test]
    fn test_store_configured() {
        let store = RestRemoteStore::new(&configured()).unwrap();
        assert!(store.is_some());
    }

    #[test]
    fn test_eq_filter_encodes_values() {
        assert_eq!(eq_filter("user_id", "abc-123"), "user_id=eq.abc-123");
        assert_eq!(eq_filter("email", "a+b@x.io"), "email=eq.a%2Bb%40x.io");
        assert_eq!(
            query_filters(&[("user_id", "u1"), ("app", "focusshield")]),
            "user_id=eq.u1&app=eq.focusshield&"
        );
        assert_eq!(query_filters(&[]), "");
    }

    #[test]
    fn test_upsert_names_every_column_of_mixed_rows() {
        let created_at = "2024-05-15T14:00:00Z".parse().unwrap();
        let blocked = ShipNote {
            id: "n1".to_string(),
            session_id: "s1".to_string(),
            sync: SyncState::Local,
            note: "Waiting on API review".to_string(),
            blocked_reason: Some("review".to_string()),
            created_at,
        };
        let shipped = ShipNote {
            id: "n2".to_string(),
            blocked_reason: None,
            ..blocked.clone()
        };
        let rows = vec![
            to_remote_row(&shipped, "user-1").unwrap(),
            to_remote_row(&blocked, "user-1").unwrap(),
        ];

        let client = RestClient::new(&configured()).unwrap();
        assert_eq!(
            client.upsert_url(Table::ShipNotes, &rows, "id"),
            "https://project.example.com/rest/v1/ship_notes?on_conflict=id\
             &columns=blocked_reason,created_at,id,note,session_id,user_id"
        );
    }

    #[test]
    fn test_upsert_url_without_rows_has_no_columns() {
        let client = RestClient::new(&configured()).unwrap();
        assert_eq!(
            client.upsert_url(Table::Subscriptions, &[], "user_id"),
            "https://project.example.com/rest/v1/subscriptions?on_conflict=user_id"
        );
    }
}
