use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use super::SyncError;

/// Configuration for the tracker HTTP transport.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub base_url: String,
    pub api_token: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per request, rate-limit and transport retries included.
    pub max_attempts: u32,
    /// Fixed wait after an HTTP 429.
    pub rate_limit_backoff: Duration,
    /// Fixed wait after a transport error.
    pub transport_backoff: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.clickup.com/api/v2".to_string(),
            api_token: String::new(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(5),
            transport_backoff: Duration::from_secs(2),
        }
    }
}

/// Task record as the tracker returns it. Timestamps come as epoch
/// milliseconds in string form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_updated: Option<String>,
    #[serde(default)]
    pub date_started: Option<String>,
    #[serde(default)]
    pub date_done: Option<String>,
    #[serde(default)]
    pub date_closed: Option<String>,
    #[serde(default)]
    pub assignees: Vec<RawAssignee>,
    #[serde(default)]
    pub custom_fields: Vec<RawCustomField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAssignee {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCustomField {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Task comment, fetched for the narrative collaborator downstream. The
/// scoring core never reads these.
#[derive(Debug, Clone, Deserialize)]
pub struct RawComment {
    pub comment_text: String,
    #[serde(default)]
    pub user: Option<RawAssignee>,
}

/// Parse a tracker epoch-millisecond timestamp field.
pub fn parse_epoch_ms(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
}

/// Tracker API client: paginated task fetch with bounded retry and fixed
/// backoff. Rate limits and transport errors retry; any other non-200
/// response surfaces immediately as a structured error.
#[derive(Debug)]
pub struct TrackerClient {
    http: reqwest::Client,
    config: TrackerConfig,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Fetch every task in a list, following the page cursor until the
    /// tracker returns a short page.
    pub async fn fetch_list_tasks(
        &self,
        list_id: &str,
        updated_after_ms: Option<i64>,
        include_closed: bool,
    ) -> Result<Vec<RawTask>, SyncError> {
        let mut tasks = Vec::new();
        let mut page: u32 = 0;

        loop {
            let mut params = vec![
                ("page", page.to_string()),
                ("subtasks", "true".to_string()),
                ("archived", "false".to_string()),
                ("include_closed", include_closed.to_string()),
                ("limit", "100".to_string()),
            ];
            if let Some(cutoff) = updated_after_ms {
                params.push(("date_updated_gt", cutoff.to_string()));
            }

            let body = self.get_json(&format!("list/{list_id}/task"), &params).await?;
            let batch: Vec<RawTask> = match body.get("tasks") {
                Some(value) => serde_json::from_value(value.clone())
                    .map_err(|e| SyncError::Decode(e.to_string()))?,
                None => Vec::new(),
            };
            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            tasks.extend(batch);
            log::debug!("list {list_id}: page {page} returned {batch_len} tasks");
            page += 1;

            // Tracker pages hold 100 tasks; a short page is the last one.
            if batch_len < 100 {
                break;
            }
        }

        Ok(tasks)
    }

    /// Fetch the comments of one task.
    pub async fn fetch_comments(&self, task_id: &str) -> Result<Vec<RawComment>, SyncError> {
        let body = self.get_json(&format!("task/{task_id}/comment"), &[]).await?;
        match body.get("comments") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| SyncError::Decode(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, SyncError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let mut last_error = String::new();

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                log::debug!("retry {attempt}/{} for {url}", self.config.max_attempts - 1);
            }

            let request = self
                .http
                .get(&url)
                .header("Authorization", &self.config.api_token)
                .query(params);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 {
                        log::warn!("rate limited on {url}; backing off");
                        last_error = "HTTP 429".to_string();
                        sleep(self.config.rate_limit_backoff).await;
                        continue;
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        log::error!("tracker returned HTTP {status} for {url}");
                        return Err(SyncError::Http {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| SyncError::Decode(e.to_string()));
                }
                Err(e) => {
                    log::error!("transport error for {url}: {e}");
                    last_error = e.to_string();
                    sleep(self.config.transport_backoff).await;
                }
            }
        }

        Err(SyncError::RetriesExhausted {
            attempts: self.config.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_ms_parsing_handles_strings_and_garbage() {
        let parsed = parse_epoch_ms(Some("1735689600000"));
        assert_eq!(parsed.unwrap().timestamp(), 1_735_689_600);

        assert!(parse_epoch_ms(Some("not-a-number")).is_none());
        assert!(parse_epoch_ms(None).is_none());
    }

    #[test]
    fn raw_task_deserializes_with_missing_optional_fields() {
        let task: RawTask = serde_json::from_value(serde_json::json!({
            "id": "abc123",
            "name": "Loja Centro"
        }))
        .unwrap();
        assert_eq!(task.id, "abc123");
        assert!(task.status.is_none());
        assert!(task.assignees.is_empty());
        assert!(task.custom_fields.is_empty());
    }
}
