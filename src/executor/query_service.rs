//! Teradata Query Service executor.
//!
//! Sends each statement to the Query Service REST endpoint and classifies
//! the answer into an [`ExecOutcome`]. Requests the server never ran
//! (connection refused, 429, 503) are retried here with a linear backoff.
//! A timeout after the request was sent, or a gateway error (502, 504) from a
//! proxy that may already have forwarded it, is reported as ambiguous and
//! never retried.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::{ExecutorError, Result, VantageError};
use crate::planner::{Command, CommandKind};
use crate::resource::{AttributeSet, AttributeValue};

use super::{ExecOutcome, RemoteExecutor};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for requests the server never ran.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Teradata error code for "object does not exist".
const OBJECT_MISSING_CODE: &str = "3807";

/// Statuses sent before the statement reached the database.
const NOT_RUN_STATUSES: [u16; 2] = [429, 503];

/// Gateway statuses; the statement may have been forwarded.
const GATEWAY_STATUSES: [u16; 2] = [502, 504];

/// Query Service executor.
#[derive(Clone)]
pub struct QueryServiceExecutor {
    /// HTTP client.
    client: Client,
    /// `{base_url}/systems/{system}/queries`.
    queries_url: String,
    /// Database user.
    user: String,
    /// Database password.
    password: String,
    /// Base delay between retries.
    retry_delay: Duration,
}

/// Query request body.
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    format: &'static str,
}

/// Query response body.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<ResultSet>,
}

/// One result set of a query response.
#[derive(Debug, Default, Deserialize)]
struct ResultSet {
    #[serde(default)]
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Deserialize)]
struct QueryErrorBody {
    #[serde(default)]
    message: String,
}

impl QueryServiceExecutor {
    /// Creates a new executor for one system.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, system: &str, user: &str, password: &str) -> Result<Self> {
        Self::with_timeout(base_url, system, user, password, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates an executor with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(
        base_url: &str,
        system: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            queries_url: format!("{}/systems/{system}/queries", base_url.trim_end_matches('/')),
            user: user.to_string(),
            password: password.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Overrides the base retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sends a statement, retrying requests the server never ran.
    async fn send(&self, command: &Command) -> Result<QueryResponse> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {}", command.kind());
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.send_once(command).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if e.is_retryable() {
                        warn!("Transient error from Query Service: {e}");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VantageError::Executor(ExecutorError::network("Max retries exceeded"))
        }))
    }

    /// Sends a single request.
    async fn send_once(&self, command: &Command) -> Result<QueryResponse> {
        trace!("Executing statement: {}", command.redacted());

        let request = QueryRequest {
            query: command.statement(),
            format: "OBJECT",
        };

        let response = self
            .client
            .post(&self.queries_url)
            .header(header::ACCEPT, "application/json")
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(command, &e))?;

        let status = response.status();

        if NOT_RUN_STATUSES.contains(&status.as_u16()) {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::unavailable(status.as_u16(), body).into());
        }

        if GATEWAY_STATUSES.contains(&status.as_u16()) {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Ambiguous {
                command: command.redacted().to_string(),
                message: format!("HTTP {} from gateway: {body}", status.as_u16()),
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<QueryErrorBody>(&body)
                .map(|b| b.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(ExecutorError::Failure {
                command: command.redacted().to_string(),
                message: format!("HTTP {}: {message}", status.as_u16()),
            }
            .into());
        }

        response.json().await.map_err(|e| {
            ExecutorError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }

    /// Maps a transport error onto the error taxonomy.
    fn classify_send_error(command: &Command, e: &reqwest::Error) -> VantageError {
        if e.is_connect() {
            ExecutorError::network(format!("Connection failed: {e}")).into()
        } else {
            // The request may have reached the server.
            ExecutorError::Ambiguous {
                command: command.redacted().to_string(),
                message: format!("Request failed: {e}"),
            }
            .into()
        }
    }

    /// Converts the first row of the first result set into attributes.
    fn first_row(response: QueryResponse) -> Option<AttributeSet> {
        let row = response.results.into_iter().next()?.data.into_iter().next()?;
        Some(
            row.iter()
                .map(|(column, value)| (column.to_ascii_lowercase(), AttributeValue::from_json(value)))
                .collect(),
        )
    }

    fn outcome(command: &Command, result: Result<QueryResponse>) -> ExecOutcome {
        match result {
            Ok(response) => match (command.kind(), Self::first_row(response)) {
                (CommandKind::Read, None) => ExecOutcome::Absent,
                (_, row) => ExecOutcome::Success(row),
            },
            Err(VantageError::Executor(ExecutorError::Failure { message, .. })) => {
                if command.tolerates_absence() && is_object_missing(&message) {
                    ExecOutcome::Absent
                } else {
                    ExecOutcome::Failure(message)
                }
            }
            Err(VantageError::Executor(ExecutorError::Ambiguous { message, .. })) => {
                ExecOutcome::Ambiguous(message)
            }
            Err(e @ VantageError::Executor(ExecutorError::InvalidResponse { .. })) => {
                // The statement ran; only a read can be safely called failed.
                if command.kind() == CommandKind::Read {
                    ExecOutcome::Failure(e.to_string())
                } else {
                    ExecOutcome::Ambiguous(e.to_string())
                }
            }
            Err(e) => ExecOutcome::Failure(e.to_string()),
        }
    }
}

/// Returns true if the error message reports a missing object.
///
/// The code only counts as a whole token after "error" (`[Error 3807]`,
/// `Error 3807:`), never as part of a name like `cp3807`.
fn is_object_missing(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let mut tokens = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .peekable();
    while let Some(token) = tokens.next() {
        if token == "error" && tokens.peek() == Some(&OBJECT_MISSING_CODE) {
            return true;
        }
    }
    lower.contains("does not exist")
}

#[async_trait]
impl RemoteExecutor for QueryServiceExecutor {
    async fn execute(&self, command: &Command) -> ExecOutcome {
        let outcome = Self::outcome(command, self.send(command).await);
        debug!("{command} -> {outcome}");
        outcome
    }

    fn name(&self) -> &'static str {
        "query-service"
    }
}

impl fmt::Debug for QueryServiceExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryServiceExecutor")
            .field("queries_url", &self.queries_url)
            .field("user", &self.user)
            .field("password", &"********")
            .finish_non_exhaustive()
    }
}
