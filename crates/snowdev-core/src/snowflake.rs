//! `Session` over the platform's connector protocol.
//!
//! A session logs in once (`/session/v1/login-request`) and sends the
//! returned token with every statement, so everything run through one
//! `SnowflakeSession` shares a platform session. `CREATE TEMPORARY`
//! entities stay visible until `close()` logs out. Statements still
//! running are polled through their result URL; large results are split
//! into chunks fetched separately. File uploads are delegated to `snowsql`.

use crate::config::ConnectionConfig;
use crate::error::{Result, SnowdevError};
use crate::session::{PutResult, Row, Session};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use uuid::Uuid;

const LOGIN_PATH: &str = "/session/v1/login-request";
const QUERY_PATH: &str = "/queries/v1/query-request";
const SESSION_PATH: &str = "/session";
const CLIENT_APP_ID: &str = "snowdev";
/// Codes meaning "accepted, still executing".
const IN_PROGRESS_CODES: &[&str] = &["333333", "333334"];
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginRequest<'a> {
    data: LoginData<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authenticator: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

impl<'a> LoginData<'a> {
    /// Credentials are sent according to `token_type`: PASSWORD as a
    /// password, anything else as an authenticator token.
    fn from_config(config: &'a ConnectionConfig) -> Self {
        let authenticator = match config.token_type.to_ascii_uppercase().as_str() {
            "PASSWORD" => None,
            "OAUTH" => Some("OAUTH"),
            "KEYPAIR_JWT" | "SNOWFLAKE_JWT" => Some("SNOWFLAKE_JWT"),
            _ => Some("PROGRAMMATIC_ACCESS_TOKEN"),
        };
        let secret = config.token.as_str();
        Self {
            client_app_id: CLIENT_APP_ID,
            client_app_version: env!("CARGO_PKG_VERSION"),
            account_name: &config.account,
            login_name: &config.user,
            password: authenticator.is_none().then_some(secret),
            authenticator,
            token: authenticator.map(|_| secret),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
}

/// Every response is wrapped the same way; `data` depends on the call.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

impl<T> Envelope<T> {
    fn into_error(self) -> SnowdevError {
        SnowdevError::Platform {
            code: self.code,
            message: self
                .message
                .unwrap_or_else(|| "request rejected without a message".to_string()),
        }
    }

    fn in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| IN_PROGRESS_CODES.contains(&code))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginResult {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    rowtype: Vec<ColumnType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    get_result_url: Option<String>,
    #[serde(default)]
    chunks: Vec<Chunk>,
    #[serde(default)]
    chunk_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    url: String,
}

enum QueryOutcome {
    Complete(QueryResult),
    /// Result URL to poll.
    Pending(String),
}

// ---------------------------------------------------------------------------
// SnowflakeSession
// ---------------------------------------------------------------------------

pub struct SnowflakeSession {
    client: Client,
    config: ConnectionConfig,
    base_url: String,
    /// Session token; `None` until the first statement logs in.
    token: Option<String>,
    sequence: u64,
    statement_timeout: Duration,
    poll_interval: Duration,
}

impl SnowflakeSession {
    /// Build the HTTP client. Login is deferred to the first statement.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("snowdev/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = config.base_url();
        tracing::debug!(%base_url, account = %config.account, "session created");
        Ok(Self {
            client,
            config,
            base_url,
            token: None,
            sequence: 0,
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Log out. Temporary entities created through this session are
    /// dropped by the platform. A session that never logged in is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let response = self
            .authorized(self.client.post(format!("{}{SESSION_PATH}", self.base_url)), &token)
            .query(&[("delete", "true")])
            .send()?;
        let envelope: Envelope<IgnoredAny> = read_envelope(response)?;
        if !envelope.success {
            return Err(envelope.into_error());
        }
        tracing::debug!(account = %self.config.account, "logged out");
        Ok(())
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Snowflake Token=\"{token}\""))
            .header(ACCEPT, "application/json")
    }

    fn ensure_login(&mut self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let request_id = Uuid::new_v4().to_string();
        let request = LoginRequest {
            data: LoginData::from_config(&self.config),
        };
        let response = self
            .client
            .post(format!("{}{LOGIN_PATH}", self.base_url))
            .query(&[
                ("databaseName", self.config.database.as_str()),
                ("schemaName", self.config.schema.as_str()),
                ("warehouse", self.config.warehouse.as_str()),
                ("roleName", self.config.role.as_str()),
                ("request_id", request_id.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()?;

        let envelope: Envelope<LoginResult> = read_envelope(response)?;
        if !envelope.success {
            return Err(envelope.into_error());
        }
        let token = envelope.data.and_then(|d| d.token).ok_or_else(|| {
            SnowdevError::UnexpectedResponse("login succeeded without a session token".into())
        })?;
        tracing::debug!(account = %self.config.account, user = %self.config.user, "logged in");
        self.token = Some(token.clone());
        Ok(token)
    }

    fn execute(&mut self, statement: &str) -> Result<Vec<Row>> {
        let token = self.ensure_login()?;
        self.sequence += 1;
        let request = QueryRequest {
            sql_text: statement,
            async_exec: false,
            sequence_id: self.sequence,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };
        let request_id = Uuid::new_v4().to_string();
        let response = self
            .authorized(self.client.post(format!("{}{QUERY_PATH}", self.base_url)), &token)
            .query(&[("requestId", request_id.as_str())])
            .json(&request)
            .send()?;

        let deadline = Instant::now() + self.statement_timeout;
        let mut outcome = query_outcome(read_envelope(response)?)?;
        loop {
            match outcome {
                QueryOutcome::Complete(result) => return self.collect_rows(result),
                QueryOutcome::Pending(result_url) => {
                    if Instant::now() >= deadline {
                        return Err(SnowdevError::UnexpectedResponse(format!(
                            "statement still running after {}s ({result_url})",
                            self.statement_timeout.as_secs()
                        )));
                    }
                    tracing::debug!(%result_url, "statement running, polling");
                    std::thread::sleep(self.poll_interval);
                    let response = self
                        .authorized(self.client.get(format!("{}{result_url}", self.base_url)), &token)
                        .send()?;
                    outcome = query_outcome(read_envelope(response)?)?;
                }
            }
        }
    }

    fn collect_rows(&self, result: QueryResult) -> Result<Vec<Row>> {
        let columns: Vec<String> = result.rowtype.into_iter().map(|c| c.name).collect();
        let mut rowset = result.rowset;

        for (index, chunk) in result.chunks.iter().enumerate() {
            tracing::debug!(query_id = ?result.query_id, index, "fetching result chunk");
            let mut request = self.client.get(&chunk.url);
            for (name, value) in &result.chunk_headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request.send()?;
            let status = response.status();
            let text = response.text()?;
            if !status.is_success() {
                return Err(platform_error(status, &text));
            }
            // A chunk is a comma-separated run of row arrays.
            let rows: Vec<Vec<Option<String>>> = serde_json::from_str(&format!("[{text}]"))?;
            rowset.extend(rows);
        }

        Ok(rowset
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect())
    }

    fn snowsql_command(&self, snowsql: &Path, statement: &str) -> Command {
        let mut cmd = Command::new(snowsql);
        cmd.args(["-a", self.config.account.as_str()])
            .args(["-u", self.config.user.as_str()])
            .args(["-r", self.config.role.as_str()])
            .args(["-w", self.config.warehouse.as_str()])
            .args(["-d", self.config.database.as_str()])
            .args(["-s", self.config.schema.as_str()]);
        if let Some(host) = &self.config.host {
            let host = host
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            cmd.args(["--host", host]);
        }
        for option in [
            "exit_on_error=true",
            "friendly=false",
            "header=false",
            "timing=false",
            "output_format=csv",
        ] {
            cmd.args(["-o", option]);
        }
        cmd.args(["-q", statement]);
        cmd.env("SNOWSQL_PWD", &self.config.token);
        cmd
    }
}

impl Session for SnowflakeSession {
    fn sql(&mut self, statement: &str) -> Result<Vec<Row>> {
        tracing::trace!(%statement, "executing");
        self.execute(statement)
    }

    fn put(&mut self, local: &Path, stage_path: &str) -> Result<PutResult> {
        let snowsql =
            which::which("snowsql").map_err(|_| SnowdevError::ToolNotFound("snowsql".into()))?;
        let absolute = std::fs::canonicalize(local)?;
        let statement = put_statement(&absolute, stage_path);
        tracing::debug!(%statement, "uploading");

        let output = self
            .snowsql_command(&snowsql, &statement)
            .stdin(Stdio::null())
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(SnowdevError::Upload(format!(
                "{}: {}",
                local.display(),
                detail.trim().chars().take(500).collect::<String>()
            )));
        }

        Ok(PutResult {
            source: local.display().to_string(),
            target: stage_path.to_string(),
            status: put_status(&stdout).unwrap_or("UNKNOWN").to_string(),
        })
    }
}

fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>> {
    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        return Err(platform_error(status, &text));
    }
    Ok(serde_json::from_str(&text)?)
}

fn query_outcome(envelope: Envelope<QueryResult>) -> Result<QueryOutcome> {
    if envelope.in_progress() {
        let url = envelope
            .data
            .and_then(|d| d.get_result_url)
            .ok_or_else(|| {
                SnowdevError::UnexpectedResponse("running statement without a result URL".into())
            })?;
        return Ok(QueryOutcome::Pending(url));
    }
    if !envelope.success {
        return Err(envelope.into_error());
    }
    Ok(QueryOutcome::Complete(envelope.data.unwrap_or_default()))
}

fn platform_error(status: reqwest::StatusCode, body: &str) -> SnowdevError {
    match serde_json::from_str::<Envelope<IgnoredAny>>(body) {
        Ok(envelope) if envelope.message.is_some() => envelope.into_error(),
        _ => SnowdevError::Platform {
            code: None,
            message: format!(
                "HTTP {status}: {}",
                body.trim().chars().take(500).collect::<String>()
            ),
        },
    }
}

/// `PUT 'file:///abs/app.py' @STAGE/udf/name AUTO_COMPRESS=FALSE OVERWRITE=TRUE`
pub fn put_statement(absolute: &Path, stage_path: &str) -> String {
    let file = absolute.display().to_string().replace('\\', "/");
    let file = if file.starts_with('/') {
        file
    } else {
        format!("/{file}")
    };
    format!(
        "PUT 'file://{}' {} AUTO_COMPRESS=FALSE OVERWRITE=TRUE",
        file.replace('\'', "\\'"),
        stage_path
    )
}

/// The `status` column of a csv-formatted `PUT` result
/// (`source,target,source_size,target_size,source_compression,target_compression,status,message`).
fn put_status(stdout: &str) -> Option<&str> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    line.split(',').nth(6).map(|s| s.trim().trim_matches('"'))
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Holds connection settings and opens the session on first use.
pub struct Connection {
    config: ConnectionConfig,
    session: Option<SnowflakeSession>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Log out if a session was opened.
    pub fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }

    pub fn session(&mut self) -> Result<&mut SnowflakeSession> {
        let session = match self.session.take() {
            Some(session) => session,
            None => SnowflakeSession::connect(self.config.clone())?,
        };
        Ok(self.session.insert(session))
    }
}

impl Session for Connection {
    fn sql(&mut self, statement: &str) -> Result<Vec<Row>> {
        self.session()?.sql(statement)
    }

    fn put(&mut self, local: &Path, stage_path: &str) -> Result<PutResult> {
        self.session()?.put(local, stage_path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
