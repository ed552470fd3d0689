//! Client for the Piston code execution API (<https://github.com/engineer-man/piston>).
//!
//! Source code is never run locally: it is shipped to the configured Piston
//! server, which runs it in its own sandbox and reports the output back.

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PistonConfig;

/// The code execution API as seen by the command handler.
pub trait ExecutionApi: Send + Sync {
    fn execute<'a>(
        &'a self,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult, PistonError>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ExecutionResult {
    /// Standard output if there is any, otherwise standard error.
    pub fn output(self) -> String {
        if !self.stdout.is_empty() {
            self.stdout
        } else {
            self.stderr
        }
    }
}

#[derive(Debug)]
pub enum PistonError {
    Http(reqwest::Error),
    Api { status: u16, message: String },
    UnknownLanguage(String),
}

impl From<reqwest::Error> for PistonError {
    fn from(e: reqwest::Error) -> PistonError {
        PistonError::Http(e)
    }
}

impl fmt::Display for PistonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PistonError::Http(err) => write!(f, "request to the execution service failed: {err}"),
            PistonError::Api { status, message } => {
                write!(f, "execution service answered {status}: {message}")
            }
            PistonError::UnknownLanguage(language) => {
                write!(f, "execution service has no runtime for {language}")
            }
        }
    }
}

impl std::error::Error for PistonError {}

#[derive(Deserialize, Debug)]
struct Runtime {
    language: String,
    version: String,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Serialize, Debug)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: [SourceFile<'a>; 1],
}

#[derive(Serialize, Debug)]
struct SourceFile<'a> {
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ExecuteResponse {
    run: StageOutput,
}

#[derive(Deserialize, Debug)]
struct StageOutput {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    code: Option<i32>,
    signal: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

pub struct PistonClient {
    http: reqwest::Client,
    server: String,
    language: String,
    version: Option<String>,
}

impl PistonClient {
    pub fn new(config: &PistonConfig) -> Result<PistonClient, PistonError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::github::USER_AGENT)
            .build()?;

        Ok(PistonClient {
            http,
            server: config.server.trim_end_matches('/').to_owned(),
            language: config.language.clone(),
            version: config.version.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v2/piston/{endpoint}", self.server)
    }

    /// The pinned version if there is one, otherwise the first runtime the
    /// server lists under the language's name or one of its aliases.
    async fn runtime_version(&self) -> Result<String, PistonError> {
        if let Some(ref version) = self.version {
            return Ok(version.clone());
        }

        let response = self.http.get(self.url("runtimes")).send().await?;
        let runtimes: Vec<Runtime> = check_status(response).await?.json().await?;

        runtimes
            .into_iter()
            .find(|r| r.language == self.language || r.aliases.contains(&self.language))
            .map(|r| r.version)
            .ok_or_else(|| PistonError::UnknownLanguage(self.language.clone()))
    }

    pub async fn run(&self, source: &str) -> Result<ExecutionResult, PistonError> {
        let version = self.runtime_version().await?;
        debug!(language = %self.language, %version, "Submitting source to Piston");

        let request = ExecuteRequest {
            language: &self.language,
            version: &version,
            files: [SourceFile { content: source }],
        };
        let response = self
            .http
            .post(self.url("execute"))
            .json(&request)
            .send()
            .await?;
        let response: ExecuteResponse = check_status(response).await?.json().await?;

        Ok(ExecutionResult {
            stdout: response.run.stdout.unwrap_or_default(),
            stderr: response.run.stderr.unwrap_or_default(),
            code: response.run.code,
            signal: response.run.signal,
        })
    }
}

impl ExecutionApi for PistonClient {
    fn execute<'a>(
        &'a self,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult, PistonError>> {
        Box::pin(self.run(source))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PistonError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(PistonError::Api {
        status: status.as_u16(),
        message,
    })
}
