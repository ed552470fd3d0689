use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hubcaps::{Credentials, Github};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::github::{GithubAppVendingMachine, GithubClients, USER_AGENT};
use crate::handler::FailurePolicy;

/// Main execbot configuration
#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Configuration for the webhook receiver
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub github: GithubConfig,
    pub github_app: Option<GithubAppConfig>,
    #[serde(default)]
    pub piston: PistonConfig,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Configuration for the webhook receiver
#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Listen host/port
    pub listen: String,
    /// Path to the GitHub webhook secret
    pub webhook_secret_file: PathBuf,
}

fn default_github_host() -> String {
    "https://api.github.com".into()
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct GithubConfig {
    #[serde(default = "default_github_host")]
    pub host: String,
    /// File to read a personal access token from. Contents are automatically stripped
    pub token_file: Option<PathBuf>,
}

impl Default for GithubConfig {
    fn default() -> GithubConfig {
        GithubConfig {
            host: default_github_host(),
            token_file: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct GithubAppConfig {
    pub app_id: u64,
    /// PEM file holding the app's RSA private key
    pub private_key: PathBuf,
}

fn default_piston_server() -> String {
    "https://emkc.org".into()
}

fn default_language() -> String {
    "javascript".into()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct PistonConfig {
    #[serde(default = "default_piston_server")]
    pub server: String,
    /// Every pull request body is run as this language, whatever it contains.
    #[serde(default = "default_language")]
    pub language: String,
    /// Pin a runtime version instead of asking the server for one.
    pub version: Option<String>,
}

impl Default for PistonConfig {
    fn default() -> PistonConfig {
        PistonConfig {
            server: default_piston_server(),
            language: default_language(),
            version: None,
        }
    }
}

impl Config {
    pub fn github_clients(&self) -> Result<GithubClients, ConfigError> {
        if let Some(ref app) = self.github_app {
            if self.github.token_file.is_some() {
                warn!("Both github.token_file and github_app are set, using the app");
            }
            return Ok(GithubClients::App(GithubAppVendingMachine::new(
                app.clone(),
                self.github.host.clone(),
            )));
        }

        let credentials = match self.github.token_file {
            Some(ref path) => Some(Credentials::Token(read_secret(path)?)),
            None => {
                warn!("No GitHub credentials configured, using anonymous access");
                None
            }
        };
        let github = Github::host(self.github.host.clone(), USER_AGENT, credentials)
            .map_err(|e| ConfigError::Github(format!("{e:?}")))?;
        Ok(GithubClients::Shared(Arc::new(github)))
    }
}

impl WebhookConfig {
    pub fn webhook_secret(&self) -> Result<String, ConfigError> {
        read_secret(&self.webhook_secret_file)
    }
}

fn read_secret(path: &Path) -> Result<String, ConfigError> {
    let secret =
        fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    Ok(secret.trim().to_owned())
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, io::Error),
    Parse(PathBuf, serde_json::Error),
    Github(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => write!(f, "unable to read {}: {err}", path.display()),
            ConfigError::Parse(path, err) => {
                write!(f, "invalid configuration in {}: {err}", path.display())
            }
            ConfigError::Github(msg) => write!(f, "unable to create a GitHub client: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn load(filename: &Path) -> Result<Config, ConfigError> {
    let contents =
        fs::read_to_string(filename).map_err(|e| ConfigError::Io(filename.to_path_buf(), e))?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(filename.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("Should create a temp file");
        file.write_all(contents.as_bytes())
            .expect("Should write the config");
        file
    }

    #[test]
    fn test_load_defaults() {
        let file = write_config("{}");

        let cfg = load(file.path()).expect("Should load");
        assert!(cfg.webhook.is_none());
        assert!(cfg.github_app.is_none());
        assert_eq!(cfg.github.host, "https://api.github.com");
        assert_eq!(cfg.github.token_file, None);
        assert_eq!(cfg.piston.server, "https://emkc.org");
        assert_eq!(cfg.piston.language, "javascript");
        assert_eq!(cfg.piston.version, None);
        assert_eq!(cfg.failure_policy, FailurePolicy::Degrade);
    }

    #[test]
    fn test_load_full() {
        let file = write_config(
            r#"{
                "webhook": { "listen": "127.0.0.1:3000", "webhook_secret_file": "/run/secrets/webhook" },
                "github": { "host": "https://github.example.com/api/v3", "token_file": "/run/secrets/token" },
                "github_app": { "app_id": 1234, "private_key": "/run/secrets/app.pem" },
                "piston": { "server": "http://localhost:2000", "language": "python", "version": "3.10.0" },
                "failure_policy": "halt"
            }"#,
        );

        let cfg = load(file.path()).expect("Should load");
        let webhook = cfg.webhook.expect("Should have a webhook section");
        assert_eq!(webhook.listen, "127.0.0.1:3000");
        assert_eq!(
            webhook.webhook_secret_file,
            PathBuf::from("/run/secrets/webhook")
        );
        assert_eq!(cfg.github.host, "https://github.example.com/api/v3");
        assert_eq!(
            cfg.github.token_file,
            Some(PathBuf::from("/run/secrets/token"))
        );
        assert_eq!(cfg.github_app.map(|a| a.app_id), Some(1234));
        assert_eq!(cfg.piston.language, "python");
        assert_eq!(cfg.piston.version.as_deref(), Some("3.10.0"));
        assert_eq!(cfg.failure_policy, FailurePolicy::Halt);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let file = write_config(r#"{ "piston": { "langauge": "python" } }"#);

        let err = load(file.path()).expect_err("Should reject the typo");
        assert!(matches!(err, ConfigError::Parse(_, _)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/execbot.json")).expect_err("Should fail");
        assert!(matches!(err, ConfigError::Io(_, _)));
    }

    #[test]
    fn test_webhook_secret_is_trimmed() {
        let secret = write_config("  s3cr3t\n");
        let webhook = WebhookConfig {
            listen: String::from("127.0.0.1:3000"),
            webhook_secret_file: secret.path().to_path_buf(),
        };

        assert_eq!(webhook.webhook_secret().expect("Should read"), "s3cr3t");
    }

    #[test]
    fn test_github_clients_from_token() {
        let token = write_config("ghp_token\n");
        let file = write_config(&format!(
            r#"{{ "github": {{ "token_file": {:?} }} }}"#,
            token.path()
        ));

        let cfg = load(file.path()).expect("Should load");
        let clients = cfg.github_clients().expect("Should build clients");
        assert!(matches!(clients, GithubClients::Shared(_)));
    }

    #[test]
    fn test_github_clients_prefers_app() {
        let file = write_config(
            r#"{
                "github": { "token_file": "/nonexistent/token" },
                "github_app": { "app_id": 1234, "private_key": "/nonexistent/app.pem" }
            }"#,
        );

        let cfg = load(file.path()).expect("Should load");
        let clients = cfg.github_clients().expect("Should not read the token");
        assert!(matches!(clients, GithubClients::App(_)));
    }

    #[test]
    fn test_github_clients_missing_token_file() {
        let file = write_config(r#"{ "github": { "token_file": "/nonexistent/token" } }"#);

        let cfg = load(file.path()).expect("Should load");
        assert!(matches!(
            cfg.github_clients(),
            Err(ConfigError::Io(_, _))
        ));
    }
}
