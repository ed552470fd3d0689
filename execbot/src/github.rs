//! Everything that talks to GitHub's REST API: reading a pull request's
//! description and commenting on it.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use async_std::sync::Mutex;
use futures_util::future::BoxFuture;
use hubcaps::comments::CommentOptions;
use hubcaps::{Credentials, Github, InstallationTokenGenerator, JWTCredentials};
use tracing::{debug, info};

use crate::config::GithubAppConfig;
use crate::event::PullRequestDescriptor;

pub const USER_AGENT: &str = "execbot";
const APP_USER_AGENT: &str = "execbot (app)";

/// The repository hosting API as seen by the command handler.
pub trait RepositoryApi: Send + Sync {
    /// Returns the pull request's description. A pull request without a
    /// description yields the empty string.
    fn fetch_pull_request_body<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
    ) -> BoxFuture<'a, Result<String, GithubError>>;

    fn create_comment<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), GithubError>>;
}

#[derive(Debug)]
pub enum GithubError {
    Api(hubcaps::Error),
    PrivateKey(PathBuf, io::Error),
    Credentials(String),
}

impl From<hubcaps::Error> for GithubError {
    fn from(e: hubcaps::Error) -> GithubError {
        GithubError::Api(e)
    }
}

impl fmt::Display for GithubError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GithubError::Api(err) => write!(f, "GitHub API request failed: {err:?}"),
            GithubError::PrivateKey(path, err) => {
                write!(f, "unable to read private key {}: {err}", path.display())
            }
            GithubError::Credentials(msg) => write!(f, "invalid GitHub credentials: {msg}"),
        }
    }
}

impl std::error::Error for GithubError {}

/// Hands out an authenticated client for a given repository.
pub enum GithubClients {
    /// One client for every repository: a token, or anonymous access.
    Shared(Arc<Github>),
    /// Installation-scoped clients for a GitHub App.
    App(GithubAppVendingMachine),
}

impl GithubClients {
    pub async fn for_repo(&self, owner: &str, repo: &str) -> Result<Arc<Github>, GithubError> {
        match self {
            GithubClients::Shared(github) => Ok(github.clone()),
            GithubClients::App(machine) => machine.for_repo(owner, repo).await,
        }
    }
}

/// The caches are only locked to read or insert, never across a request to
/// GitHub. Two events racing on a cold cache may both look the installation
/// up; the first client inserted wins.
pub struct GithubAppVendingMachine {
    conf: GithubAppConfig,
    host: String,
    id_cache: Mutex<HashMap<(String, String), u64>>,
    client_cache: Mutex<HashMap<u64, Arc<Github>>>,
}

impl GithubAppVendingMachine {
    pub fn new(conf: GithubAppConfig, host: String) -> GithubAppVendingMachine {
        GithubAppVendingMachine {
            conf,
            host,
            id_cache: Mutex::new(HashMap::new()),
            client_cache: Mutex::new(HashMap::new()),
        }
    }

    fn jwt(&self) -> Result<JWTCredentials, GithubError> {
        let path = &self.conf.private_key;
        let private_key_file =
            File::open(path).map_err(|e| GithubError::PrivateKey(path.clone(), e))?;
        let mut private_key_reader = BufReader::new(private_key_file);
        let private_keys = rustls_pemfile::rsa_private_keys(&mut private_key_reader)
            .map_err(|e| GithubError::PrivateKey(path.clone(), e))?;
        let Some(private_key) = private_keys.into_iter().next() else {
            return Err(GithubError::Credentials(format!(
                "no RSA private key found in {}",
                path.display()
            )));
        };
        JWTCredentials::new(self.conf.app_id, private_key)
            .map_err(|e| GithubError::Credentials(format!("{e:?}")))
    }

    async fn install_id_for_repo(&self, owner: &str, repo: &str) -> Result<u64, GithubError> {
        let key = (owner.to_owned(), repo.to_owned());
        if let Some(install_id) = self.id_cache.lock().await.get(&key) {
            return Ok(*install_id);
        }

        info!("Looking up install ID for {}/{}", owner, repo);
        let lookup_gh = Github::host(
            self.host.clone(),
            APP_USER_AGENT,
            Credentials::JWT(self.jwt()?),
        )?;
        let installation = lookup_gh.app().find_repo_installation(owner, repo).await?;
        debug!("Received install ID {:?}", installation.id);

        self.id_cache.lock().await.insert(key, installation.id);
        Ok(installation.id)
    }

    pub async fn for_repo(&self, owner: &str, repo: &str) -> Result<Arc<Github>, GithubError> {
        let install_id = self.install_id_for_repo(owner, repo).await?;
        if let Some(client) = self.client_cache.lock().await.get(&install_id) {
            return Ok(client.clone());
        }

        let client = Arc::new(Github::host(
            self.host.clone(),
            APP_USER_AGENT,
            Credentials::InstallationToken(InstallationTokenGenerator::new(
                install_id,
                self.jwt()?,
            )),
        )?);
        Ok(self
            .client_cache
            .lock()
            .await
            .entry(install_id)
            .or_insert(client)
            .clone())
    }

    #[cfg(test)]
    async fn cache_install_id(&self, owner: &str, repo: &str, install_id: u64) {
        self.id_cache
            .lock()
            .await
            .insert((owner.to_owned(), repo.to_owned()), install_id);
    }
}

pub struct HubcapsRepositoryApi {
    clients: GithubClients,
}

impl HubcapsRepositoryApi {
    pub fn new(clients: GithubClients) -> HubcapsRepositoryApi {
        HubcapsRepositoryApi { clients }
    }
}

impl RepositoryApi for HubcapsRepositoryApi {
    fn fetch_pull_request_body<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
    ) -> BoxFuture<'a, Result<String, GithubError>> {
        Box::pin(async move {
            let github = self.clients.for_repo(pr.owner(), pr.repo()).await?;
            let pulls = github.repo(pr.owner(), pr.repo()).pulls();
            let pull = pulls.get(pr.number()).get().await?;
            Ok(pull.body.unwrap_or_default())
        })
    }

    fn create_comment<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), GithubError>> {
        Box::pin(async move {
            let github = self.clients.for_repo(pr.owner(), pr.repo()).await?;
            let issue_ref = github.repo(pr.owner(), pr.repo()).issue(pr.number());
            issue_ref
                .comments()
                .create(&CommentOptions {
                    body: body.to_owned(),
                })
                .await?;
            Ok(())
        })
    }
}
