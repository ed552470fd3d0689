use std::sync::Mutex;

use futures_util::future::BoxFuture;

use crate::event::PullRequestDescriptor;
use crate::github::{GithubError, RepositoryApi};
use crate::piston::{ExecutionApi, ExecutionResult, PistonError};

/// Serves one pull request body and records every call made to it.
pub struct FakeRepositoryApi {
    body: Option<String>,
    fail_comment: bool,
    fetches: Mutex<Vec<PullRequestDescriptor>>,
    comments: Mutex<Vec<(PullRequestDescriptor, String)>>,
}

impl FakeRepositoryApi {
    fn new(body: Option<&str>, fail_comment: bool) -> FakeRepositoryApi {
        FakeRepositoryApi {
            body: body.map(String::from),
            fail_comment,
            fetches: Mutex::new(vec![]),
            comments: Mutex::new(vec![]),
        }
    }

    pub fn with_body(body: &str) -> FakeRepositoryApi {
        FakeRepositoryApi::new(Some(body), false)
    }

    pub fn failing_fetch() -> FakeRepositoryApi {
        FakeRepositoryApi::new(None, false)
    }

    pub fn failing_comment(body: &str) -> FakeRepositoryApi {
        FakeRepositoryApi::new(Some(body), true)
    }

    pub fn fetches(&self) -> Vec<PullRequestDescriptor> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(PullRequestDescriptor, String)> {
        self.comments.lock().unwrap().clone()
    }
}

impl RepositoryApi for FakeRepositoryApi {
    fn fetch_pull_request_body<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
    ) -> BoxFuture<'a, Result<String, GithubError>> {
        self.fetches.lock().unwrap().push(pr.clone());
        let result = self
            .body
            .clone()
            .ok_or_else(|| GithubError::Credentials(String::from("simulated network error")));
        Box::pin(async move { result })
    }

    fn create_comment<'a>(
        &'a self,
        pr: &'a PullRequestDescriptor,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), GithubError>> {
        let result = if self.fail_comment {
            Err(GithubError::Credentials(String::from("simulated network error")))
        } else {
            self.comments
                .lock()
                .unwrap()
                .push((pr.clone(), body.to_owned()));
            Ok(())
        };
        Box::pin(async move { result })
    }
}

/// Answers every submission with the same result and records the sources.
pub struct FakeExecutor {
    result: Option<ExecutionResult>,
    sources: Mutex<Vec<String>>,
}

impl FakeExecutor {
    fn new(result: Option<ExecutionResult>) -> FakeExecutor {
        FakeExecutor {
            result,
            sources: Mutex::new(vec![]),
        }
    }

    pub fn stdout(stdout: &str) -> FakeExecutor {
        FakeExecutor::new(Some(ExecutionResult {
            stdout: stdout.to_owned(),
            code: Some(0),
            ..Default::default()
        }))
    }

    pub fn stderr(stderr: &str) -> FakeExecutor {
        FakeExecutor::new(Some(ExecutionResult {
            stderr: stderr.to_owned(),
            code: Some(1),
            ..Default::default()
        }))
    }

    pub fn failing() -> FakeExecutor {
        FakeExecutor::new(None)
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

impl ExecutionApi for FakeExecutor {
    fn execute<'a>(
        &'a self,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExecutionResult, PistonError>> {
        self.sources.lock().unwrap().push(source.to_owned());
        let result = self.result.clone().ok_or_else(|| PistonError::Api {
            status: 500,
            message: String::from("simulated execution error"),
        });
        Box::pin(async move { result })
    }
}
