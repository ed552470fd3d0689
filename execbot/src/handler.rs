//! Per-event orchestration: detect the command, fetch the pull request body,
//! run it, publish the output.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_std::task::{self, JoinHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, Instrument};

use crate::event::{Event, EventKind};
use crate::github::RepositoryApi;
use crate::piston::ExecutionApi;
use crate::trigger;

/// What to do when fetching or executing fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Carry on with an empty string in place of the failed stage's result.
    /// The pull request always gets a comment, possibly an empty one.
    #[default]
    Degrade,
    /// Stop at the failed stage; nothing is published.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Execute => write!(f, "execute"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotTriggered,
    Published { body: String },
    PublishFailed { body: String },
    Halted { stage: Stage },
}

pub struct CommandHandler {
    repos: Arc<dyn RepositoryApi>,
    executor: Arc<dyn ExecutionApi>,
    policy: FailurePolicy,
}

impl CommandHandler {
    pub fn new(
        repos: Arc<dyn RepositoryApi>,
        executor: Arc<dyn ExecutionApi>,
        policy: FailurePolicy,
    ) -> CommandHandler {
        CommandHandler {
            repos,
            executor,
            policy,
        }
    }

    pub async fn handle(&self, event: &Event) -> Outcome {
        if !trigger::contains_trigger(event.trigger_text()) {
            debug!(kind = %event.kind, "No command found, ignoring");
            return Outcome::NotTriggered;
        }

        let pr = &event.pull_request;
        info!(kind = %event.kind, %pr, "Command {} found", trigger::EXECUTE_COMMAND);

        let source = match self.repos.fetch_pull_request_body(pr).await {
            Ok(source) => {
                debug!(bytes = source.len(), "Fetched pull request body");
                source
            }
            Err(e) => {
                error!(%pr, "Error retrieving code from pull request: {}", e);
                match self.policy {
                    FailurePolicy::Degrade => String::new(),
                    FailurePolicy::Halt => return Outcome::Halted { stage: Stage::Fetch },
                }
            }
        };

        let output = match self.executor.execute(&source).await {
            Ok(result) => {
                debug!(code = ?result.code, signal = ?result.signal, "Execution finished");
                result.output()
            }
            Err(e) => {
                error!(%pr, "Error executing code: {}", e);
                match self.policy {
                    FailurePolicy::Degrade => String::new(),
                    FailurePolicy::Halt => {
                        return Outcome::Halted {
                            stage: Stage::Execute,
                        }
                    }
                }
            }
        };

        match self.repos.create_comment(pr, &output).await {
            Ok(()) => {
                info!(%pr, "Posted execution output");
                Outcome::Published { body: output }
            }
            Err(e) => {
                error!(%pr, "Error creating comment on pull request: {}", e);
                Outcome::PublishFailed { body: output }
            }
        }
    }
}

/// Something that delivers events to subscribed handlers.
pub trait EventSource {
    fn subscribe(&mut self, kinds: &[EventKind], handler: Arc<CommandHandler>);
}

/// Wires a [`CommandHandler`] built from the given API clients into `source`.
pub fn register<S: EventSource + ?Sized>(
    source: &mut S,
    repos: Arc<dyn RepositoryApi>,
    executor: Arc<dyn ExecutionApi>,
    policy: FailurePolicy,
) {
    let handler = Arc::new(CommandHandler::new(repos, executor, policy));
    source.subscribe(
        &[EventKind::IssueCommentCreated, EventKind::PullRequestOpened],
        handler,
    );
    info!("Command handler registered");
}

/// Runs every handler subscribed to an event's kind on its own task.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Arc<CommandHandler>>>,
}

impl EventSource for Dispatcher {
    fn subscribe(&mut self, kinds: &[EventKind], handler: Arc<CommandHandler>) {
        for kind in kinds {
            self.handlers
                .entry(*kind)
                .or_default()
                .push(handler.clone());
        }
    }
}

impl Dispatcher {
    /// Spawns one task per subscribed handler. Dropping the returned handles
    /// detaches the tasks, they still run to completion.
    pub fn dispatch(&self, delivery: &str, event: Event) -> Vec<JoinHandle<Outcome>> {
        let Some(handlers) = self.handlers.get(&event.kind) else {
            debug!(kind = %event.kind, "No handler subscribed");
            return vec![];
        };

        handlers
            .iter()
            .map(|handler| {
                let handler = handler.clone();
                let event = event.clone();
                let span = info_span!("event", %delivery, kind = %event.kind);
                task::spawn(async move { handler.handle(&event).await }.instrument(span))
            })
            .collect()
    }
}
