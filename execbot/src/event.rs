//! The inbound boundary: turns raw webhook deliveries into validated
//! [`Event`]s, so nothing past this module touches untyped payloads.

use std::fmt;

use crate::ghevent::{self, IssueCommentAction, PullRequestAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    IssueCommentCreated,
    PullRequestOpened,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventKind::IssueCommentCreated => write!(f, "issue_comment.created"),
            EventKind::PullRequestOpened => write!(f, "pull_request.opened"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub body: String,
    pub author: String,
}

/// Identifies the pull request that is both read from and commented on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestDescriptor {
    owner: String,
    repo: String,
    number: u64,
}

impl PullRequestDescriptor {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: u64,
    ) -> Result<PullRequestDescriptor, DescriptorError> {
        let owner = owner.into();
        let repo = repo.into();

        if owner.is_empty() {
            return Err(DescriptorError::EmptyOwner);
        }
        if repo.is_empty() {
            return Err(DescriptorError::EmptyRepo);
        }
        if number == 0 {
            return Err(DescriptorError::ZeroNumber);
        }

        Ok(PullRequestDescriptor {
            owner,
            repo,
            number,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn number(&self) -> u64 {
        self.number
    }
}

impl fmt::Display for PullRequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// `None` for events that do not carry a comment, e.g. a pull request
    /// being opened.
    pub comment: Option<Comment>,
    pub pull_request: PullRequestDescriptor,
}

impl Event {
    /// The text the trigger is looked for in. Events without a comment
    /// contribute the empty string.
    pub fn trigger_text(&self) -> &str {
        self.comment.as_ref().map_or("", |c| c.body.as_str())
    }

    /// Decodes a delivery given its `X-GitHub-Event` header value.
    ///
    /// Returns `Ok(None)` for event types and actions the bot is not
    /// subscribed to; those are acknowledged and dropped by the receiver.
    pub fn from_webhook(event_type: &str, body: &[u8]) -> Result<Option<Event>, DecodeError> {
        match event_type {
            "issue_comment" => {
                let payload: ghevent::IssueComment = serde_json::from_slice(body)?;
                if payload.action != IssueCommentAction::Created {
                    return Ok(None);
                }

                let pull_request = PullRequestDescriptor::new(
                    payload.repository.owner.login,
                    payload.repository.name,
                    payload.issue.number,
                )?;
                Ok(Some(Event {
                    kind: EventKind::IssueCommentCreated,
                    comment: Some(Comment {
                        body: payload.comment.body,
                        author: payload.comment.user.login,
                    }),
                    pull_request,
                }))
            }
            "pull_request" => {
                let payload: ghevent::PullRequestEvent = serde_json::from_slice(body)?;
                if payload.action != PullRequestAction::Opened {
                    return Ok(None);
                }

                let pull_request = PullRequestDescriptor::new(
                    payload.repository.owner.login,
                    payload.repository.name,
                    payload.number,
                )?;
                Ok(Some(Event {
                    kind: EventKind::PullRequestOpened,
                    comment: None,
                    pull_request,
                }))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DescriptorError {
    EmptyOwner,
    EmptyRepo,
    ZeroNumber,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DescriptorError::EmptyOwner => write!(f, "repository owner is empty"),
            DescriptorError::EmptyRepo => write!(f, "repository name is empty"),
            DescriptorError::ZeroNumber => write!(f, "pull request number must be positive"),
        }
    }
}

impl std::error::Error for DescriptorError {}

#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    Descriptor(DescriptorError),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> DecodeError {
        DecodeError::Json(e)
    }
}

impl From<DescriptorError> for DecodeError {
    fn from(e: DescriptorError) -> DecodeError {
        DecodeError::Descriptor(e)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Json(err) => write!(f, "invalid webhook payload: {err}"),
            DecodeError::Descriptor(err) => write!(f, "invalid pull request reference: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {}
