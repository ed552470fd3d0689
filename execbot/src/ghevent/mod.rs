mod common;
mod issuecomment;
mod pullrequestevent;

pub use self::common::{Comment, Issue, Repository, User};
pub use self::issuecomment::{IssueComment, IssueCommentAction};
pub use self::pullrequestevent::{PullRequestAction, PullRequestEvent};
