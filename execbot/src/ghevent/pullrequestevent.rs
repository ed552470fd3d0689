use crate::ghevent::Repository;

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub repository: Repository,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Edited,
    Opened,
    Reopened,
    Synchronize,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opened() {
        let data = include_str!("../../test-srcs/events/pr-opened.json");

        let pr: PullRequestEvent = serde_json::from_str(data).expect("Should properly deserialize");
        assert_eq!(pr.action, PullRequestAction::Opened);
        assert_eq!(pr.number, 7);
        assert_eq!(pr.repository.name, "widgets");
    }

    #[test]
    fn test_parse_unknown_action() {
        let data = include_str!("../../test-srcs/events/pr-converted-to-draft.json");

        let pr: PullRequestEvent = serde_json::from_str(data).expect("Should properly deserialize");
        assert_eq!(pr.action, PullRequestAction::Unknown);
    }
}
