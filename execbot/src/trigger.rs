/// The command a comment has to contain for the bot to act on it.
pub const EXECUTE_COMMAND: &str = "/execute";

/// Plain, case-sensitive substring match. There is no tokenizing: the
/// command may appear anywhere, including inside a longer word.
pub fn contains_trigger(text: &str) -> bool {
    text.contains(EXECUTE_COMMAND)
}
