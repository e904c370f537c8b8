#![allow(dead_code)]

use proptest::prelude::*;

/// Plain prompt words without links, bold markers or seed parameters
pub fn prompt_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,10}", 1..8).prop_map(|words| words.join(" "))
}

/// Spacing noise a caller may leave around and inside a prompt
pub fn padded_prompt_strategy() -> impl Strategy<Value = (String, String)> {
    prop::collection::vec(("[a-z]{1,10}", "[ \t]{1,3}"), 1..8).prop_map(|parts| {
        let clean = parts
            .iter()
            .map(|(word, _)| word.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let padded = parts
            .iter()
            .map(|(word, gap)| format!("{gap}{word}"))
            .collect::<String>();
        (clean, padded)
    })
}

pub fn link_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{3,12}", "[a-z0-9]{4,16}")
        .prop_map(|(host, path)| format!("https://{host}.example.com/{path}.png"))
}

pub fn seed_strategy() -> impl Strategy<Value = u32> {
    any::<u32>()
}

/// One event or caller action that can end a live generate task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Origin artifact with message id `m-{n}`
    Deliver(u8),
    /// Known failure notice with message id `f-{n}`
    Fail(u8),
    /// Caller gave up waiting
    Reap,
    /// Reaper pass past the task TTL
    Expire,
}

/// Short action sequences with frequent message id repeats
pub fn lifecycle_actions_strategy() -> impl Strategy<Value = Vec<LifecycleAction>> {
    prop::collection::vec(
        prop_oneof![
            (0u8..3).prop_map(LifecycleAction::Deliver),
            (0u8..3).prop_map(LifecycleAction::Fail),
            Just(LifecycleAction::Reap),
            Just(LifecycleAction::Expire),
        ],
        1..10,
    )
}
