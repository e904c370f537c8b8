//! # System Constants
//!
//! Fixed vocabulary of the upstream generation service: the embed titles it
//! uses to report failures, the application command names it exposes, and the
//! wire constants of the interaction payloads.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Failure embed titles delivered through "message created" events.
///
/// Discovered empirically; titles outside this set are handled according to
/// [`crate::config::UnknownFailurePolicy`].
pub const FAILURE_TITLES_ON_CREATE: &[&str] = &[
    "Blocked",
    "Banned prompt",
    "Invalid parameter",
    "Banned prompt detected",
    "Invalid link",
    "Sorry! Could not complete the job!",
    "Action needed to continue",
    "Queue full",
    "Action required to continue",
    "Job action restricted",
    "Empty prompt",
];

/// Failure embed titles delivered through "message updated" events.
pub const FAILURE_TITLES_ON_UPDATE: &[&str] = &["Request cancelled due to image filters"];

static CREATE_TITLE_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| FAILURE_TITLES_ON_CREATE.iter().copied().collect());

static UPDATE_TITLE_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| FAILURE_TITLES_ON_UPDATE.iter().copied().collect());

pub fn is_create_failure_title(title: &str) -> bool {
    CREATE_TITLE_SET.contains(title)
}

pub fn is_update_failure_title(title: &str) -> bool {
    UPDATE_TITLE_SET.contains(title)
}

/// Application command names exposed by the upstream service
pub mod commands {
    pub const IMAGINE: &str = "imagine";
    pub const DESCRIBE: &str = "describe";
    pub const FAST: &str = "fast";
    pub const RELAX: &str = "relax";
}

/// Interaction payload constants
pub mod wire {
    /// Slash-command interaction
    pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;
    /// Button/component interaction
    pub const INTERACTION_MESSAGE_COMPONENT: u8 = 3;
    /// Component type of a button
    pub const COMPONENT_BUTTON: u8 = 2;
    /// Command option type for strings
    pub const OPTION_STRING: u8 = 3;
    /// Command option type for attachments
    pub const OPTION_ATTACHMENT: u8 = 11;
    /// Id of the single attachment slot used by describe
    pub const DESCRIBE_ATTACHMENT_SLOT: &str = "0";
    /// Number of variants in one generated grid
    pub const GRID_SIZE: u8 = 4;

    pub fn upsample_custom_id(index: u8, artifact_id: &str) -> String {
        format!("MJ::JOB::upsample::{index}::{artifact_id}")
    }
}

/// Defaults shared by configuration and tests
pub mod system {
    pub const DEFAULT_VARIANT_COUNT: u8 = 4;
    pub const DEFAULT_MAX_UNFINISHED_TASKS: usize = 50;
    pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v9";
    pub const ENV_PREFIX: &str = "IMAGINE_BRIDGE";
    /// Origin and failure message ids remembered per worker for redelivery checks
    pub const RECENT_MESSAGE_CAPACITY: usize = 1024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_title_sets_are_disjoint_by_event_kind() {
        assert!(is_create_failure_title("Queue full"));
        assert!(!is_update_failure_title("Queue full"));
        assert!(is_update_failure_title("Request cancelled due to image filters"));
        assert!(!is_create_failure_title("Request cancelled due to image filters"));
        assert!(!is_create_failure_title("queue full"));
    }

    #[test]
    fn test_upsample_custom_id() {
        assert_eq!(
            wire::upsample_custom_id(2, "d44f04d2-b81b-49ff-83e6-575d3c02f0f0"),
            "MJ::JOB::upsample::2::d44f04d2-b81b-49ff-83e6-575d3c02f0f0"
        );
    }
}
