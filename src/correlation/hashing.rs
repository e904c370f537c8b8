//! Content hashing and extraction
//!
//! The upstream service echoes the submitted prompt back in the message that
//! carries the first artifact and in the footer of failure notices, but it
//! rewrites every link on the way. Links are therefore replaced by the
//! submission seed (which survives the echo untouched) before hashing, on both
//! the submission side and the echo side.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("hardcoded regex"));

// Links inside the echoed prompt of an origin message are wrapped in <>
static WRAPPED_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<https?://\S+>").expect("hardcoded regex"));

static BOLD_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{2}(.+?)\*{2}").expect("hardcoded regex"));

static SEED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--seed\s+(\d+)").expect("hardcoded regex"));

static ARTIFACT_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-f\d]{8}(?:-[a-f\d]{4}){3}-[a-f\d]{12})[^/]*$").expect("hardcoded regex")
});

static VARIANT_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Image #(\d+)").expect("hardcoded regex"));

const HASH_LEN: usize = 32;

/// Content-derived correlation key of a generate submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordHash(String);

impl KeywordHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn of(text: &str) -> Self {
        let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
        Self(digest[..HASH_LEN].to_string())
    }
}

impl fmt::Display for KeywordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the exact prompt text sent upstream.
///
/// Appends the seed parameter, collapses whitespace and rewrites em-dashes
/// to `--` the same way the upstream service does.
pub fn canonical_prompt(prompt: &str, params: &str, seed: u32) -> String {
    let joined = format!("{} {} --seed {}", prompt.trim(), params.trim(), seed);
    collapse_whitespace(&joined).replace('—', "--")
}

/// Hash of a canonical prompt as computed at submission time
pub fn submission_hash(canonical_prompt: &str, seed: u32) -> KeywordHash {
    let seed = seed.to_string();
    KeywordHash::of(&replace_links(canonical_prompt, &seed))
}

/// Hash recovered from the footer of a failure notice.
///
/// The footer starts with the command name (`/imagine `), which is dropped.
pub fn hash_from_failure_footer(footer: &str) -> Option<KeywordHash> {
    let (_, echoed) = footer.split_once(' ')?;
    let seed = last_seed(echoed)?;
    let echoed = echoed.trim();
    Some(KeywordHash::of(&replace_links(echoed, seed)))
}

/// Hash recovered from the bold prompt segment of a message body
pub fn hash_from_message_content(content: &str) -> Option<KeywordHash> {
    let prompt = BOLD_SEGMENT.captures(content)?.get(1)?.as_str().trim();
    let seed = last_seed(content)?;
    Some(KeywordHash::of(&WRAPPED_LINK.replace_all(prompt, seed)))
}

/// The last `--seed N` value in the text
pub fn last_seed(text: &str) -> Option<&str> {
    SEED.captures_iter(text)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

pub fn replace_links(text: &str, seed: &str) -> String {
    LINK.replace_all(text, seed).into_owned()
}

/// UUID-shaped artifact identifier embedded in an attachment URL
pub fn artifact_id_from_url(url: &str) -> Option<String> {
    ARTIFACT_UUID
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Variant index announced by a derived artifact message (`Image #N`)
pub fn variant_index_from_content(content: &str) -> Option<u8> {
    VARIANT_INDEX
        .captures(content)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
