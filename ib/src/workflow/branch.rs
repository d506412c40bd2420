//! Working-branch naming and push safety
//!
//! Every working branch is `issuebot/issue-<N>-<slug>`. The engine refuses
//! to push anywhere that does not match the pattern, and never to the
//! repo's default branch, "main", or "master" regardless of pattern.

use std::sync::LazyLock;

use regex::Regex;

const BRANCH_PREFIX: &str = "issuebot";

/// Maximum slug length taken from the issue title
const SLUG_LIMIT: usize = 40;

static SAFE_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^issuebot/issue-\d+-[a-z0-9-]+$").expect("branch pattern compiles"));

/// Lowercase, alphanumeric-and-dash slug from an issue title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= SLUG_LIMIT {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() { "work".to_string() } else { slug }
}

/// Working branch name for an issue
pub fn branch_name(issue_number: u64, title: &str) -> String {
    format!("{}/issue-{}-{}", BRANCH_PREFIX, issue_number, slugify(title))
}

/// Does the name match the working-branch pattern?
pub fn is_safe_branch(name: &str) -> bool {
    SAFE_BRANCH.is_match(name)
}

/// Is it safe to push to this branch in a repo with the given default?
pub fn is_safe_to_push(branch: &str, default_branch: &str) -> bool {
    is_safe_branch(branch) && branch != default_branch && branch != "main" && branch != "master"
}
