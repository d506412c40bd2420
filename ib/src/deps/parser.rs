//! Blocker declaration parsing
//!
//! Issues declare blockers with a body line like `**Blocked by:** #10, #15`.
//! Struck-through refs (`~~#10~~`) mean "resolved" and are ignored.

use std::sync::LazyLock;

use regex::Regex;

static BLOCKED_BY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*blocked\s+by:\*\*(.*)").expect("blocked-by pattern compiles"));

static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~.*?~~").expect("strike pattern compiles"));

static ISSUE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").expect("ref pattern compiles"));

/// Extract blocker issue numbers from an issue body.
///
/// Takes the first line matching `**Blocked by:**` (case-insensitive),
/// drops struck-through spans, and returns every `#<digits>` ref in order.
/// Absent body or line yields an empty list.
pub fn parse_blocked_by(body: Option<&str>) -> Vec<u64> {
    let Some(body) = body else {
        return Vec::new();
    };

    let Some(rest) = body.lines().find_map(|line| {
        BLOCKED_BY_LINE
            .captures(line)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()).to_string())
    }) else {
        return Vec::new();
    };

    let live = STRIKETHROUGH.replace_all(&rest, "");
    ISSUE_REF
        .captures_iter(&live)
        .filter_map(|caps| caps[1].parse::<u64>().ok())
        .filter(|n| *n > 0)
        .collect()
}

/// Render a blocker list back into the declaration form
pub fn render_blocked_by(blockers: &[u64]) -> String {
    let refs: Vec<String> = blockers.iter().map(|n| format!("#{}", n)).collect();
    format!("**Blocked by:** {}", refs.join(", "))
}
