//! Canonical topic construction and MQTT wildcard matching.
//!
//! Topics are slash-delimited ASCII segments rooted at [`ROOT`]:
//! `bigskies/coordinator/{component}/{action}/{resource}[/…]`.

/// Framework root every canonical topic is built under.
pub const ROOT: &str = "bigskies/coordinator";

/// Join `segments` under [`ROOT`] into a canonical topic string.
///
/// # Examples
/// ```
/// use bigskies_core::topic;
/// assert_eq!(
///     topic::build(&["telescope", "0", "slew"]),
///     "bigskies/coordinator/telescope/0/slew"
/// );
/// ```
pub fn build(segments: &[&str]) -> String {
    let mut out = String::from(ROOT);
    for seg in segments {
        out.push('/');
        out.push_str(seg);
    }
    out
}

/// Split a topic into its segments, rejecting topics missing the root.
pub fn parse(topic: &str) -> Option<Vec<&str>> {
    let rest = topic.strip_prefix(ROOT)?;
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Some(Vec::new());
    }
    Some(rest.split('/').collect())
}

/// Test whether `topic` matches an MQTT filter `pattern`.
///
/// `+` matches exactly one segment; a trailing `#` matches the remainder of
/// the topic (zero or more segments). Segment counts must otherwise align.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    let topic_segs: Vec<&str> = topic.split('/').collect();

    let mut pi = 0;
    let mut ti = 0;

    while pi < pattern_segs.len() {
        let pseg = pattern_segs[pi];

        if pseg == "#" {
            // '#' must be the last pattern segment and absorbs everything
            // remaining in the topic (including zero segments).
            return pi == pattern_segs.len() - 1;
        }

        if ti >= topic_segs.len() {
            return false;
        }

        if pseg != "+" && pseg != topic_segs[ti] {
            return false;
        }

        pi += 1;
        ti += 1;
    }

    ti == topic_segs.len()
}
