use std::cmp::Ordering;
use std::fmt;

const MAX_COMPONENTS: usize = 4;

/// A version string normalized from a release tag or an executable's file
/// version.
///
/// Normalization trims whitespace, turns `,` separators into `.` and drops a
/// leading non-numeric marker such as `v`. Tokens with one to four unsigned
/// integer components compare numerically; anything else falls back to
/// case-insensitive string equality.
#[derive(Debug, Clone)]
pub struct VersionToken {
    text: String,
    numeric: Option<[u64; MAX_COMPONENTS]>,
}

/// How a remote version relates to a local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Same,
    /// The remote side is newer than the local side.
    Newer,
    /// The remote side is older than the local side.
    Older,
    /// At least one side is not numeric and the strings differ.
    Different,
}

impl VersionRelation {
    pub fn needs_update(self) -> bool {
        matches!(self, Self::Newer | Self::Different)
    }
}

impl VersionToken {
    pub fn parse(raw: &str) -> Self {
        let text = normalize(raw);
        let numeric = parse_numeric(&text);
        Self { text, numeric }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Compares `remote` against `self` as the locally installed version.
    pub fn relation_to(&self, remote: &VersionToken) -> VersionRelation {
        match (self.numeric, remote.numeric) {
            (Some(local), Some(remote)) => match remote.cmp(&local) {
                Ordering::Equal => VersionRelation::Same,
                Ordering::Greater => VersionRelation::Newer,
                Ordering::Less => VersionRelation::Older,
            },
            _ if self.text.eq_ignore_ascii_case(&remote.text) => VersionRelation::Same,
            _ => VersionRelation::Different,
        }
    }

    /// Numeric ordering when both sides parse, `None` otherwise.
    pub fn numeric_cmp(&self, other: &VersionToken) -> Option<Ordering> {
        match (self.numeric, other.numeric) {
            (Some(left), Some(right)) => Some(left.cmp(&right)),
            _ => None,
        }
    }

    /// True when both tokens name the same version under the comparison
    /// policy: numeric equality first, case-insensitive text otherwise.
    pub fn matches(&self, other: &VersionToken) -> bool {
        self.relation_to(other) == VersionRelation::Same
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for VersionToken {}

fn normalize(raw: &str) -> String {
    let replaced = raw.trim().replace(',', ".");
    let without_spaces: String = replaced.chars().filter(|c| !c.is_whitespace()).collect();
    match without_spaces.find(|c: char| c.is_ascii_digit()) {
        Some(0) | None => without_spaces,
        Some(start) => {
            let marker = &without_spaces[..start];
            if marker.chars().all(|c| c.is_ascii_alphabetic() || c == '-' || c == '_') {
                without_spaces[start..].to_string()
            } else {
                without_spaces
            }
        }
    }
}

fn parse_numeric(text: &str) -> Option<[u64; MAX_COMPONENTS]> {
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() > MAX_COMPONENTS {
        return None;
    }

    let mut components = [0_u64; MAX_COMPONENTS];
    for (slot, part) in components.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    Some(components)
}
