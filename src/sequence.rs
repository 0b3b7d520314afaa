//! Sequence allocation from existing artifact names.
//!
//! The counter is never stored on its own: it is re-derived at the start of
//! each export run from the highest trailing integer among names matching
//! `<stem><digits><extension>`, then advanced in-process after every
//! successful write.

use regex_lite::Regex;

/// Default first sequence number when no artifact matches.
pub const DEFAULT_SEQUENCE_FLOOR: u64 = 11;

/// Naming pattern for sequentially numbered artifacts.
#[derive(Debug, Clone)]
pub struct SequencePattern {
    directory: String,
    stem: String,
    extension: String,
    floor: u64,
    matcher: Regex,
}

impl SequencePattern {
    /// Create a pattern.
    ///
    /// New names are `<directory><stem><N><extension>`. Existing names match
    /// if they end in `<stem><digits><extension>`, wherever they live.
    pub fn new(
        directory: impl Into<String>,
        stem: impl Into<String>,
        extension: impl Into<String>,
        floor: u64,
    ) -> Self {
        let stem = stem.into();
        let extension = extension.into();
        let matcher = Regex::new(&format!(
            r"{}(\d+){}$",
            regex_lite::escape(&stem),
            regex_lite::escape(&extension)
        ))
        .expect("escaped literals always form a valid pattern");

        Self {
            directory: directory.into(),
            stem,
            extension,
            floor,
            matcher,
        }
    }

    /// `examples/example<N>.txt`, starting at 11.
    pub fn examples() -> Self {
        Self::new("examples/", "example", ".txt", DEFAULT_SEQUENCE_FLOOR)
    }

    /// Replace the floor.
    pub fn with_floor(mut self, floor: u64) -> Self {
        self.floor = floor;
        self
    }

    /// Value returned when nothing matches.
    pub fn floor(&self) -> u64 {
        self.floor
    }

    /// Artifact name for sequence number `n`.
    pub fn name_for(&self, n: u64) -> String {
        format!("{}{}{}{}", self.directory, self.stem, n, self.extension)
    }

    /// Trailing sequence number of `name`, if it matches.
    pub fn sequence_of(&self, name: &str) -> Option<u64> {
        let digits = self.matcher.captures(name)?.get(1)?.as_str();
        match digits.parse::<u64>() {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "Could not parse sequence number");
                None
            }
        }
    }
}

/// Next unused sequence number given every existing name.
///
/// Scans the whole set; names need not arrive in numeric order. Returns
/// `max(floor, highest + 1)`, or the floor when nothing matches.
pub fn next_sequence<I, S>(names: I, pattern: &SequencePattern) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = names
        .into_iter()
        .filter_map(|name| pattern.sequence_of(name.as_ref()))
        .max();

    match highest {
        Some(n) => n.saturating_add(1).max(pattern.floor),
        None => pattern.floor,
    }
}

/// Per-run sequence counter.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    pattern: SequencePattern,
    next: u64,
}

impl SequenceCounter {
    /// Start a counter from the current storage listing.
    pub fn start<I, S>(pattern: SequencePattern, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next = next_sequence(names, &pattern);
        tracing::info!(next = next, "Sequence counter initialized from existing artifacts");
        Self { pattern, next }
    }

    /// Number the next write will use.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Artifact name the next write will use.
    pub fn next_name(&self) -> String {
        self.pattern.name_for(self.next)
    }

    /// Consume the current number after a successful write, or after finding
    /// the name already taken.
    pub fn advance(&mut self) -> u64 {
        let used = self.next;
        self.next = self.next.saturating_add(1);
        used
    }
}
