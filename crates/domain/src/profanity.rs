use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::ports::profanity::CensorRuleSource;

/// One literal-to-replacement substitution. `flags` currently understands `i`
/// for case-insensitive matching; unknown flags are ignored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CensorRule {
    pub pattern: String,
    pub replacement: String,
    pub flags: String,
}

impl CensorRule {
    pub fn case_insensitive(&self) -> bool {
        self.flags.contains('i')
    }
}

/// An immutable, versioned rule set. Handlers grab one snapshot and censor
/// against it for the whole request, so a concurrent reload can never apply a
/// half-updated list.
#[derive(Debug)]
pub struct CensorSnapshot {
    version: u64,
    rules: Vec<CensorRule>,
}

impl CensorSnapshot {
    fn new(version: u64, rules: Vec<CensorRule>) -> Self {
        Self { version, rules }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &[CensorRule] {
        &self.rules
    }

    /// Applies the rules in list order. Total: any input, including empty and
    /// non-ASCII text, produces a result. Stored content is never touched;
    /// this runs at the serialization boundary only.
    pub fn censor(&self, text: &str) -> String {
        let mut output = text.to_string();
        for rule in &self.rules {
            if rule.pattern.is_empty() {
                continue;
            }
            output = if rule.case_insensitive() {
                replace_ignore_case(&output, &rule.pattern, &rule.replacement)
            } else {
                output.replace(&rule.pattern, &rule.replacement)
            };
        }
        output
    }
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn replace_ignore_case(text: &str, pattern: &str, replacement: &str) -> String {
    let text_chars: Vec<char> = text.chars().collect();
    let pattern_chars: Vec<char> = pattern.chars().collect();
    if pattern_chars.is_empty() || text_chars.len() < pattern_chars.len() {
        return text.to_string();
    }

    let mut output = String::with_capacity(text.len());
    let mut index = 0;
    while index < text_chars.len() {
        let end = index + pattern_chars.len();
        let matched = end <= text_chars.len()
            && text_chars[index..end]
                .iter()
                .zip(&pattern_chars)
                .all(|(t, p)| chars_eq_ignore_case(*t, *p));
        if matched {
            output.push_str(replacement);
            index = end;
        } else {
            output.push(text_chars[index]);
            index += 1;
        }
    }
    output
}

/// Hot-reloadable censor with atomic snapshot swap. The swap is the only
/// mutable shared state in the core; readers clone the `Arc` and never block
/// a reload.
pub struct CensorEngine {
    source: Arc<dyn CensorRuleSource>,
    active: RwLock<Arc<CensorSnapshot>>,
}

impl CensorEngine {
    pub fn new(source: Arc<dyn CensorRuleSource>) -> Self {
        Self {
            source,
            active: RwLock::new(Arc::new(CensorSnapshot::new(0, Vec::new()))),
        }
    }

    pub fn snapshot(&self) -> Arc<CensorSnapshot> {
        self.active.read().clone()
    }

    pub fn censor(&self, text: &str) -> String {
        self.snapshot().censor(text)
    }

    /// Reads the rule source and swaps in a fresh snapshot, bumping the
    /// version. Returns the new version.
    pub async fn reload(&self) -> DomainResult<u64> {
        let rules = self.source.load_rules().await?;
        let mut active = self.active.write();
        let next_version = active.version + 1;
        *active = Arc::new(CensorSnapshot::new(next_version, rules));
        Ok(next_version)
    }

    /// The active rules, exposed so clients can mirror censorship locally
    /// (optimistic echo). Server output stays authoritative.
    pub fn client_rules(&self) -> (u64, Vec<CensorRule>) {
        let snapshot = self.snapshot();
        (snapshot.version(), snapshot.rules().to_vec())
    }
}
