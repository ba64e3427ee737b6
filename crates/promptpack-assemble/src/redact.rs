//! Secret redaction.

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use promptpack_core::PatternError;

/// Text substituted for every secret match.
pub const REDACTION_MARKER: &str = r#"<redacted reason="secret">"#;

/// Replaces secret-like substrings with [`REDACTION_MARKER`].
#[derive(Debug, Clone)]
pub struct SecretScrubber {
    patterns: Vec<Regex>,
}

/// Result of scrubbing one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrubbed {
    /// Redacted text.
    pub text: String,
    /// Number of (line, pattern) pairs that produced a replacement.
    pub replacements: usize,
}

impl Scrubbed {
    /// Whether anything was redacted.
    pub fn redacted(&self) -> bool {
        self.replacements > 0
    }
}

impl SecretScrubber {
    /// Compile patterns, case-insensitively.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| PatternError::Regex {
                        pattern: p.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// A scrubber that never redacts.
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Redact every match, line by line. Line endings are kept as-is.
    pub fn scrub(&self, text: &str) -> Scrubbed {
        if self.patterns.is_empty() {
            return Scrubbed {
                text: text.to_string(),
                replacements: 0,
            };
        }

        let mut out = String::with_capacity(text.len());
        let mut replacements = 0;
        for line in text.split_inclusive('\n') {
            let (body, ending) = split_line_ending(line);
            let mut current = Cow::Borrowed(body);
            for pattern in &self.patterns {
                let next = match pattern.replace_all(&current, REDACTION_MARKER) {
                    Cow::Owned(s) => Some(s),
                    Cow::Borrowed(_) => None,
                };
                if let Some(s) = next {
                    current = Cow::Owned(s);
                    replacements += 1;
                }
            }
            out.push_str(&current);
            out.push_str(ending);
        }
        Scrubbed {
            text: out,
            replacements,
        }
    }
}

/// Split a line into its body and its `\n` or `\r\n` terminator.
fn split_line_ending(line: &str) -> (&str, &str) {
    let body = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    (body, &line[body.len()..])
}
