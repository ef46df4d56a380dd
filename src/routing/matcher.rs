//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile behavior path patterns once
//! - Match request paths against them
//!
//! # Design Decisions
//! - `*` matches any run of characters (including `/`), `?` exactly one
//! - Matching is case-sensitive
//! - Patterns without a leading `/` get one, except the catch-all `*`
//! - No regex; a greedy matcher with single-star backtracking is linear
//!   enough for the short patterns behaviors use

/// A compiled behavior path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    pattern: Vec<char>,
}

impl PathPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let normalized = if source.starts_with('/') || source.starts_with('*') {
            source.clone()
        } else {
            format!("/{source}")
        };
        Self {
            pattern: normalized.chars().collect(),
            source,
        }
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<char> = path.chars().collect();
        let pattern = &self.pattern;

        let (mut p, mut s) = (0, 0);
        let mut star: Option<usize> = None;
        let mut resume = 0;

        while s < path.len() {
            match pattern.get(p) {
                Some('*') => {
                    star = Some(p);
                    resume = s;
                    p += 1;
                }
                Some(&c) if c == '?' || c == path[s] => {
                    p += 1;
                    s += 1;
                }
                _ => match star {
                    Some(star_at) => {
                        p = star_at + 1;
                        resume += 1;
                        s = resume;
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
