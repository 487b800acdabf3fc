use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VauError {
    #[error("Syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    #[error("Type error: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("Unbound symbol: {0}")]
    Unbound(String),

    #[error("Arity error: {name} expects {expected} args, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Step limit exceeded after {0} steps")]
    StepLimit(usize),

    #[error("{inner}")]
    WithContext {
        inner: Box<VauError>,
        hint: Option<String>,
    },
}

impl VauError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        VauError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        VauError::Type {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        VauError::Unbound(name.into())
    }

    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        VauError::Arity {
            name: name.into(),
            expected: expected.into(),
            got,
        }
    }

    /// Attach a hint (actionable suggestion) to this error.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            VauError::WithContext { inner, .. } => VauError::WithContext {
                inner,
                hint: Some(hint.into()),
            },
            other => VauError::WithContext {
                inner: Box::new(other),
                hint: Some(hint.into()),
            },
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            VauError::WithContext { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// The underlying error with any context stripped.
    pub fn inner(&self) -> &VauError {
        match self {
            VauError::WithContext { inner, .. } => inner.inner(),
            other => other,
        }
    }
}

/// Compute the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the most similar name from a list of candidates.
/// Returns `None` if no candidate is close enough.
pub fn suggest_similar(name: &str, candidates: &[String]) -> Option<String> {
    // roughly a third of the name, between 1 and 3 edits
    let threshold = (name.len() / 3).clamp(1, 3);

    candidates
        .iter()
        .filter_map(|c| {
            let d = edit_distance(name, c);
            if d > 0 && d <= threshold {
                Some((c, d))
            } else {
                None
            }
        })
        .min_by_key(|(_, d)| *d)
        .map(|(name, _)| name.clone())
}
