use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Number of leading characters of a device token shown in logs.
const TOKEN_LOG_PREFIX: usize = 12;

/// The device tokens registered to one user.
///
/// Keys are provider registration tokens; values are opaque metadata written
/// by the registering client (usually `true` or a registration timestamp) and
/// are carried through untouched. Backed by a `BTreeMap` so iteration order,
/// and therefore the persisted JSON, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(BTreeMap<String, serde_json::Value>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    /// Register a token, replacing any metadata it already had.
    pub fn insert(&mut self, token: impl Into<String>, metadata: serde_json::Value) {
        self.0.insert(token.into(), metadata);
    }

    /// Remove a token, returning its metadata if it was present.
    pub fn remove(&mut self, token: &str) -> Option<serde_json::Value> {
        self.0.remove(token)
    }

    /// Iterate over the tokens in lexical order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn metadata(&self, token: &str) -> Option<&serde_json::Value> {
        self.0.get(token)
    }
}

impl<S: Into<String>> FromIterator<S> for TokenSet {
    /// Collect bare tokens, each with `true` as its metadata.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|t| (t.into(), serde_json::Value::Bool(true)))
                .collect(),
        )
    }
}

/// Shorten a device token for log output.
///
/// Registration tokens are long bearer-like strings; logs only need enough
/// of a prefix to correlate entries.
pub fn redact_token(token: &str) -> String {
    match token.char_indices().nth(TOKEN_LOG_PREFIX) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}
