use serde::{Deserialize, Serialize};

/// A system file consumed at init: either a path to read, or the literal
/// lines themselves (useful for tests and embedders without an /etc).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConfigSource {
    Path(String),
    Literal(Vec<String>),
}

impl ConfigSource {
    pub fn path(p: impl Into<String>) -> Self {
        ConfigSource::Path(p.into())
    }

    pub fn literal<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        ConfigSource::Literal(lines.into_iter().map(Into::into).collect())
    }
}
