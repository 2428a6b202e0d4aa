// ── Composite identity codec ──
//
// Resources addressed by more than one natural key (cluster id + pool
// name, region + bucket name) are stored under a single string id made by
// joining the parts with `SEPARATOR`. Single-key resources use the same
// type with one part.
//
// The codec does not reject parts that contain the separator. Whether a
// natural key can ever contain `/` is an assumption about each remote API;
// tightening it here would reject identities that older state already
// holds. A part containing `/` will fail to parse back at the expected
// arity rather than silently split wrong.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Separator between the parts of a composite identity.
pub const SEPARATOR: char = '/';

/// Decoded resource identity: the ordered natural keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeId {
    parts: Vec<String>,
}

impl CompositeId {
    /// Identity with a single key.
    pub fn single(key: impl Into<String>) -> Self {
        Self {
            parts: vec![key.into()],
        }
    }

    /// Identity from ordered parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Decode `id`, requiring exactly `arity` non-empty parts.
    pub fn parse(id: &str, arity: usize) -> Result<Self, CoreError> {
        let parts: Vec<&str> = if arity == 1 {
            vec![id]
        } else {
            id.split(SEPARATOR).collect()
        };

        if parts.len() != arity {
            return Err(CoreError::MalformedIdentity {
                id: id.to_owned(),
                reason: format!(
                    "expected {arity} part(s) separated by {SEPARATOR:?}, found {}",
                    parts.len()
                ),
            });
        }

        if let Some(pos) = parts.iter().position(|p| p.is_empty()) {
            return Err(CoreError::MalformedIdentity {
                id: id.to_owned(),
                reason: format!("part {} is empty", pos + 1),
            });
        }

        Ok(Self::new(parts))
    }

    /// Encode into the stored string form.
    pub fn encode(&self) -> String {
        self.parts.join(&SEPARATOR.to_string())
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Borrowed parts, the shape path builders take.
    pub fn as_strs(&self) -> Vec<&str> {
        self.parts.iter().map(String::as_str).collect()
    }

    pub fn arity(&self) -> usize {
        self.parts.len()
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Join `parts` into a stored identity string.
pub fn format_id(parts: &[&str]) -> String {
    CompositeId::new(parts.iter().copied()).encode()
}

/// Split a two-part identity such as `cluster-id/pool-name`.
pub fn parse_pair(id: &str) -> Result<(String, String), CoreError> {
    let decoded = CompositeId::parse(id, 2)?;
    let mut parts = decoded.parts.into_iter();
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(CoreError::MalformedIdentity {
            id: id.to_owned(),
            reason: "expected 2 parts".into(),
        }),
    }
}
