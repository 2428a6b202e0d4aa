// ── Attr: a desired-state field that may be unknown until apply ──

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A declared field that can be left to the server.
///
/// * `Unset`: not declared; the field is not managed.
/// * `Computed`: declared as "known after apply"; not managed either,
///   but the caller expects the server to fill it in.
/// * `Known(v)`: managed with value `v`.
///
/// Serializes as `v` for `Known` and as `null` otherwise; fields should
/// carry `skip_serializing_if = "Attr::is_unmanaged"` so that unmanaged
/// values disappear from diffs and request payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Attr<T> {
    #[default]
    Unset,
    Computed,
    Known(T),
}

impl<T> Attr<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn is_unmanaged(&self) -> bool {
        !self.is_known()
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unset | Self::Computed => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unset | Self::Computed => None,
        }
    }
}

impl<T> From<T> for Attr<T> {
    fn from(value: T) -> Self {
        Self::Known(value)
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unset, Self::Known)
    }
}

impl<T: Serialize> Serialize for Attr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Unset | Self::Computed => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Attr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}
