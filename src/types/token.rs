//! Revision — an opaque, totally ordered snapshot token.

use core::fmt;

use crate::error::Error;

/// A `Revision` identifies a point in time in the datastore.
///
/// Revisions are returned by mutating operations and passed back to read
/// operations to pin them at a snapshot. Callers treat them as opaque:
/// ordering is the only observable property, and the wire form is a token
/// string obtained from [`Revision::token`].
///
/// # Examples
///
/// ```
/// use warrant::Revision;
///
/// let rev = Revision::from_token("rev-42").unwrap();
/// assert_eq!(rev.token(), "rev-42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision {
    sequence: u64,
}

impl Revision {
    pub(crate) const fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    pub(crate) const fn sequence(self) -> u64 {
        self.sequence
    }

    /// Parses a revision from its wire token form.
    ///
    /// Returns `Err` if the token is empty or not a revision token.
    pub fn from_token(token: impl AsRef<str>) -> Result<Self, Error> {
        let token = token.as_ref();
        if token.is_empty() {
            return Err(Error::InvalidArgument("revision token must not be empty".into()));
        }
        let sequence = token
            .strip_prefix("rev-")
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("malformed revision token `{}`", token))
            })?;
        Ok(Self { sequence })
    }

    /// Returns the wire token form.
    pub fn token(self) -> String {
        format!("rev-{}", self.sequence)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev-{}", self.sequence)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Revision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Revision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Revision::from_token(s).map_err(serde::de::Error::custom)
    }
}
