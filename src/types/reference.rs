//! Object and subject references.

use core::fmt;

use crate::error::Error;

/// The literal relation denoting a terminal subject: traversal stops here.
pub const ELLIPSIS: &str = "...";

/// The object ID marking a public wildcard subject.
pub const WILDCARD_ID: &str = "*";

const MAX_NAMESPACE_LEN: usize = 64;
const MAX_RELATION_LEN: usize = 64;
const MAX_OBJECT_ID_LEN: usize = 1024;

pub(crate) fn validate_namespace(namespace: &str) -> Result<(), Error> {
    if namespace.is_empty() {
        return Err(Error::InvalidArgument("namespace must not be empty".into()));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(Error::InvalidArgument(format!(
            "namespace exceeds {} bytes",
            MAX_NAMESPACE_LEN
        )));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::InvalidArgument(format!(
            "namespace `{}` contains invalid characters",
            namespace
        )));
    }
    Ok(())
}

pub(crate) fn validate_relation_name(relation: &str) -> Result<(), Error> {
    if relation.is_empty() {
        return Err(Error::InvalidArgument("relation must not be empty".into()));
    }
    if relation.len() > MAX_RELATION_LEN {
        return Err(Error::InvalidArgument(format!(
            "relation exceeds {} bytes",
            MAX_RELATION_LEN
        )));
    }
    if !relation
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::InvalidArgument(format!(
            "relation `{}` contains invalid characters",
            relation
        )));
    }
    Ok(())
}

fn validate_object_id(object_id: &str) -> Result<(), Error> {
    if object_id.is_empty() {
        return Err(Error::InvalidArgument("object_id must not be empty".into()));
    }
    if object_id.len() > MAX_OBJECT_ID_LEN {
        return Err(Error::InvalidArgument(format!(
            "object_id exceeds {} bytes",
            MAX_OBJECT_ID_LEN
        )));
    }
    if !object_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '|' | '=' | '+' | '.' | '@'))
    {
        return Err(Error::InvalidArgument(format!(
            "object_id `{}` contains invalid characters",
            object_id
        )));
    }
    Ok(())
}

/// A reference to a specific object.
///
/// Consists of a namespace (e.g., `"document"`) and an object ID (e.g.,
/// `"doc-123"`). Both fields are validated at construction: non-empty,
/// bounded length, identifier characters only.
///
/// # Examples
///
/// ```
/// use warrant::ObjectReference;
///
/// let obj = ObjectReference::new("document", "doc-123").unwrap();
/// assert_eq!(obj.namespace(), "document");
/// assert_eq!(obj.object_id(), "doc-123");
/// assert_eq!(obj.to_string(), "document:doc-123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectReference {
    namespace: String,
    object_id: String,
}

impl ObjectReference {
    /// Creates a new `ObjectReference` with the given namespace and ID.
    ///
    /// Returns `Err` if either field is empty, too long, or carries invalid
    /// characters. The wildcard ID `*` is rejected here; build wildcards via
    /// [`SubjectReference::wildcard`].
    pub fn new(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, Error> {
        let namespace = namespace.into();
        let object_id = object_id.into();

        validate_namespace(&namespace)?;
        validate_object_id(&object_id)?;

        Ok(Self {
            namespace,
            object_id,
        })
    }

    /// The wildcard reference covering every object of a namespace.
    pub(crate) fn wildcard(namespace: impl Into<String>) -> Result<Self, Error> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            namespace,
            object_id: WILDCARD_ID.into(),
        })
    }

    /// Returns the namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the object ID.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Returns `true` if this reference is the wildcard for its namespace.
    pub fn is_wildcard(&self) -> bool {
        self.object_id == WILDCARD_ID
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.object_id)
    }
}

impl std::str::FromStr for ObjectReference {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        let (namespace, object_id) = value.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!("malformed object reference `{}`", value))
        })?;
        ObjectReference::new(namespace, object_id)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ObjectReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ObjectReference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A reference to a subject in a relationship.
///
/// Consists of an [`ObjectReference`] and an optional relation name.
/// `None` stands for the ellipsis relation `...`: the subject is terminal
/// and evaluation does not traverse further. `Some("member")` makes the
/// subject a userset (`group:eng#member`).
///
/// # Examples
///
/// ```
/// use warrant::{ObjectReference, SubjectReference};
///
/// // Terminal subject
/// let subject = SubjectReference::new(
///     ObjectReference::new("user", "alice").unwrap(),
///     None::<String>,
/// ).unwrap();
///
/// // Userset subject
/// let subject = SubjectReference::new(
///     ObjectReference::new("group", "eng").unwrap(),
///     Some("member"),
/// ).unwrap();
/// assert_eq!(subject.to_string(), "group:eng#member");
///
/// // Public wildcard: every user
/// let subject = SubjectReference::wildcard("user").unwrap();
/// assert!(subject.is_wildcard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectReference {
    object: ObjectReference,
    optional_relation: Option<String>,
}

impl SubjectReference {
    /// Creates a new `SubjectReference`.
    ///
    /// Returns `Err` if `optional_relation` is `Some("")` or an invalid
    /// identifier. Use `None` (or explicitly `Some("...")`, which normalizes
    /// to `None`) for a terminal subject.
    pub fn new(
        object: ObjectReference,
        optional_relation: Option<impl Into<String>>,
    ) -> Result<Self, Error> {
        let optional_relation = match optional_relation.map(Into::into) {
            Some(rel) if rel == ELLIPSIS => None,
            other => other,
        };
        if let Some(ref rel) = optional_relation {
            validate_relation_name(rel)?;
        }
        Ok(Self {
            object,
            optional_relation,
        })
    }

    /// Creates the public wildcard subject for a namespace: every object of
    /// that namespace is a member, minus any exclusions tracked by the
    /// subject-set algebra.
    pub fn wildcard(namespace: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            object: ObjectReference::wildcard(namespace)?,
            optional_relation: None,
        })
    }

    /// Returns the subject's object reference.
    pub fn object(&self) -> &ObjectReference {
        &self.object
    }

    /// Returns the optional relation on the subject. `None` is the ellipsis.
    pub fn optional_relation(&self) -> Option<&str> {
        self.optional_relation.as_deref()
    }

    /// Returns `true` if this subject is a public wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.object.is_wildcard() && self.optional_relation.is_none()
    }

    /// Returns `true` if this subject is a userset (carries a relation) and
    /// evaluation must traverse through it.
    pub fn is_userset(&self) -> bool {
        self.optional_relation.is_some()
    }
}

impl fmt::Display for SubjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object)?;
        if let Some(rel) = &self.optional_relation {
            write!(f, "#{}", rel)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SubjectReference {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        let (object, relation) = match value.split_once('#') {
            Some((object, relation)) => (object, Some(relation)),
            None => (value, None),
        };
        let (namespace, object_id) = object.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!("malformed subject reference `{}`", value))
        })?;
        if object_id == WILDCARD_ID {
            if relation.is_some() {
                return Err(Error::InvalidArgument(
                    "a wildcard subject cannot carry a relation".into(),
                ));
            }
            return SubjectReference::wildcard(namespace);
        }
        SubjectReference::new(ObjectReference::new(namespace, object_id)?, relation)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for SubjectReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SubjectReference {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_reference_valid() {
        let obj = ObjectReference::new("document", "doc-123").unwrap();
        assert_eq!(obj.namespace(), "document");
        assert_eq!(obj.object_id(), "doc-123");
    }

    #[test]
    fn object_reference_empty_namespace() {
        let err = ObjectReference::new("", "doc-123").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn object_reference_empty_id() {
        let err = ObjectReference::new("document", "").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn object_reference_rejects_bad_characters() {
        assert!(ObjectReference::new("Document", "d1").is_err());
        assert!(ObjectReference::new("doc ument", "d1").is_err());
        assert!(ObjectReference::new("document", "d#1").is_err());
        assert!(ObjectReference::new("document", "d:1").is_err());
        assert!(ObjectReference::new("document", "*").is_err());
    }

    #[test]
    fn object_reference_rejects_oversized_id() {
        let long = "x".repeat(1025);
        assert!(ObjectReference::new("document", long).is_err());
        let max = "x".repeat(1024);
        assert!(ObjectReference::new("document", max).is_ok());
    }

    #[test]
    fn object_reference_equality_and_hash() {
        use std::collections::HashSet;
        let a = ObjectReference::new("doc", "1").unwrap();
        let b = ObjectReference::new("doc", "1").unwrap();
        let c = ObjectReference::new("doc", "2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn subject_reference_without_relation() {
        let obj = ObjectReference::new("user", "alice").unwrap();
        let sub = SubjectReference::new(obj, None::<String>).unwrap();
        assert_eq!(sub.object().namespace(), "user");
        assert_eq!(sub.optional_relation(), None);
        assert!(!sub.is_userset());
    }

    #[test]
    fn subject_reference_with_relation() {
        let obj = ObjectReference::new("group", "eng").unwrap();
        let sub = SubjectReference::new(obj, Some("member")).unwrap();
        assert_eq!(sub.optional_relation(), Some("member"));
        assert!(sub.is_userset());
    }

    #[test]
    fn subject_reference_empty_relation_rejected() {
        let obj = ObjectReference::new("group", "eng").unwrap();
        let err = SubjectReference::new(obj, Some("")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn subject_reference_ellipsis_normalizes_to_none() {
        let obj = ObjectReference::new("user", "alice").unwrap();
        let sub = SubjectReference::new(obj, Some(ELLIPSIS)).unwrap();
        assert_eq!(sub.optional_relation(), None);
    }

    #[test]
    fn wildcard_subject() {
        let sub = SubjectReference::wildcard("user").unwrap();
        assert!(sub.is_wildcard());
        assert_eq!(sub.to_string(), "user:*");
    }

    #[test]
    fn display_forms() {
        let obj = ObjectReference::new("document", "plan").unwrap();
        assert_eq!(obj.to_string(), "document:plan");
        let sub = SubjectReference::new(
            ObjectReference::new("group", "eng").unwrap(),
            Some("member"),
        )
        .unwrap();
        assert_eq!(sub.to_string(), "group:eng#member");
    }

    #[test]
    fn parse_object_reference() {
        let obj: ObjectReference = "document:plan".parse().unwrap();
        assert_eq!(obj.namespace(), "document");
        assert_eq!(obj.object_id(), "plan");
        assert!("document".parse::<ObjectReference>().is_err());
        assert!("document:".parse::<ObjectReference>().is_err());
    }

    #[test]
    fn parse_subject_reference_forms() {
        let sub: SubjectReference = "user:alice".parse().unwrap();
        assert_eq!(sub.optional_relation(), None);

        let sub: SubjectReference = "group:eng#member".parse().unwrap();
        assert_eq!(sub.optional_relation(), Some("member"));

        let sub: SubjectReference = "user:*".parse().unwrap();
        assert!(sub.is_wildcard());

        assert!("user:*#member".parse::<SubjectReference>().is_err());
        assert!("alice".parse::<SubjectReference>().is_err());
    }
}
