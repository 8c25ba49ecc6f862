use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Descriptor of a type that can be registered with or built by a container.
///
/// Two kinds are equal only when they describe the identical Rust type.
/// The type name is carried along for diagnostics and does not take part
/// in comparisons.
///
/// # Examples
///
/// ```rust
/// use contractor::Kind;
///
/// assert_eq!(Kind::of::<String>(), Kind::of::<String>());
/// assert_ne!(Kind::of::<String>(), Kind::of::<&'static str>());
/// assert_eq!(Kind::of::<u8>().name(), "u8");
/// ```
#[derive(Clone, Copy)]
pub struct Kind {
    id: TypeId,
    name: &'static str,
}

impl Kind {
    /// Returns the kind describing `T`.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] that decides equality.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name as reported by [`std::any::type_name`].
    ///
    /// Only meant for diagnostics: the exact text is not stable across
    /// compiler versions.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Kind {}

impl Hash for Kind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Kind").field(&self.name).finish()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Key under which a container stores a registration.
///
/// An identifier combines the [`Kind`] to resolve with an optional label
/// that tells apart several registrations of the same kind. Labels are
/// trimmed, and a blank label is the same as no label at all.
///
/// # Examples
///
/// ```rust
/// use contractor::{Identifier, Kind};
///
/// assert_eq!(Identifier::of::<String>(), Identifier::labeled::<String>("   "));
/// assert_eq!(
///     Identifier::labeled::<String>("bob"),
///     Identifier::labeled::<String>("  bob  "),
/// );
/// assert_ne!(
///     Identifier::labeled::<String>("bob"),
///     Identifier::labeled::<String>("alice"),
/// );
/// assert_eq!(
///     Identifier::labeled::<String>(" bob ").to_string(),
///     format!("{} (bob)", Kind::of::<String>()),
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    kind: Kind,
    label: Option<Arc<str>>,
}

impl Identifier {
    /// Creates an identifier for `kind` with an optional label.
    ///
    /// The label is trimmed. Empty or whitespace-only labels are dropped.
    pub fn new(kind: Kind, label: Option<&str>) -> Self {
        let label = label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(Arc::from);
        Self { kind, label }
    }

    /// Creates an unlabeled identifier for `T`.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self::new(Kind::of::<T>(), None)
    }

    /// Creates an identifier for `T` with the given label.
    pub fn labeled<T>(label: &str) -> Self
    where
        T: ?Sized + 'static,
    {
        Self::new(Kind::of::<T>(), Some(label))
    }

    /// Returns the kind this identifier resolves to.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Returns the normalized label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl From<Kind> for Identifier {
    fn from(kind: Kind) -> Self {
        Self::new(kind, None)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({label})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
