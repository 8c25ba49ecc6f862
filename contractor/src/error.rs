use crate::{Identifier, Kind};

/// Type alias for boxed errors that can be sent across threads.
///
/// User-supplied constructors and factory closures report their failures
/// with this type.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during registration or resolution.
#[derive(Debug)]
pub enum ContainerError {
    /// An input was malformed, e.g. a factory of the wrong kind or an
    /// argument of an unexpected type.
    InvalidArgument(String),
    /// The identifier already has a registry entry.
    AlreadyRegistered(Identifier),
    /// The identifier has no registry entry.
    NotRegistered(Identifier),
    /// No constructor of the kind has all of its parameters registered.
    MissingDependencies(Kind),
    /// The container reached its configured entry limit.
    ResourceExhausted { limit: usize },
    /// Resolution re-entered an identifier that was still being resolved.
    CircularDependency(Vec<Identifier>),
    /// A resolver handle outlived the container it points to.
    ContainerDropped,
    /// A constructor or factory closure failed.
    ConstructionFailed(StdError),
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::InvalidArgument(message) => write!(f, "Invalid argument: {message}"),
            ContainerError::AlreadyRegistered(identifier) => {
                write!(f, "A registry entry already exists for {}", describe(identifier))
            }
            ContainerError::NotRegistered(identifier) => {
                write!(f, "No registry entry exists for {}", describe(identifier))
            }
            ContainerError::MissingDependencies(kind) => write!(
                f,
                "No constructor of type '{kind}' has all of its dependencies registered"
            ),
            ContainerError::ResourceExhausted { limit } => {
                write!(f, "Container already holds the maximum of {limit} entries")
            }
            ContainerError::CircularDependency(chain) => {
                write!(f, "Circular dependency detected: ")?;
                for (i, identifier) in chain.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{identifier}")?;
                }
                Ok(())
            }
            ContainerError::ContainerDropped => write!(f, "Container has been dropped"),
            ContainerError::ConstructionFailed(e) => write!(f, "Construction failed: {e}"),
        }
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContainerError::ConstructionFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<StdError> for ContainerError {
    fn from(value: StdError) -> Self {
        // Engine errors raised inside user code come back unchanged.
        match value.downcast::<ContainerError>() {
            Ok(e) => *e,
            Err(e) => Self::ConstructionFailed(e),
        }
    }
}

fn describe(identifier: &Identifier) -> String {
    match identifier.label() {
        Some(label) => format!("type '{}' with label '{label}'", identifier.kind()),
        None => format!("type '{}'", identifier.kind()),
    }
}
