/// Errors reported by the containers in this crate.
///
/// Every fallible operation returns one of these instead of panicking. A
/// failed operation never leaves a container partially modified: the state
/// observed afterwards is the state from before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// The backing store could not be allocated or grown.
    #[error("backing store allocation failed")]
    Alloc,
    /// The operation requires at least one element.
    #[error("container is empty")]
    Empty,
    /// The requested key or value is not present.
    #[error("key or value not found")]
    NotFound,
    /// An argument violates a precondition, such as a load factor outside
    /// `(0, 1)` or a resize below the live element count.
    #[error("invalid argument")]
    Invalid,
    /// An index is outside the bounds of the container.
    #[error("index out of range")]
    Range,
    /// A key or value that must be unique is already present.
    #[error("key or value already present")]
    Duplicate,
    /// An internal consistency check failed.
    ///
    /// This indicates a bug in the container rather than misuse. The
    /// container is left in its last consistent state.
    #[error("internal invariant violated")]
    Corrupted,
}

/// Shorthand for results produced by this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
