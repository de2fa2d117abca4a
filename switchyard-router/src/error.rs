use thiserror::Error;

/// Registration failures.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already registered for this key.
    #[error("{target}.{operation} is already registered")]
    AlreadyRegistered {
        /// The target name.
        target: String,
        /// The operation name.
        operation: String,
    },

    /// The target or operation name is empty.
    #[error("target and operation names must not be empty")]
    EmptyName,
}
