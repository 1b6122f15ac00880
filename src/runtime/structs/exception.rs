use std::sync::Arc;

use thiserror::Error;

/// A Java throwable raised by resolution, linking or dispatch.
///
/// Every variant names the Java class the interpreter must instantiate when it
/// turns the error into a thrown object, see [`VmError::class_name`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("java.lang.ClassFormatError: {0}")]
    ClassFormat(String),
    #[error("java.lang.NoSuchMethodError: {0}")]
    NoSuchMethod(String),
    #[error("java.lang.NoSuchFieldError: {0}")]
    NoSuchField(String),
    #[error("java.lang.AbstractMethodError: {0}")]
    AbstractMethod(String),
    #[error("java.lang.NoClassDefFoundError: {0}")]
    NoClassDefFound(String),
    /// Any other throwable reported by a loader or linker, passed through as is.
    #[error("{class_name}: {message}")]
    Thrown {
        class_name: Arc<str>,
        message: String,
    },
}

impl VmError {
    pub fn new_thrown(class_name: &str, message: impl Into<String>) -> Self {
        VmError::Thrown {
            class_name: Arc::from(class_name),
            message: message.into(),
        }
    }

    /// Internal form of the throwable class name, e.g. `java/lang/NoSuchMethodError`.
    pub fn class_name(&self) -> &str {
        match self {
            VmError::ClassFormat(_) => "java/lang/ClassFormatError",
            VmError::NoSuchMethod(_) => "java/lang/NoSuchMethodError",
            VmError::NoSuchField(_) => "java/lang/NoSuchFieldError",
            VmError::AbstractMethod(_) => "java/lang/AbstractMethodError",
            VmError::NoClassDefFound(_) => "java/lang/NoClassDefFoundError",
            VmError::Thrown { class_name, .. } => class_name,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            VmError::ClassFormat(message)
            | VmError::NoSuchMethod(message)
            | VmError::NoSuchField(message)
            | VmError::AbstractMethod(message)
            | VmError::NoClassDefFound(message)
            | VmError::Thrown { message, .. } => message,
        }
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for VmError {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        VmError::ClassFormat(format!("invalid descriptor: {err:?}"))
    }
}

pub type VmResult<T> = ::std::result::Result<T, VmError>;
