//! Errors generated while compiling a configuration value.

/// Convenience wrapper to represent success or a meaningful compile error.
pub type ChartResult<T> = std::result::Result<T, Error>;

/// Errors generated by the configuration compiler.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn already_bound<S: ToString, T: ToString>(name: S, typ: T) -> Self {
        Self {
            kind: Box::new(ErrorKind::AlreadyBound(
                name.to_string(),
                typ.to_string(),
            )),
        }
    }

    pub fn undefined<S: ToString, T: ToString>(name: S, typ: T) -> Self {
        Self {
            kind: Box::new(ErrorKind::Undefined(
                name.to_string(),
                typ.to_string(),
            )),
        }
    }

    pub fn malformed<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Malformed(msg.to_string())),
        }
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self {
            kind: Box::new(ErrorKind::Misc(msg.to_string())),
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// Standard error type for compile errors.
#[derive(Clone)]
enum ErrorKind {
    /// The name has already been bound.
    AlreadyBound(String, String),
    /// The name has not been bound.
    Undefined(String, String),
    /// A state declaration is malformed.
    Malformed(String),
    /// Miscellaneous error message.
    Misc(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            AlreadyBound(name, bound_by) => {
                write!(f, "Name `{name}' already bound by {bound_by}")
            }
            Undefined(name, typ) => {
                write!(f, "Undefined {typ} name: {name}")
            }
            Malformed(msg) => write!(f, "Malformed declaration: {msg}"),
            Misc(msg) => write!(f, "{msg}"),
        }
    }
}
