use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum Error {
    EndOfFile,
    PipeBroken(Option<Arc<Error>>),
    NotOpen(Option<Arc<Error>>),
    Connect(String, Option<Arc<Error>>),
    Socket(i32, String),
    NotSupported(&'static str),
    QueueFull,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EndOfFile => write!(f, "end of file"),
            Error::PipeBroken(None) => write!(f, "pipe broken"),
            Error::PipeBroken(Some(cause)) => write!(f, "pipe broken: {cause}"),
            Error::NotOpen(None) => write!(f, "resource not open"),
            Error::NotOpen(Some(cause)) => write!(f, "resource not open: {cause}"),
            Error::Connect(msg, None) => write!(f, "connect failed: {msg}"),
            Error::Connect(msg, Some(cause)) => {
                write!(f, "connect failed: {msg}: {cause}")
            }
            Error::Socket(code, msg) => write!(f, "socket error {code}: {msg}"),
            Error::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Error::QueueFull => write!(f, "queue full"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::PipeBroken(Some(cause))
            | Error::NotOpen(Some(cause))
            | Error::Connect(_, Some(cause)) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl Error {
    /// Whether this error marks the orderly end of a resource rather than a
    /// fault.
    pub fn is_end_of_file(&self) -> bool {
        matches!(self, Error::EndOfFile)
    }

    pub fn is_pipe_broken(&self) -> bool {
        matches!(self, Error::PipeBroken(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
