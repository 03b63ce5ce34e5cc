use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Resolution,
    Fetch,
    Filesystem,
    Vcs,
    ScopeMismatch,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Vcs => "vcs",
            ErrorKind::ScopeMismatch => "scope-mismatch",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Other, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn resolution<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Resolution, msg)
    }

    pub fn fetch<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Fetch, msg)
    }

    pub fn fs<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Filesystem, msg)
    }

    pub fn vcs<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Vcs, msg)
    }

    pub fn scope<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::ScopeMismatch, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context<C: fmt::Display>(self, ctx: C) -> Self {
        Self {
            kind: self.kind,
            msg: format!("{ctx}: {}", self.msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::fs(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
