use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// A configured directory is missing or is not a directory.
    NotADirectory(PathBuf),
    /// Invalid settings (zero counts, conflicting directories, bad TOML).
    Config(String),
    /// Fewer checkpoints exist than the retention count asks for.
    InsufficientCheckpoints { requested: usize, found: usize },
    /// A copy or delete failed part way through a phase.
    Interrupted {
        phase: &'static str,
        completed: Vec<String>,
        failed: String,
        reason: String,
    },
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::Config(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotADirectory(p) => write!(f, "not a directory: {}", p.display()),
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Error::InsufficientCheckpoints { requested, found } => write!(
                f,
                "asked to keep {requested} of the latest checkpoints, found {found}; please check your arguments"
            ),
            Error::Interrupted {
                phase,
                completed,
                failed,
                reason,
            } => {
                let done = if completed.is_empty() {
                    "none".to_string()
                } else {
                    completed.join(", ")
                };
                write!(
                    f,
                    "{phase} stopped at {failed}: {reason} (already done: {done}; remaining checkpoints left untouched)"
                )
            }
            Error::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
