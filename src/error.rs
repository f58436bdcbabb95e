use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    /// Internal invariant broken; the owning process must tear the router
    /// down. Never produced for malformed packet content.
    #[error("fatal router error: {0}")]
    Fatal(String),
}

impl Error {
    /// True if processing cannot safely continue with this router instance.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Fatal("lock poisoned".into()).is_fatal());
        assert!(!Error::Parse("truncated header".into()).is_fatal());
        assert!(!Error::InvalidPacket("bad ttl".into()).is_fatal());
    }
}
