//! Error types for the gateway core.
//!
//! All fallible radio operations return [`Result<T>`], which uses [`Error`]
//! as the error type. Link failures, radio-reported errors, timeouts, and
//! payload problems are all captured here.

/// The error type for all radio-side operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port could not be opened or configured).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unparseable line, unexpected module output).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No matching response arrived within the command's window.
    ///
    /// This typically indicates the module is unpowered, the baud rate is
    /// wrong, or the module is still busy with a previous mode change.
    #[error("timeout waiting for response")]
    Timeout,

    /// The module answered with an explicit `ERROR:` line.
    #[error("radio error: {0}")]
    Radio(String),

    /// A payload could not be encoded for transmission.
    #[error("codec error: {0}")]
    Codec(String),

    /// An invalid parameter was passed to a radio command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the module has been established, or the IO task
    /// has already exited.
    #[error("not connected")]
    NotConnected,

    /// The connection to the module was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures of the byte stream itself.
    ///
    /// These are fatal to the IO task; everything else is scoped to the
    /// single command that produced it.
    pub fn is_link_fault(&self) -> bool {
        matches!(
            self,
            Error::ConnectionLost | Error::Io(_) | Error::NotConnected
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_radio() {
        let e = Error::Radio("ERROR: 2".into());
        assert_eq!(e.to_string(), "radio error: ERROR: 2");
    }

    #[test]
    fn error_display_codec() {
        let e = Error::Codec("payload too large".into());
        assert_eq!(e.to_string(), "codec error: payload too large");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn link_fault_classification() {
        assert!(Error::ConnectionLost.is_link_fault());
        assert!(Error::NotConnected.is_link_fault());
        assert!(Error::Io(std::io::Error::other("x")).is_link_fault());
        assert!(!Error::Timeout.is_link_fault());
        assert!(!Error::Radio("ERROR: 1".into()).is_link_fault());
        assert!(!Error::Codec("odd".into()).is_link_fault());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
