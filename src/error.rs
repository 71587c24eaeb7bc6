use crate::emitter::MaxListenersExceeded;
use thiserror::Error;

/// Errors that can occur while trying to execute some action on a `TmiClient`.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open the TCP connection to the chat server
    #[error("Failed to connect to {server}:{port}: {source}")]
    Connect {
        /// Host that was dialed
        server: String,
        /// Port that was dialed
        port: u16,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// An I/O operation on the established socket failed
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
    /// TLS setup or handshake failed
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_native_tls::native_tls::Error),
    /// The server rejected the login credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// A send was attempted while the socket is absent or closing
    #[error("Not connected to server")]
    NotConnected,
    /// A chat message or whisper was attempted with an anonymous (`justinfan*`) login
    #[error("Cannot send anonymous messages")]
    AnonymousMessage,
    /// The server did not acknowledge a command before the timeout expired
    #[error("Timed out waiting for acknowledgement of `{0}`")]
    CommandTimedOut(String),
    /// The server acknowledged a command with a failure `msg-id`
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed {
        /// The command that was sent out
        command: String,
        /// The failure `msg-id` reported by the server
        reason: String,
    },
    /// A caller-supplied argument was rejected before anything was sent
    #[error("{0}")]
    InvalidArgument(String),
    /// Registering an event listener exceeded the configured cap
    #[error(transparent)]
    ListenerLimit(#[from] MaxListenersExceeded),
}
