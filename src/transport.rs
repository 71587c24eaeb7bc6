//! Implements connecting to the chat server using a plain or TLS-secured
//! TCP socket.

use crate::error::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::{BytesCodec, FramedWrite};
use tracing::trace;

pub(crate) type ReadHalf = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
pub(crate) type WriteSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, BytesCodec>;

/// Opens a socket to `server:port`, optionally wrapped in TLS using the
/// platform's default trust store, and splits it into a buffered reader and
/// a framed byte sink.
pub(crate) async fn open(
    server: &str,
    port: u16,
    secure: bool,
) -> Result<(ReadHalf, WriteSink), Error> {
    trace!("Opening {}connection to {}:{}", if secure { "TLS " } else { "" }, server, port);

    let tcp = TcpStream::connect((server, port))
        .await
        .map_err(|source| Error::Connect {
            server: server.to_owned(),
            port,
            source,
        })?;

    let (read, write): (
        Box<dyn AsyncRead + Send + Unpin>,
        Box<dyn AsyncWrite + Send + Unpin>,
    ) = if secure {
        let connector = tokio_native_tls::native_tls::TlsConnector::new()?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let stream = connector.connect(server, tcp).await?;
        let (read, write) = tokio::io::split(stream);
        (Box::new(read), Box::new(write))
    } else {
        let (read, write) = tokio::io::split(tcp);
        (Box::new(read), Box::new(write))
    };

    Ok((BufReader::new(read), FramedWrite::new(write, BytesCodec::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::SinkExt;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_connection_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"PING :tmi.twitch.tv\r\n");
            socket.write_all(b":tmi.twitch.tv PONG\r\n").await.unwrap();
        });

        let (mut reader, mut sink) = open("127.0.0.1", addr.port(), false).await.unwrap();
        sink.send(Bytes::from_static(b"PING :tmi.twitch.tv\r\n"))
            .await
            .unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, ":tmi.twitch.tv PONG\r\n");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // a port nothing is listening on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = open("127.0.0.1", port, false).await;
        assert!(matches!(result, Err(Error::Connect { .. })));
    }
}
