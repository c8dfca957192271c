//! Connection-lifecycle framing.
//!
//! A message ends when its sender stops sending: the client half-closes
//! its write direction after the request, the server closes after the
//! response. There is no length prefix, so exactly one message travels in
//! each direction per connection.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{ProtocolErrorKind, RpcError};

const READ_CHUNK: usize = 8 * 1024;

/// Read until the peer closes its send direction.
///
/// Fails with `MessageTooLarge` as soon as more than `max_size` bytes
/// have arrived, without waiting for the rest.
pub async fn read_to_close<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > max_size {
            return Err(RpcError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { max: max_size },
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Read until the peer closes, giving up after `timeout_duration`.
pub async fn read_to_close_with_timeout<R>(
    reader: &mut R,
    max_size: usize,
    timeout_duration: Duration,
) -> Result<Vec<u8>, RpcError>
where
    R: AsyncRead + Unpin,
{
    timeout(timeout_duration, read_to_close(reader, max_size))
        .await
        .map_err(|_| RpcError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}

/// Read and throw away whatever the peer still sends, until it closes.
///
/// Returns the number of bytes discarded.
pub async fn discard_to_close<R>(reader: &mut R) -> Result<u64, RpcError>
where
    R: AsyncRead + Unpin,
{
    Ok(tokio::io::copy(reader, &mut tokio::io::sink()).await?)
}

/// Write one whole message, then shut down the write direction.
///
/// The read direction stays open so the peer can still answer.
pub async fn write_and_half_close<W>(writer: &mut W, data: &[u8]) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_until_eof() {
        let mut cursor = Cursor::new(br#"{"count": 42}"#.to_vec());
        let bytes = read_to_close(&mut cursor, 1024).await.unwrap();
        assert_eq!(bytes, br#"{"count": 42}"#.to_vec());
    }

    #[tokio::test]
    async fn test_read_empty_stream() {
        let mut cursor = Cursor::new(Vec::new());
        let bytes = read_to_close(&mut cursor, 1024).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_read_spans_many_chunks() {
        let payload = vec![b'x'; READ_CHUNK * 3 + 17];
        let mut cursor = Cursor::new(payload.clone());
        let bytes = read_to_close(&mut cursor, payload.len()).await.unwrap();
        assert_eq!(bytes, payload);
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        let result = read_to_close(&mut cursor, 99).await;
        assert!(matches!(
            result,
            Err(RpcError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { max: 99 }
            })
        ));
    }

    #[tokio::test]
    async fn test_discard_after_oversize_leaves_writer_unblocked() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = vec![b'x'; 64 * 1024];

        let writer = tokio::spawn(async move {
            write_and_half_close(&mut client, &payload).await.unwrap();
            client
        });

        let result = read_to_close(&mut server, 4096).await;
        assert!(matches!(
            result,
            Err(RpcError::Protocol {
                kind: ProtocolErrorKind::MessageTooLarge { max: 4096 }
            })
        ));

        let discarded = discard_to_close(&mut server).await.unwrap();
        assert!(discarded > 0);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_half_close_ends_message_but_not_reply() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_and_half_close(&mut client, b"hello").await.unwrap();

        let request = read_to_close(&mut server, 1024).await.unwrap();
        assert_eq!(request, b"hello".to_vec());

        server.write_all(b"world").await.unwrap();
        drop(server);

        let reply = read_to_close(&mut client, 1024).await.unwrap();
        assert_eq!(reply, b"world".to_vec());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_client, mut server) = tokio::io::duplex(64);
        let result = read_to_close_with_timeout(&mut server, 1024, Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(RpcError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout
            })
        ));
    }
}
