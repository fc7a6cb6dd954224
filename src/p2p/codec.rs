//! Length-prefixed framing: a 4-byte little-endian length followed by one
//! JSON envelope.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::NetworkError;

/// Maximum message size (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(NetworkError::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream between frames.
/// Waiting for the next frame is unbounded; once its header has arrived the
/// body must follow within `body_timeout`.
pub async fn read_frame<R>(
    reader: &mut R,
    body_timeout: Duration,
) -> Result<Option<Vec<u8>>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(NetworkError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    timeout(body_timeout, reader.read_exact(&mut body))
        .await
        .map_err(|_| NetworkError::Timeout(body_timeout))??;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn frames_keep_message_boundaries() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"first").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        write_frame(&mut a, b"third one").await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, T).await.unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut b, T).await.unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut b, T).await.unwrap().unwrap(), b"third one");
        assert!(read_frame(&mut b, T).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut b, T).await,
            Err(NetworkError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        let res = read_frame(&mut b, Duration::from_millis(50)).await;
        assert!(matches!(res, Err(NetworkError::Timeout(_))));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(matches!(
            read_frame(&mut b, T).await,
            Err(NetworkError::Io(_))
        ));
    }
}
