//! Length-prefixed framing
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! [len:u32-BE][payload: len bytes]
//! ```
//!
//! The length counts payload bytes only, not the 4-byte prefix. The same
//! framing is used by client and server in both directions.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound for a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Write one frame: the big-endian length prefix followed by `payload`
///
/// Prefix and payload are assembled into a single buffer and handed to
/// `write_all`, so a partial network write is continued rather than
/// re-prefixed. The writer is flushed before returning.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge {
        len: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    trace!(len, "wrote frame");
    Ok(())
}

/// Read one frame and return its payload
///
/// Returns `Ok(None)` when the stream ends before a complete frame was read,
/// whether the peer closed cleanly between frames or vanished in the middle
/// of one. A short read is never returned as a frame.
///
/// # Errors
///
/// - [`Error::FrameTooLarge`] if the prefix declares more than `max_len` bytes
/// - [`Error::Io`] for any other transport failure
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    if !read_full(reader, &mut prefix).await? {
        return Ok(None);
    }

    let len = u32::from_be_bytes(prefix);
    if len > max_len {
        return Err(Error::FrameTooLarge {
            len: u64::from(len),
            max: u64::from(max_len),
        });
    }

    let mut payload = vec![0u8; len as usize];
    if !read_full(reader, &mut payload).await? {
        trace!(len, "stream ended inside frame payload");
        return Ok(None);
    }

    trace!(len, "read frame");
    Ok(Some(payload))
}

/// Fill `buf` completely. `Ok(false)` means the stream ended first.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::Io(e)),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    async fn round_trip(payload: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        write_frame(&mut wire, payload).await.unwrap();
        assert_eq!(wire.len(), LENGTH_PREFIX_LEN + payload.len());

        let mut reader = wire.as_slice();
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .expect("complete frame");
        assert!(reader.is_empty(), "reader must consume exactly one frame");
        frame
    }

    #[tokio::test]
    async fn round_trips_payloads_up_to_64k() {
        for len in [0usize, 1, 3, 4, 5, 255, 256, 4096, 65_535] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert_eq!(round_trip(&payload).await, payload, "length {len}");
        }
    }

    #[tokio::test]
    async fn prefix_is_big_endian_payload_length() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"{\"a\":1}").await.unwrap();
        assert_eq!(&wire[..4], &[0, 0, 0, 7]);
        assert_eq!(&wire[4..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn reassembles_partial_reads() {
        let mut mock = Builder::new()
            .read(&[0, 0])
            .read(&[0, 5, b'h'])
            .read(b"el")
            .read(b"lo")
            .build();

        let frame = read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(frame.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn empty_stream_is_end_of_stream() {
        let mut reader: &[u8] = &[];
        assert!(read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_prefix_is_end_of_stream() {
        let mut mock = Builder::new().read(&[0, 0]).build();
        assert!(read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_payload_is_end_of_stream_not_short_frame() {
        let mut mock = Builder::new().read(&[0, 0, 0, 10]).read(b"short").build();
        assert!(read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_consecutive_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").await.unwrap();
        write_frame(&mut wire, b"").await.unwrap();
        write_frame(&mut wire, b"third").await.unwrap();

        let mut reader = wire.as_slice();
        let max = DEFAULT_MAX_FRAME_LEN;
        assert_eq!(read_frame(&mut reader, max).await.unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut reader, max).await.unwrap().unwrap(), b"");
        assert_eq!(read_frame(&mut reader, max).await.unwrap().unwrap(), b"third");
        assert!(read_frame(&mut reader, max).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_frames_above_limit() {
        let mut reader: &[u8] = &[0, 1, 0, 0];
        match read_frame(&mut reader, 1024).await {
            Err(Error::FrameTooLarge { len, max }) => {
                assert_eq!(len, 65_536);
                assert_eq!(max, 1024);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_errors_propagate() {
        let mut mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let err = read_frame(&mut mock, DEFAULT_MAX_FRAME_LEN).await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
