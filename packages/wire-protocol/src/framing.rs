//! Length-prefixed framing shared by manifest transfer, piece transfer and
//! replication envelopes.
//!
//! A frame is an 8-byte big-endian unsigned length sent as a separate write,
//! followed by exactly that many raw bytes, written in bounded chunks. The
//! same layout is used everywhere a payload can exceed a single command
//! line, which keeps the 8-byte contract in one place.
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Upper bound for a control frame (manifests, replication envelopes).
///
/// Piece frames are bounded by the piece size instead and use
/// [`read_frame_with_limit`] with the expected piece length.
pub const MAX_CONTROL_FRAME: u64 = 8 * 1024 * 1024;

/// Chunk size used when streaming a frame body.
pub const FRAME_CHUNK_SIZE: usize = 64 * 1024;

/// Reads one length-prefixed frame, rejecting frames larger than `max`.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when the announced length exceeds
/// `max`, [`ProtocolError::ConnectionClosed`] when the remote end closes the
/// socket mid-frame, or the underlying IO error.
pub async fn read_frame_with_limit<R>(reader: &mut R, max: u64) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u64().await.map_err(map_eof)?;

    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max });
    }

    let mut body = vec![0u8; usize::try_from(len).expect("frame length fits in usize after the limit check")];
    reader.read_exact(&mut body).await.map_err(map_eof)?;

    Ok(body)
}

/// Reads one length-prefixed control frame (manifests, envelopes).
///
/// # Errors
///
/// Same as [`read_frame_with_limit`] with [`MAX_CONTROL_FRAME`] as the bound.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    read_frame_with_limit(reader, MAX_CONTROL_FRAME).await
}

/// Writes one length-prefixed frame: the 8-byte length as a separate write,
/// then the body in [`FRAME_CHUNK_SIZE`] chunks.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(body.len() as u64).await?;

    for chunk in body.chunks(FRAME_CHUNK_SIZE) {
        writer.write_all(chunk).await?;
    }

    writer.flush().await?;

    Ok(())
}

/// Writes one newline-terminated command line.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}

fn map_eof(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(err)
    }
}

#[cfg(test)]
mod tests {

    mod the_frame_layer {
        use crate::framing::{read_frame, read_frame_with_limit, write_frame};
        use crate::ProtocolError;

        #[tokio::test]
        async fn it_should_round_trip_a_frame() {
            let (mut client, mut server) = tokio::io::duplex(1024);

            write_frame(&mut client, b"file_data hello").await.unwrap();

            let body = read_frame(&mut server).await.unwrap();

            assert_eq!(body, b"file_data hello");
        }

        #[tokio::test]
        async fn it_should_prefix_the_body_with_its_big_endian_length() {
            let (mut client, mut server) = tokio::io::duplex(1024);

            write_frame(&mut client, b"ACK").await.unwrap();

            let mut raw = [0u8; 11];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut raw).await.unwrap();

            assert_eq!(&raw[..8], &3u64.to_be_bytes());
            assert_eq!(&raw[8..], b"ACK");
        }

        #[tokio::test]
        async fn it_should_reject_a_frame_larger_than_the_limit() {
            let (mut client, mut server) = tokio::io::duplex(1024);

            tokio::io::AsyncWriteExt::write_u64(&mut client, 1024).await.unwrap();

            let result = read_frame_with_limit(&mut server, 512).await;

            assert!(matches!(result, Err(ProtocolError::FrameTooLarge { len: 1024, max: 512 })));
        }

        #[tokio::test]
        async fn it_should_report_a_closed_connection_instead_of_a_raw_eof() {
            let (client, mut server) = tokio::io::duplex(1024);

            drop(client);

            let result = read_frame(&mut server).await;

            assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
        }

        #[tokio::test]
        async fn it_should_stream_bodies_larger_than_one_chunk() {
            let (mut client, mut server) = tokio::io::duplex(256 * 1024);

            let body = vec![0xAB_u8; 150 * 1024];
            let expected = body.clone();

            let writer = tokio::spawn(async move { write_frame(&mut client, &body).await });

            let received = read_frame(&mut server).await.unwrap();
            writer.await.unwrap().unwrap();

            assert_eq!(received, expected);
        }
    }
}
