//! Length-prefixed framing of conduit messages over a byte stream (a pipe, a child's stdio, a socket).
//!
//! Format: `[type:1byte][length:4bytes big endian][data]`, where type is 0 = text, 1 = binary, 2 = close.
//! A close frame carries no length and no data.

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ConduitError, ConduitMessage, ConduitSink, ConduitSource};

// -------------------------------------------------------------------------------------------------------

const FRAME_TEXT: u8 = 0;
const FRAME_BINARY: u8 = 1;
const FRAME_CLOSE: u8 = 2;

/// frames above this size are treated as corruption
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn sink<W>(writer: W) -> ConduitSink
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let sink = futures::sink::unfold(writer, |mut writer, element: ConduitMessage| async move {
        match element {
            ConduitMessage::Text(text) => write_frame(&mut writer, FRAME_TEXT, text.as_bytes()).await?,
            ConduitMessage::Binary(bin) => write_frame(&mut writer, FRAME_BINARY, &bin).await?,
            ConduitMessage::Close(_) => {
                if writer.write_u8(FRAME_CLOSE).await.is_err() {
                    return Err(ConduitError::msg("Failed to write close message"));
                }
            }
        }
        writer.flush().await.map_err(ConduitError::from)?;
        Ok(writer)
    });

    Box::pin(sink)
}

async fn write_frame<W>(writer: &mut W, frame_type: u8, data: &[u8]) -> Result<(), ConduitError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_FRAME_LEN {
        return Err(ConduitError::msg(format!(
            "Frame of {} bytes exceeds the limit of {} bytes",
            data.len(),
            MAX_FRAME_LEN
        )));
    }

    if writer.write_u8(frame_type).await.is_err() {
        return Err(ConduitError::msg("Failed to write message type"));
    }
    if writer.write_u32(data.len() as u32).await.is_err() {
        return Err(ConduitError::msg("Failed to write message length"));
    }
    if writer.write_all(data).await.is_err() {
        return Err(ConduitError::msg("Failed to write message data"));
    }
    Ok(())
}

pub fn source<R>(reader: R) -> ConduitSource
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // the `Option` is taken once the stream hit an error, so the stream ends right after reporting it
    let stream = futures::stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;

        let frame_type = match reader.read_u8().await {
            Ok(t) => t,
            // a clean end of stream between frames
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
            Err(e) => return Some((Err(ConduitError::from(e)), None)),
        };

        match read_frame(&mut reader, frame_type).await {
            Ok(message) => Some((Ok(message), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    });

    Box::pin(stream.fuse())
}

async fn read_frame<R>(reader: &mut R, frame_type: u8) -> Result<ConduitMessage, ConduitError>
where
    R: AsyncRead + Unpin,
{
    if frame_type == FRAME_CLOSE {
        return Ok(ConduitMessage::Close(None));
    }
    if frame_type != FRAME_TEXT && frame_type != FRAME_BINARY {
        return Err(ConduitError::msg(format!(
            "Unknown message type: {}",
            frame_type
        )));
    }

    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(ConduitError::msg(format!(
            "Frame of {} bytes exceeds the limit of {} bytes",
            len, MAX_FRAME_LEN
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    if frame_type == FRAME_TEXT {
        Ok(ConduitMessage::Text(String::from_utf8(buf)?))
    } else {
        Ok(ConduitMessage::Binary(buf))
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
