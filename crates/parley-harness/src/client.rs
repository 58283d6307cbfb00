//! Minimal client helpers for driving a server from simulated hosts.

use std::io;

use parley_core::{FrameReader, GREETING_PREFIX, SessionError, SessionId};
use parley_proto::Frame;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Read one frame. End of stream is an `UnexpectedEof` transport error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, SessionError>
where
    R: AsyncRead + Unpin,
{
    FrameReader::new(reader)
        .next_frame()
        .await?
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
}

/// Read one frame as text.
pub async fn read_text<R>(reader: &mut R) -> Result<String, SessionError>
where
    R: AsyncRead + Unpin,
{
    Ok(read_frame(reader).await?.body_text().into_owned())
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.to_bytes()?).await?;
    Ok(())
}

/// Write a text message.
pub async fn send_text<W>(writer: &mut W, text: &str) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &Frame::from_text(text)?).await
}

/// Read the `Your ID: <id>` greeting the server sends first.
pub async fn read_greeting<R>(reader: &mut R) -> Result<SessionId, Box<dyn std::error::Error>>
where
    R: AsyncRead + Unpin,
{
    let text = read_text(reader).await?;
    let id = text
        .strip_prefix(GREETING_PREFIX)
        .ok_or_else(|| format!("expected greeting, got {text:?}"))?;
    Ok(SessionId::parse(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greeting_round_trip() {
        let mut wire = Vec::new();
        send_text(&mut wire, "Your ID: aB3xY").await.unwrap();

        let id = read_greeting(&mut &wire[..]).await.unwrap();
        assert_eq!(id.as_str(), "aB3xY");
    }

    #[tokio::test]
    async fn non_greeting_is_rejected() {
        let mut wire = Vec::new();
        send_text(&mut wire, "hello").await.unwrap();

        assert!(read_greeting(&mut &wire[..]).await.is_err());
    }

    #[tokio::test]
    async fn end_of_stream_is_error() {
        let err = read_frame(&mut &b""[..]).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
