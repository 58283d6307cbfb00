//! Connection session.
//!
//! A [`Session`] owns one transport and runs two loops over it until either
//! ends or the session is closed:
//!
//! - Read loop: a [`FrameReader`] cycles `AwaitingHeader → AwaitingBody(n)`
//!   and hands each complete frame to [`Room::deliver`]. One read is
//!   outstanding at a time.
//! - Write loop: frames enqueued through the [`SessionHandle`] are written in
//!   FIFO order, each completely before the next starts.
//!
//! The handle is what the room holds. It outlives the transport if a delivery
//! still references it; enqueueing to a closed handle fails without side
//! effects.
//!
//! # Invariants
//!
//! - At most one outstanding read and one outstanding write per session
//! - Frames enqueued to one session reach the transport in enqueue order
//! - `close()` deregisters from the room exactly once
//! - No transition out of `ReadState::Closed`

use std::{
    fmt,
    pin::pin,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::BytesMut;
use parley_proto::{Frame, HEADER_LEN, decode_header};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{Notify, mpsc},
};
use tracing::Instrument;

use crate::{Participant, Room, SessionError, SessionId};

/// Body prefix of the frame that tells a client its id.
pub const GREETING_PREFIX: &str = "Your ID: ";

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Send `Your ID: <id>` as the first frame on the connection.
    pub greeting: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { greeting: true }
    }
}

/// Read side of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Waiting for the 4-byte header.
    AwaitingHeader,
    /// Header decoded; waiting for this many body bytes.
    AwaitingBody(usize),
    /// Stream ended or failed. Terminal.
    Closed,
}

/// Reads frames off a byte stream one at a time.
pub struct FrameReader<R> {
    reader: R,
    state: ReadState,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader, starting in `AwaitingHeader`.
    pub fn new(reader: R) -> Self {
        Self { reader, state: ReadState::AwaitingHeader }
    }

    /// Current read state.
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary,
    /// and on every call once the reader is closed.
    ///
    /// # Errors
    ///
    /// Any I/O error (including EOF inside a frame) or header decode error.
    /// The reader is `Closed` afterwards.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, SessionError> {
        loop {
            match self.state {
                ReadState::Closed => return Ok(None),
                ReadState::AwaitingHeader => match self.read_header().await {
                    Ok(Some(len)) => self.state = ReadState::AwaitingBody(len),
                    Ok(None) => {
                        self.state = ReadState::Closed;
                        return Ok(None);
                    },
                    Err(e) => {
                        self.state = ReadState::Closed;
                        return Err(e);
                    },
                },
                ReadState::AwaitingBody(len) => {
                    let mut body = BytesMut::zeroed(len);
                    if let Err(e) = self.reader.read_exact(&mut body).await {
                        self.state = ReadState::Closed;
                        return Err(e.into());
                    }
                    self.state = ReadState::AwaitingHeader;
                    return Ok(Some(Frame::new(body.freeze())?));
                },
            }
        }
    }

    /// Returns `None` on EOF before the first header byte.
    async fn read_header(&mut self) -> Result<Option<usize>, SessionError> {
        let mut header = [0u8; HEADER_LEN];

        let n = self.reader.read(&mut header).await?;
        if n == 0 {
            return Ok(None);
        }
        self.reader.read_exact(&mut header[n..]).await?;

        Ok(Some(decode_header(&header)?))
    }
}

impl<R> fmt::Debug for FrameReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader").field("state", &self.state).finish()
    }
}

/// Shared handle to a session: its id, outbound queue and close switch.
///
/// This is the [`Participant`] the room holds.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::UnboundedSender<Frame>,
    closed: AtomicBool,
    close_signal: Notify,
    room: Weak<Room>,
}

impl SessionHandle {
    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session.
    ///
    /// The first call stops the running session (dropping any in-flight read
    /// or write) and removes it from its room. Later calls do nothing.
    /// Returns whether this call performed the close.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.close_signal.notify_waiters();
        if let Some(room) = self.room.upgrade() {
            room.leave(self);
        }

        tracing::debug!(session_id = %self.id, "session closed");
        true
    }

    /// Wait until the session is closed.
    pub async fn closed(&self) {
        let mut notified = pin!(self.close_signal.notified());
        notified.as_mut().enable();

        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl Participant for SessionHandle {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn enqueue_outbound(&self, frame: Frame) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.outbound.send(frame).map_err(|_| SessionError::Closed)
    }
}

/// One connected participant: a transport bound to a room.
pub struct Session<T> {
    handle: Arc<SessionHandle>,
    transport: T,
    outbound: mpsc::UnboundedReceiver<Frame>,
    room: Arc<Room>,
    config: SessionConfig,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Create a session with the default configuration.
    pub fn new(id: SessionId, transport: T, room: Arc<Room>) -> Self {
        Self::with_config(id, transport, room, SessionConfig::default())
    }

    /// Create a session.
    pub fn with_config(id: SessionId, transport: T, room: Arc<Room>, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(SessionHandle {
            id,
            outbound: tx,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            room: Arc::downgrade(&room),
        });

        Self { handle, transport, outbound: rx, room, config }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.handle.id
    }

    /// Shared handle for enqueueing and closing from elsewhere.
    pub fn handle(&self) -> Arc<SessionHandle> {
        Arc::clone(&self.handle)
    }

    /// Start the session and drive it to completion.
    ///
    /// Enqueues the greeting, joins the room, then services reads and writes
    /// until the peer disconnects, an error occurs, or the handle is closed.
    /// The session always leaves the room before this returns. Outbound
    /// frames still queued (or half written) when the session ends are
    /// dropped.
    ///
    /// Returns `Ok(())` for a clean disconnect or an external close, otherwise
    /// the error that ended the session.
    pub async fn run(self) -> Result<(), SessionError> {
        let handle = Arc::clone(&self.handle);
        let span = tracing::info_span!("session", session_id = %handle.id);

        let result = self.serve().instrument(span).await;
        handle.close();
        result
    }

    async fn serve(self) -> Result<(), SessionError> {
        let Self { handle, transport, outbound, room, config } = self;

        // Queued before joining so no replayed or delivered frame can precede it.
        if config.greeting {
            let greeting = Frame::from_text(&format!("{GREETING_PREFIX}{}", handle.id))?;
            handle.enqueue_outbound(greeting)?;
        }

        room.join(Arc::clone(&handle) as Arc<dyn Participant>)?;

        let members: Vec<String> = room.member_ids().iter().map(ToString::to_string).collect();
        tracing::info!(members = %members.join(" "), "connected clients");

        let (reader, writer) = tokio::io::split(transport);
        let mut frames = FrameReader::new(reader);

        tokio::select! {
            result = read_loop(&mut frames, &handle, &room) => result,
            result = write_loop(writer, outbound) => result,
            () = handle.closed() => Ok(()),
        }
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.handle.id)
            .field("closed", &self.handle.is_closed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn read_loop<R>(
    frames: &mut FrameReader<R>,
    handle: &SessionHandle,
    room: &Room,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = frames.next_frame().await? {
        tracing::debug!(len = frame.body_len(), body = %frame.body_text(), "message received");
        room.deliver(&handle.id, frame);
    }
    Ok(())
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let bytes = frame.to_bytes()?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}
