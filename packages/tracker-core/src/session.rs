//! Per-connection session handling and the tracker accept loop.
//!
//! The first line of an inbound connection decides what it is: a sibling
//! tracker announcing a replication envelope (`SYNC_SIZE <n>`), or a client
//! handshake carrying the listen address the peer serves pieces from
//! (`<ip>  <port>`). Replication connections are answered with `ACK`,
//! consumed and closed; client connections enter a line-oriented command
//! loop that stays open across malformed input and only ends on `exit` or
//! disconnect. An unexpected disconnect triggers an implicit logout, itself
//! replicated to siblings so the user's files stop being offered everywhere.
use std::sync::Arc;

use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::command::{Command, FirstMessage};
use peergrid_wire_protocol::framing::{read_frame, write_frame, write_line, MAX_CONTROL_FRAME};
use peergrid_wire_protocol::sync::SyncEnvelope;
use peergrid_wire_protocol::ProtocolError;
use peergrid_worker_pool::WorkerPool;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::handler::{CommandHandler, SessionEffect};
use crate::replication::Replicator;

/// Reply for a line that is neither a command nor a valid first message.
pub const INVALID_COMMAND_REPLY: &str = "Invalid command. Please try again.";

/// Accepts connections forever, serving each one from a pool slot.
///
/// # Errors
///
/// Returns the accept error when the listener itself fails; individual
/// session errors are logged and do not stop the loop.
pub async fn run_tracker(
    listener: TcpListener,
    handler: Arc<CommandHandler>,
    replicator: Arc<Replicator>,
    pool: WorkerPool,
) -> std::io::Result<()> {
    loop {
        let (stream, remote) = listener.accept().await?;
        let handler = handler.clone();
        let replicator = replicator.clone();

        pool.spawn(async move {
            if let Err(err) = serve_connection(stream, handler, replicator).await {
                tracing::error!(%remote, tag = "ERROR", %err, "session ended with a protocol error");
            }
        })
        .await;
    }
}

/// Serves one inbound connection to completion.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the connection fails in a way the
/// session cannot answer in-band (IO errors, oversized envelopes).
pub async fn serve_connection(
    stream: TcpStream,
    handler: Arc<CommandHandler>,
    replicator: Arc<Replicator>,
) -> Result<(), ProtocolError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut first_line = String::new();
    if reader.read_line(&mut first_line).await? == 0 {
        return Ok(());
    }

    match FirstMessage::parse(&first_line) {
        Err(_) => {
            write_line(&mut writer, INVALID_COMMAND_REPLY).await?;
            Ok(())
        }
        Ok(FirstMessage::SyncSize(len)) => receive_envelope(&mut reader, &mut writer, len, &handler).await,
        Ok(FirstMessage::Handshake(origin)) => {
            run_client_session(&mut reader, &mut writer, origin, &handler, &replicator).await
        }
    }
}

async fn receive_envelope(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    len: u64,
    handler: &CommandHandler,
) -> Result<(), ProtocolError> {
    if len > MAX_CONTROL_FRAME {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_CONTROL_FRAME,
        });
    }

    write_line(writer, "ACK").await?;

    let mut body = vec![0u8; usize::try_from(len).map_err(|_| ProtocolError::FrameTooLarge { len, max: MAX_CONTROL_FRAME })?];
    reader.read_exact(&mut body).await?;

    match SyncEnvelope::decode(&String::from_utf8_lossy(&body)) {
        Ok(envelope) => handler.apply_sync(&envelope),
        Err(err) => {
            tracing::error!(tag = "SYNC", %err, "discarding malformed replication envelope");
        }
    }

    Ok(())
}

async fn run_client_session(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    origin: PeerAddress,
    handler: &CommandHandler,
    replicator: &Replicator,
) -> Result<(), ProtocolError> {
    let mut session_user: Option<String> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::warn!(%origin, tag = "FAILED", "client unexpected disconnection");
            close_session(handler, replicator, session_user.as_deref(), origin);
            return Ok(());
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                write_line(writer, &err.to_string()).await?;
                continue;
            }
        };

        if matches!(command, Command::Exit) {
            tracing::info!(%origin, tag = "INFO", "client exited");
            close_session(handler, replicator, session_user.as_deref(), origin);
            return Ok(());
        }

        let outcome = handler.handle(&command, session_user.as_deref(), origin);

        match outcome.effect {
            SessionEffect::LoggedIn(user) => session_user = Some(user),
            SessionEffect::LoggedOut => session_user = None,
            SessionEffect::None => {}
        }

        if let Some(replicated) = outcome.replicate {
            replicator.fan_out(&SyncEnvelope::new(origin, replicated));
        }

        match &command {
            // Download replies are framed in both the success and the
            // failure case; the client always reads a frame here.
            Command::DownloadFile { .. } => {
                write_frame(writer, outcome.reply.as_bytes()).await?;
            }

            // Phase 1 of an upload: after the gate opens, the manifest
            // arrives as one length-prefixed frame.
            Command::UploadFile { .. } if outcome.reply == "send_all_data." => {
                write_line(writer, &outcome.reply).await?;
                receive_upload_data(reader, writer, origin, session_user.as_deref(), handler, replicator).await?;
            }

            _ => {
                write_line(writer, &outcome.reply).await?;
            }
        }
    }
}

async fn receive_upload_data(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    origin: PeerAddress,
    session_user: Option<&str>,
    handler: &CommandHandler,
    replicator: &Replicator,
) -> Result<(), ProtocolError> {
    let frame = read_frame(reader).await?;
    let raw = String::from_utf8_lossy(&frame);

    match Command::parse(raw.trim()) {
        Ok(command @ Command::UploadFileData { .. }) => {
            let outcome = handler.handle(&command, session_user, origin);

            if let Some(replicated) = outcome.replicate {
                replicator.fan_out(&SyncEnvelope::new(origin, replicated));
            }

            write_line(writer, &outcome.reply).await
        }
        _ => write_line(writer, "File data is empty. Please try again.").await,
    }
}

/// Implicit logout at the end of a session, replicated to siblings so the
/// user's files stop being offered cluster-wide.
fn close_session(handler: &CommandHandler, replicator: &Replicator, session_user: Option<&str>, origin: PeerAddress) {
    let Some(user) = session_user else {
        return;
    };

    let outcome = handler.handle(&Command::Logout { user: None }, Some(user), origin);

    if let Some(replicated) = outcome.replicate {
        replicator.fan_out(&SyncEnvelope::new(origin, replicated));
    }
}
