//! The peer's session with the tracker cluster.
//!
//! A session talks to exactly one tracker at a time but knows the whole
//! cluster. When the active connection drops mid-command the session fails
//! over to the next reachable tracker, replays its login (state is
//! replicated, so a stale session on the dead tracker is harmless but is
//! logged out first) and retries the command once. Failover is invisible to
//! the caller apart from the latency.
//!
//! The first bytes on every connection are the handshake line carrying this
//! peer's piece-server endpoint, `<ip>  <port>`, separated by two spaces.
use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::framing::{read_frame, write_frame, write_line};
use peergrid_wire_protocol::manifest::FileManifest;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::download::CONNECT_TIMEOUT;
use crate::error::{DownloadError, TrackerClientError};

#[derive(Debug)]
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    tracker: PeerAddress,
}

#[derive(Debug, Clone)]
struct Credentials {
    user: String,
    password: String,
}

/// A failing-over client session against the tracker cluster.
#[derive(Debug)]
pub struct TrackerSession {
    trackers: Vec<PeerAddress>,
    listen: PeerAddress,
    preferred: usize,
    connection: Option<Connection>,
    credentials: Option<Credentials>,
}

impl TrackerSession {
    /// A session that will try `trackers` in order and announce `listen` as
    /// this peer's piece-server endpoint.
    #[must_use]
    pub fn new(trackers: Vec<PeerAddress>, listen: PeerAddress) -> Self {
        Self {
            trackers,
            listen,
            preferred: 0,
            connection: None,
            credentials: None,
        }
    }

    /// The tracker currently connected to, if any.
    #[must_use]
    pub fn active_tracker(&self) -> Option<PeerAddress> {
        self.connection.as_ref().map(|connection| connection.tracker)
    }

    /// Connects to the first reachable tracker, starting at the last one
    /// that worked, and sends the handshake line.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerClientError::AllTrackersUnreachable`] when no
    /// configured tracker accepts a connection.
    pub async fn connect(&mut self) -> Result<(), TrackerClientError> {
        let count = self.trackers.len();

        for attempt in 0..count {
            let index = (self.preferred + attempt) % count;
            let tracker = self.trackers[index];

            let connected =
                tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(tracker.socket_addr())).await;

            let stream = match connected {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => {
                    tracing::warn!(%tracker, %err, tag = "FAILED", "tracker unreachable, trying next");
                    continue;
                }
                Err(_elapsed) => {
                    tracing::warn!(%tracker, tag = "FAILED", "tracker connect timed out, trying next");
                    continue;
                }
            };

            let (read_half, mut writer) = stream.into_split();

            // The handshake: this peer's serving endpoint, two-space separated.
            write_line(&mut writer, &format!("{}  {}", self.listen.ip, self.listen.port)).await?;

            self.preferred = index;
            self.connection = Some(Connection {
                reader: BufReader::new(read_half),
                writer,
                tracker,
            });

            tracing::info!(%tracker, "connected to tracker");
            return Ok(());
        }

        Err(TrackerClientError::AllTrackersUnreachable)
    }

    /// Sends one command line and reads the one-line reply, failing over and
    /// retrying once if the connection drops.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerClientError::AllTrackersUnreachable`] when failover
    /// finds no tracker, or the transport error of the retried exchange.
    pub async fn send_command(&mut self, line: &str) -> Result<String, TrackerClientError> {
        self.ensure_connected().await?;

        match self.round_trip(line).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::warn!(%err, tag = "FAILED", "tracker exchange failed, failing over");
                self.failover().await?;
                self.round_trip(line).await
            }
        }
    }

    /// Logs in and remembers the credentials so a later failover can replay
    /// them on the replacement tracker.
    ///
    /// # Errors
    ///
    /// Same as [`TrackerSession::send_command`]. A rejection reply is not an
    /// error; it is returned for the caller to display.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<String, TrackerClientError> {
        let reply = self.send_command(&format!("login {user} {password}")).await?;

        if reply.contains("Login successful") {
            self.credentials = Some(Credentials {
                user: user.to_string(),
                password: password.to_string(),
            });
        }

        Ok(reply)
    }

    /// Logs out and forgets the replay credentials.
    ///
    /// # Errors
    ///
    /// Same as [`TrackerSession::send_command`].
    pub async fn logout(&mut self) -> Result<String, TrackerClientError> {
        let reply = self.send_command("logout").await?;

        if reply.contains("Logout successful") {
            self.credentials = None;
        }

        Ok(reply)
    }

    /// Asks the tracker for the manifest of `file` in `group`.
    ///
    /// The reply to `download_file` is always a frame: a `file_data` payload
    /// on success, the failure line otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::TrackerRejected`] with the tracker's reply
    /// line when the download is refused, or the transport error.
    pub async fn request_manifest(&mut self, group: &str, file: &str) -> Result<FileManifest, DownloadError> {
        self.ensure_connected().await?;

        let line = format!("download_file {group} {file}");

        let reply = match self.round_trip_framed(&line).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(%err, tag = "FAILED", "tracker exchange failed, failing over");
                self.failover().await?;
                self.round_trip_framed(&line).await?
            }
        };

        match reply.strip_prefix("file_data ") {
            Some(wire) => Ok(FileManifest::from_wire_string(wire)?),
            None => Err(DownloadError::TrackerRejected { reply }),
        }
    }

    /// Announces `manifest` to the tracker: the `upload_file` gate first,
    /// then the framed manifest payload once the tracker asks for it.
    ///
    /// # Errors
    ///
    /// Same as [`TrackerSession::send_command`]. A gate rejection is not an
    /// error; the tracker's reply line is returned either way.
    pub async fn upload(&mut self, manifest: &FileManifest) -> Result<String, TrackerClientError> {
        let gate = self
            .send_command(&format!("upload_file {} {}", manifest.group, manifest.path))
            .await?;

        if !gate.contains("send_all_data") {
            return Ok(gate);
        }

        let connection = self.connection.as_mut().ok_or(TrackerClientError::ConnectionLost)?;

        let payload = format!("upload_file_data {}", manifest.to_wire_string());
        write_frame(&mut connection.writer, payload.as_bytes()).await?;

        read_reply_line(connection).await
    }

    /// Reports this peer as a new seeder of a file it finished downloading.
    ///
    /// # Errors
    ///
    /// Same as [`TrackerSession::send_command`].
    pub async fn report_seeding(&mut self, group: &str, file: &str, path: &str) -> Result<String, TrackerClientError> {
        self.send_command(&format!("update_file_info {group} {file} {path}")).await
    }

    /// Ends the session: a best-effort `exit` line, then the connection is
    /// dropped. The tracker logs the user out either way.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _goodbye = write_line(&mut connection.writer, "exit").await;
        }

        self.credentials = None;
    }

    async fn ensure_connected(&mut self) -> Result<(), TrackerClientError> {
        if self.connection.is_none() {
            self.connect().await?;
        }
        Ok(())
    }

    /// Reconnects elsewhere and replays the remembered login so the new
    /// tracker sees the same session.
    async fn failover(&mut self) -> Result<(), TrackerClientError> {
        self.connection = None;
        self.preferred = (self.preferred + 1) % self.trackers.len().max(1);

        self.connect().await?;

        if let Some(credentials) = self.credentials.clone() {
            // The dead tracker may still replicate our old session; clear it
            // before logging in again.
            let _stale = self.round_trip(&format!("logout {}", credentials.user)).await?;

            let reply = self
                .round_trip(&format!("login {} {}", credentials.user, credentials.password))
                .await?;

            if reply.contains("Login successful") {
                tracing::info!(user = %credentials.user, "session replayed after failover");
            } else {
                tracing::warn!(user = %credentials.user, %reply, tag = "FAILED", "login replay rejected after failover");
            }
        }

        Ok(())
    }

    async fn round_trip(&mut self, line: &str) -> Result<String, TrackerClientError> {
        let connection = self.connection.as_mut().ok_or(TrackerClientError::ConnectionLost)?;

        write_line(&mut connection.writer, line).await?;

        read_reply_line(connection).await
    }

    async fn round_trip_framed(&mut self, line: &str) -> Result<String, TrackerClientError> {
        let connection = self.connection.as_mut().ok_or(TrackerClientError::ConnectionLost)?;

        write_line(&mut connection.writer, line).await?;

        let body = read_frame(&mut connection.reader).await?;

        Ok(String::from_utf8_lossy(&body).trim_end().to_string())
    }
}

async fn read_reply_line(connection: &mut Connection) -> Result<String, TrackerClientError> {
    let mut reply = String::new();

    if connection.reader.read_line(&mut reply).await? == 0 {
        return Err(TrackerClientError::ConnectionLost);
    }

    Ok(reply.trim_end().to_string())
}
