//! The peer's interactive console.
//!
//! Most lines typed at the prompt are forwarded to the tracker verbatim and
//! their reply line is printed back. A few commands are intercepted because
//! they need work on this side of the wire:
//!
//! - `upload_file` hashes the local file into a manifest before announcing
//!   it,
//! - `download_file` strips the destination argument, asks the tracker for
//!   the manifest and runs the transfer engine in the background,
//! - `show_downloads` renders the local download history,
//! - `login`/`logout` additionally track the session user, whose name goes
//!   into uploaded manifests.
//!
//! The tracker session is behind a mutex so a finished background download
//! can report itself as a seeder without racing the prompt.
use std::path::PathBuf;
use std::sync::Arc;

use peergrid_peer_core::download::TransferEngine;
use peergrid_peer_core::error::{DownloadError, TrackerClientError};
use peergrid_peer_core::hashing::build_manifest;
use peergrid_peer_core::history::{DownloadHistory, DownloadTask};
use peergrid_peer_core::tracker_client::TrackerSession;
use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::manifest::FileManifest;
use peergrid_worker_pool::WorkerPool;
use tokio::sync::Mutex;

const DOWNLOAD_USAGE: &str = "Usage: download_file <group_id> <file_name> <destination_path>";
const UPLOAD_USAGE: &str = "Usage: upload_file <group_id> <file_path>";

/// What the console does with one typed line.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleOutput {
    /// Print this and show the prompt again.
    Reply(String),
    /// The session is over.
    Quit,
}

/// The interactive command layer of a peer.
pub struct Console {
    session: Arc<Mutex<TrackerSession>>,
    engine: TransferEngine,
    history: Arc<DownloadHistory>,
    listen: PeerAddress,
    current_user: Option<String>,
}

impl Console {
    #[must_use]
    pub fn new(session: TrackerSession, pool: WorkerPool, listen: PeerAddress) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            engine: TransferEngine::new(pool),
            history: Arc::new(DownloadHistory::new()),
            listen,
            current_user: None,
        }
    }

    /// Handles one line typed at the prompt.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the tracker cluster becomes
    /// unreachable; tracker rejections are replies, not errors.
    pub async fn handle_line(&mut self, line: &str) -> Result<ConsoleOutput, TrackerClientError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ConsoleOutput::Reply(String::new()));
        }

        let mut tokens = line.split_whitespace();
        let verb = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match (verb, args.as_slice()) {
            ("show_downloads", []) => Ok(ConsoleOutput::Reply(self.history.render())),

            ("download_file", [group, file, destination]) => {
                self.start_download(group, file, destination).await
            }
            ("download_file", _) => Ok(ConsoleOutput::Reply(DOWNLOAD_USAGE.to_string())),

            ("upload_file", [group, path]) => self.upload(group, path).await,
            ("upload_file", _) => Ok(ConsoleOutput::Reply(UPLOAD_USAGE.to_string())),

            ("login", [user, password]) => {
                let reply = self.session.lock().await.login(user, password).await?;
                if reply.contains("Login successful") {
                    self.current_user = Some((*user).to_string());
                }
                Ok(ConsoleOutput::Reply(reply))
            }

            ("logout", []) => {
                let reply = self.session.lock().await.logout().await?;
                if reply.contains("Logout successful") {
                    self.current_user = None;
                }
                Ok(ConsoleOutput::Reply(reply))
            }

            ("exit", []) => {
                self.session.lock().await.close().await;
                Ok(ConsoleOutput::Quit)
            }

            _ => {
                let reply = self.session.lock().await.send_command(line).await?;
                Ok(ConsoleOutput::Reply(reply))
            }
        }
    }

    async fn upload(&mut self, group: &str, path: &str) -> Result<ConsoleOutput, TrackerClientError> {
        let Some(user) = self.current_user.clone() else {
            // Not logged in; let the tracker produce its usual reply.
            let reply = self.session.lock().await.send_command(&format!("upload_file {group} {path}")).await?;
            return Ok(ConsoleOutput::Reply(reply));
        };

        let manifest = match build_manifest(std::path::Path::new(path), group, &user, self.listen).await {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(%path, %err, tag = "FAILED", "could not hash the file for upload");
                return Ok(ConsoleOutput::Reply(format!("Failed to upload the file. {err}")));
            }
        };

        let reply = self.session.lock().await.upload(&manifest).await?;

        Ok(ConsoleOutput::Reply(reply))
    }

    async fn start_download(
        &mut self,
        group: &str,
        file: &str,
        destination: &str,
    ) -> Result<ConsoleOutput, TrackerClientError> {
        let manifest = match self.session.lock().await.request_manifest(group, file).await {
            Ok(manifest) => manifest,
            Err(DownloadError::TrackerRejected { reply }) => return Ok(ConsoleOutput::Reply(reply)),
            Err(DownloadError::Tracker(err)) => return Err(err),
            Err(err) => {
                tracing::error!(%err, tag = "ERROR", "manifest request failed");
                return Ok(ConsoleOutput::Reply("Failed to download the file. Please try again.".to_string()));
            }
        };

        self.spawn_download(manifest, PathBuf::from(destination));

        Ok(ConsoleOutput::Reply(format!(
            "Download started. Check progress with show_downloads. ({group} {file})"
        )))
    }

    /// Runs the transfer in the background; `show_downloads` observes it
    /// through the shared history.
    fn spawn_download(&self, manifest: FileManifest, destination: PathBuf) {
        let task = Arc::new(DownloadTask::new(&manifest.group, &manifest.name, manifest.piece_count()));
        self.history.push(task.clone());

        let engine = self.engine.clone();
        let session = self.session.clone();

        tokio::spawn(async move {
            match engine.download(&manifest, &destination, &task).await {
                Ok(()) => {
                    let report = session
                        .lock()
                        .await
                        .report_seeding(&manifest.group, &manifest.name, &destination.to_string_lossy())
                        .await;

                    match report {
                        Ok(reply) => tracing::info!(group = %manifest.group, file = %manifest.name, %reply, "now seeding"),
                        Err(err) => {
                            tracing::error!(group = %manifest.group, file = %manifest.name, %err, tag = "ERROR", "could not report as seeder");
                        }
                    }

                    task.mark_complete();
                }
                Err(err) => {
                    task.mark_failed();
                    tracing::error!(group = %manifest.group, file = %manifest.name, %err, tag = "FAILED", "download failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {

    mod the_console {
        use std::net::{IpAddr, Ipv4Addr};

        use peergrid_peer_core::tracker_client::TrackerSession;
        use peergrid_primitives::PeerAddress;
        use peergrid_wire_protocol::framing::write_line;
        use peergrid_worker_pool::WorkerPool;
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::net::TcpListener;

        use crate::console::{Console, ConsoleOutput};

        fn listen_address(port: u16) -> PeerAddress {
            PeerAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
        }

        async fn scripted_tracker(replies: Vec<&'static str>) -> PeerAddress {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listen_address(listener.local_addr().unwrap().port());

            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let (read_half, mut writer) = stream.into_split();
                let mut reader = BufReader::new(read_half);

                let mut handshake = String::new();
                reader.read_line(&mut handshake).await.unwrap();

                let mut replies = replies.into_iter();
                let mut line = String::new();
                while reader.read_line(&mut line).await.unwrap() > 0 {
                    let Some(reply) = replies.next() else {
                        return;
                    };
                    write_line(&mut writer, reply).await.unwrap();
                    line.clear();
                }
            });

            address
        }

        fn console(tracker: PeerAddress) -> Console {
            let listen = listen_address(7000);
            let session = TrackerSession::new(vec![tracker], listen);
            Console::new(session, WorkerPool::new(2), listen)
        }

        #[tokio::test]
        async fn show_downloads_should_answer_locally_without_the_tracker() {
            let tracker = scripted_tracker(vec![]).await;
            let mut console = console(tracker);

            let output = console.handle_line("show_downloads").await.unwrap();

            assert_eq!(
                output,
                ConsoleOutput::Reply("No download history available.".to_string())
            );
        }

        #[tokio::test]
        async fn unknown_lines_should_be_forwarded_to_the_tracker_verbatim() {
            let tracker = scripted_tracker(vec!["Please, Enter valid command."]).await;
            let mut console = console(tracker);

            let output = console.handle_line("frobnicate").await.unwrap();

            assert_eq!(
                output,
                ConsoleOutput::Reply("Please, Enter valid command.".to_string())
            );
        }

        #[tokio::test]
        async fn a_download_with_the_wrong_arity_should_print_the_usage_line() {
            let tracker = scripted_tracker(vec![]).await;
            let mut console = console(tracker);

            let output = console.handle_line("download_file g1").await.unwrap();

            assert_eq!(
                output,
                ConsoleOutput::Reply("Usage: download_file <group_id> <file_name> <destination_path>".to_string())
            );
        }

        #[tokio::test]
        async fn exit_should_end_the_console() {
            let tracker = scripted_tracker(vec![]).await;
            let mut console = console(tracker);

            assert_eq!(console.handle_line("exit").await.unwrap(), ConsoleOutput::Quit);
        }

        #[tokio::test]
        async fn a_successful_login_should_remember_the_user_for_uploads() {
            let tracker = scripted_tracker(vec!["Login successful.", "Logout successful."]).await;
            let mut console = console(tracker);

            console.handle_line("login alice secret").await.unwrap();
            assert_eq!(console.current_user.as_deref(), Some("alice"));

            console.handle_line("logout").await.unwrap();
            assert_eq!(console.current_user, None);
        }
    }
}
