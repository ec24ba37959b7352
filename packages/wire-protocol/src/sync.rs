//! The replication envelope trackers exchange to converge their metadata.
//!
//! Every state-mutating command a tracker accepts is re-encoded as
//!
//! ```text
//! SYNC <ip> <port> <cmd> <args...>
//! ```
//!
//! where `<ip> <port>` is the originating peer's listen address and the
//! command arguments keep the same token layout the client-facing handlers
//! accept. The envelope has no identity beyond its content: replication is
//! idempotent by command, not deduplicated by envelope ID.
//!
//! On the wire the envelope travels as `SYNC_SIZE <n>\n` → `ACK\n` → `n` raw
//! bytes of the encoded form.
use peergrid_primitives::PeerAddress;

use crate::ProtocolError;

/// A mutating command as it appears inside a replication envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    Login { user: String, pass: String },
    CreateUser { user: String, pass: String },
    Logout { user: String },
    CreateGroup { group: String, user: String },
    JoinGroup { group: String, user: String },
    AcceptRequest { group: String, requested: String, owner: String },
    LeaveGroup { group: String, user: String },
    UploadFileData { manifest: String },
    UpdateFileInfo { group: String, file: String, new_path: String, user: String },
    StopShare { group: String, file: String, user: String },
}

/// A state mutation in transit between sibling trackers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEnvelope {
    /// Listen address of the peer that caused the mutation.
    pub origin: PeerAddress,
    pub command: SyncCommand,
}

impl SyncEnvelope {
    #[must_use]
    pub fn new(origin: PeerAddress, command: SyncCommand) -> Self {
        Self { origin, command }
    }

    /// Encodes the envelope into the `SYNC <ip> <port> <cmd> <args...>`
    /// token layout.
    #[must_use]
    pub fn encode(&self) -> String {
        let prefix = format!("SYNC {} {}", self.origin.ip, self.origin.port);

        match &self.command {
            SyncCommand::Login { user, pass } => format!("{prefix} login {user} {pass}"),
            SyncCommand::CreateUser { user, pass } => format!("{prefix} create_user {user} {pass}"),
            SyncCommand::Logout { user } => format!("{prefix} logout {user}"),
            SyncCommand::CreateGroup { group, user } => format!("{prefix} create_group {group} {user}"),
            SyncCommand::JoinGroup { group, user } => format!("{prefix} join_group {group} {user}"),
            SyncCommand::AcceptRequest {
                group,
                requested,
                owner,
            } => format!("{prefix} accept_request {group} {requested} {owner}"),
            SyncCommand::LeaveGroup { group, user } => format!("{prefix} leave_group {group} {user}"),
            SyncCommand::UploadFileData { manifest } => format!("{prefix} upload_file_data {manifest}"),
            SyncCommand::UpdateFileInfo {
                group,
                file,
                new_path,
                user,
            } => format!("{prefix} update_file_info {group} {file} {new_path} {user}"),
            SyncCommand::StopShare { group, file, user } => format!("{prefix} stop_share {group} {file} {user}"),
        }
    }

    /// Decodes an envelope from its token layout.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedEnvelope`] when the prefix, origin
    /// address or argument count does not match any known command.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        if tokens.len() < 5 || tokens[0] != "SYNC" {
            return Err(ProtocolError::MalformedEnvelope {
                reason: format!("expected 'SYNC <ip> <port> <cmd> <args...>', got: {raw}"),
            });
        }

        let origin = format!("{}:{}", tokens[1], tokens[2]).parse::<PeerAddress>()?;

        let command = match (tokens[3], &tokens[4..]) {
            ("login", [user, pass]) => SyncCommand::Login {
                user: (*user).to_string(),
                pass: (*pass).to_string(),
            },
            ("create_user", [user, pass]) => SyncCommand::CreateUser {
                user: (*user).to_string(),
                pass: (*pass).to_string(),
            },
            ("logout", [user]) => SyncCommand::Logout {
                user: (*user).to_string(),
            },
            ("create_group", [group, user]) => SyncCommand::CreateGroup {
                group: (*group).to_string(),
                user: (*user).to_string(),
            },
            ("join_group", [group, user]) => SyncCommand::JoinGroup {
                group: (*group).to_string(),
                user: (*user).to_string(),
            },
            ("accept_request", [group, requested, owner]) => SyncCommand::AcceptRequest {
                group: (*group).to_string(),
                requested: (*requested).to_string(),
                owner: (*owner).to_string(),
            },
            ("leave_group", [group, user]) => SyncCommand::LeaveGroup {
                group: (*group).to_string(),
                user: (*user).to_string(),
            },
            ("upload_file_data", rest) if !rest.is_empty() => {
                // The manifest may contain any token content; recover it
                // verbatim from the raw line instead of re-joining tokens.
                let pos = raw.find("upload_file_data").expect("token was matched above");
                SyncCommand::UploadFileData {
                    manifest: raw[pos + "upload_file_data".len()..].trim().to_string(),
                }
            }
            ("update_file_info", [group, file, new_path, user]) => SyncCommand::UpdateFileInfo {
                group: (*group).to_string(),
                file: (*file).to_string(),
                new_path: (*new_path).to_string(),
                user: (*user).to_string(),
            },
            ("stop_share", [group, file, user]) => SyncCommand::StopShare {
                group: (*group).to_string(),
                file: (*file).to_string(),
                user: (*user).to_string(),
            },
            (cmd, args) => {
                return Err(ProtocolError::MalformedEnvelope {
                    reason: format!("unknown command '{cmd}' with {} arguments", args.len()),
                })
            }
        };

        Ok(Self { origin, command })
    }
}
