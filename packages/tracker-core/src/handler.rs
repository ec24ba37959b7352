//! The command handler layer.
//!
//! Every client command and every replication envelope ends up here. The
//! handler owns no IO: it mutates the registries, produces the single-line
//! reply, and tells the caller which mutations to replicate to sibling
//! trackers. Client sessions and replication intake share the same
//! operations, which is what makes replication idempotent: re-applying
//! `create_group g1` on a sibling that already has the group is answered by
//! the same group-exists error, logged and dropped.
use std::sync::Arc;

use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::command::Command;
use peergrid_wire_protocol::manifest::FileManifest;
use peergrid_wire_protocol::sync::{SyncCommand, SyncEnvelope};

use crate::error::{CommandError, FileError, GroupError, UserError};
use crate::state::TrackerState;

/// Reply sent when an authenticated command arrives outside a session.
pub const LOGIN_FIRST_REPLY: &str = "Please login/Create first using the login/create_user command.";

/// Reply sent when a login arrives inside an already-authenticated session.
pub const ALREADY_LOGGED_IN_REPLY: &str = "You are already logged in. Please logout first to login/create another user.";

/// How the session's authentication state changes after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    None,
    LoggedIn(String),
    LoggedOut,
}

/// What a handled command produced: the reply line, the mutation to fan out
/// to siblings (if any), and the session-state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub reply: String,
    pub replicate: Option<SyncCommand>,
    pub effect: SessionEffect,
}

impl HandlerOutcome {
    fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            replicate: None,
            effect: SessionEffect::None,
        }
    }
}

/// Handles client commands and replication envelopes against the shared
/// tracker state.
pub struct CommandHandler {
    state: Arc<TrackerState>,
}

impl CommandHandler {
    #[must_use]
    pub fn new(state: &Arc<TrackerState>) -> Self {
        Self { state: state.clone() }
    }

    /// Handles one client command.
    ///
    /// `session_user` is the authenticated user of the connection, `None`
    /// during the login phase. `origin` is the listen address the peer
    /// announced in its handshake; it becomes the session address on login
    /// and the seeder address on `update_file_info`.
    #[must_use]
    pub fn handle(&self, command: &Command, session_user: Option<&str>, origin: PeerAddress) -> HandlerOutcome {
        let outcome = self.dispatch(command, session_user, origin);

        match &outcome.replicate {
            Some(replicated) => {
                tracing::info!(origin = %origin, tag = "INFO", reply = %outcome.reply.lines().next().unwrap_or_default(), ?replicated, "command handled");
            }
            None => {
                tracing::debug!(origin = %origin, tag = "INFO", reply = %outcome.reply.lines().next().unwrap_or_default(), "command handled");
            }
        }

        outcome
    }

    /// Applies a replication envelope received from a sibling tracker.
    ///
    /// Failures are expected under at-least-once delivery (the mutation may
    /// already be applied); they are logged with the `SYNC` tag and dropped.
    pub fn apply_sync(&self, envelope: &SyncEnvelope) {
        let origin = envelope.origin;

        let result = match &envelope.command {
            SyncCommand::Login { user, pass } => self.login(user, pass, origin),
            SyncCommand::CreateUser { user, pass } => self.create_user(user, pass),
            SyncCommand::Logout { user } => self.logout(user),
            SyncCommand::CreateGroup { group, user } => self.create_group(user, group),
            SyncCommand::JoinGroup { group, user } => self.join_group(user, group),
            SyncCommand::AcceptRequest {
                group,
                requested,
                owner,
            } => self.accept_request(owner, requested, group),
            SyncCommand::LeaveGroup { group, user } => self.leave_group(user, group),
            SyncCommand::UploadFileData { manifest } => self.upload_file_data_from_owner(manifest),
            SyncCommand::UpdateFileInfo {
                group,
                file,
                new_path,
                user,
            } => self.update_file_info(user, group, file, new_path, origin),
            SyncCommand::StopShare { group, file, user } => self.stop_share(user, group, file),
        };

        match result {
            Ok(reply) => {
                tracing::info!(origin = %origin, tag = "SYNC", reply = %reply.lines().next().unwrap_or_default(), "replicated command applied");
            }
            Err(err) => {
                tracing::info!(origin = %origin, tag = "SYNC", %err, "replicated command was a no-op");
            }
        }
    }

    fn dispatch(&self, command: &Command, session_user: Option<&str>, origin: PeerAddress) -> HandlerOutcome {
        match (command, session_user) {
            (Command::Login { .. } | Command::CreateUser { .. }, Some(_)) => {
                HandlerOutcome::reply_only(ALREADY_LOGGED_IN_REPLY)
            }

            (Command::Login { user, pass }, None) => match self.login(user, pass, origin) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::Login {
                        user: user.clone(),
                        pass: pass.clone(),
                    }),
                    effect: SessionEffect::LoggedIn(user.clone()),
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            (Command::CreateUser { user, pass }, None) => match self.create_user(user, pass) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::CreateUser {
                        user: user.clone(),
                        pass: pass.clone(),
                    }),
                    effect: SessionEffect::None,
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            (Command::Logout { user }, session) => {
                let Some(effective) = user.as_deref().or(session) else {
                    return HandlerOutcome::reply_only(
                        UserError::NotLoggedIn { user: String::new() }.to_string(),
                    );
                };

                match self.logout(effective) {
                    Ok(reply) => HandlerOutcome {
                        reply,
                        replicate: Some(SyncCommand::Logout {
                            user: effective.to_string(),
                        }),
                        effect: SessionEffect::LoggedOut,
                    },
                    Err(err) => HandlerOutcome::reply_only(err.to_string()),
                }
            }

            (Command::Exit, _) => HandlerOutcome::reply_only(String::new()),

            (_, None) => HandlerOutcome::reply_only(LOGIN_FIRST_REPLY),

            (command, Some(user)) => self.dispatch_authenticated(command, user, origin),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch_authenticated(&self, command: &Command, user: &str, origin: PeerAddress) -> HandlerOutcome {
        match command {
            Command::CreateGroup { group } => match self.create_group(user, group) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::CreateGroup {
                        group: group.clone(),
                        user: user.to_string(),
                    }),
                    effect: SessionEffect::None,
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            Command::ListGroups => HandlerOutcome::reply_only(self.list_groups()),

            Command::JoinGroup { group } => match self.join_group(user, group) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::JoinGroup {
                        group: group.clone(),
                        user: user.to_string(),
                    }),
                    effect: SessionEffect::None,
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            Command::LeaveGroup { group } => match self.leave_group(user, group) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::LeaveGroup {
                        group: group.clone(),
                        user: user.to_string(),
                    }),
                    effect: SessionEffect::None,
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            Command::ListRequests { group } => match self.list_requests(user, group) {
                Ok(reply) | Err(reply) => HandlerOutcome::reply_only(reply),
            },

            Command::AcceptRequest { group, user: requested } => {
                match self.accept_request(user, requested, group) {
                    Ok(reply) => HandlerOutcome {
                        reply,
                        replicate: Some(SyncCommand::AcceptRequest {
                            group: group.clone(),
                            requested: requested.clone(),
                            owner: user.to_string(),
                        }),
                        effect: SessionEffect::None,
                    },
                    Err(err) => HandlerOutcome::reply_only(err.to_string()),
                }
            }

            Command::ListFiles { group } => match self.list_files(user, group) {
                Ok(reply) => HandlerOutcome::reply_only(reply),
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            Command::UploadFile { group, path } => {
                match self.upload_gate(user, group, basename(path)) {
                    Ok(reply) => HandlerOutcome::reply_only(reply),
                    Err(err) => HandlerOutcome::reply_only(err.to_string()),
                }
            }

            Command::UploadFileData { manifest } => match self.upload_file_data(user, manifest) {
                Ok(reply) => HandlerOutcome {
                    reply,
                    replicate: Some(SyncCommand::UploadFileData {
                        manifest: manifest.clone(),
                    }),
                    effect: SessionEffect::None,
                },
                Err(err) => HandlerOutcome::reply_only(err.to_string()),
            },

            Command::DownloadFile { group, file } => match self.download_file(user, group, file) {
                Ok(reply) | Err(reply) => HandlerOutcome::reply_only(reply),
            },

            Command::UpdateFileInfo { group, file, new_path } => {
                let file = basename(file);
                match self.update_file_info(user, group, file, new_path, origin) {
                    Ok(reply) => HandlerOutcome {
                        reply,
                        replicate: Some(SyncCommand::UpdateFileInfo {
                            group: group.clone(),
                            file: file.to_string(),
                            new_path: new_path.clone(),
                            user: user.to_string(),
                        }),
                        effect: SessionEffect::None,
                    },
                    Err(err) => HandlerOutcome::reply_only(err.to_string()),
                }
            }

            Command::StopShare { group, file } => {
                let file = basename(file);
                match self.stop_share(user, group, file) {
                    Ok(reply) => HandlerOutcome {
                        reply,
                        replicate: Some(SyncCommand::StopShare {
                            group: group.clone(),
                            file: file.to_string(),
                            user: user.to_string(),
                        }),
                        effect: SessionEffect::None,
                    },
                    Err(err) => HandlerOutcome::reply_only(err.to_string()),
                }
            }

            Command::Login { .. } | Command::CreateUser { .. } | Command::Logout { .. } | Command::Exit => {
                // Handled by `dispatch` before authentication is known.
                HandlerOutcome::reply_only(ALREADY_LOGGED_IN_REPLY)
            }
        }
    }

    fn login(&self, user: &str, pass: &str, origin: PeerAddress) -> Result<String, CommandError> {
        self.state.users.login(user, pass, origin)?;
        Ok("Login successful.".to_string())
    }

    fn create_user(&self, user: &str, pass: &str) -> Result<String, CommandError> {
        self.state.users.register(user, pass)?;
        Ok("User created successfully. Please login now.".to_string())
    }

    fn logout(&self, user: &str) -> Result<String, CommandError> {
        self.state.users.logout(user)?;
        Ok("Logout successful.".to_string())
    }

    fn create_group(&self, user: &str, group: &str) -> Result<String, CommandError> {
        self.state.groups.create(group, user)?;
        Ok(format!("Group is registered as {group}."))
    }

    fn list_groups(&self) -> String {
        let groups = self.state.groups.list();

        if groups.is_empty() {
            "No group available".to_string()
        } else {
            groups.join("\n")
        }
    }

    fn join_group(&self, user: &str, group: &str) -> Result<String, CommandError> {
        self.state.groups.request_join(user, group)?;
        Ok(format!("Group name {group} join request is placed, wait until owner accepts it."))
    }

    fn leave_group(&self, user: &str, group: &str) -> Result<String, CommandError> {
        use crate::registry::LeaveOutcome;

        let outcome = self.state.groups.leave(user, group)?;

        Ok(match outcome {
            LeaveOutcome::Left => format!("You left group {group}."),
            LeaveOutcome::OwnershipTransferred { new_owner } => {
                format!("You left group {group} and the new owner is user {new_owner}.")
            }
            LeaveOutcome::GroupRemoved => {
                format!("You left group {group} and you were the last member, so the group is removed.")
            }
        })
    }

    fn list_requests(&self, owner: &str, group: &str) -> Result<String, String> {
        match self.state.groups.pending_requests(owner, group) {
            Ok(pending) if pending.is_empty() => Ok("No request available".to_string()),
            Ok(pending) => Ok(pending.join("\n")),
            Err(err) => Err(err.to_string()),
        }
    }

    fn accept_request(&self, owner: &str, requested: &str, group: &str) -> Result<String, CommandError> {
        self.state.groups.approve(owner, requested, group)?;
        Ok(format!("You successfully accepted request of {requested} in group {group}."))
    }

    fn list_files(&self, user: &str, group: &str) -> Result<String, CommandError> {
        self.require_member(user, group)?;

        let live: Vec<String> = self
            .state
            .files
            .list(group)
            .into_iter()
            .filter(|file| {
                self.state
                    .files
                    .get(group, file)
                    .is_some_and(|manifest| manifest.seeders.keys().any(|seeder| self.state.users.is_logged_in(seeder)))
            })
            .collect();

        if live.is_empty() {
            Ok(format!("No file available in group {group}"))
        } else {
            Ok(live.join("\n"))
        }
    }

    fn upload_gate(&self, user: &str, group: &str, file: &str) -> Result<String, CommandError> {
        self.require_member(user, group)?;

        if self.state.files.exists(group, file) {
            return Err(FileError::AlreadyExists {
                file: file.to_string(),
                group: group.to_string(),
            }
            .into());
        }

        Ok("send_all_data.".to_string())
    }

    fn upload_file_data(&self, user: &str, raw_manifest: &str) -> Result<String, CommandError> {
        let manifest = FileManifest::from_wire_string(raw_manifest).map_err(|err| CommandError::MalformedFileData {
            reason: err.to_string(),
        })?;

        self.upload_gate(user, &manifest.group, &manifest.name)?;

        let name = manifest.name.clone();
        let group = manifest.group.clone();
        self.state.files.add(manifest)?;

        Ok(format!("File name {name} is successfully added in group {group}."))
    }

    /// Replication intake for uploads: the acting user is the manifest's
    /// owner, not a local session.
    fn upload_file_data_from_owner(&self, raw_manifest: &str) -> Result<String, CommandError> {
        let manifest = FileManifest::from_wire_string(raw_manifest).map_err(|err| CommandError::MalformedFileData {
            reason: err.to_string(),
        })?;

        self.upload_file_data(&manifest.owner.clone(), raw_manifest)
    }

    /// The reply is the framed `file_data` payload on success, or the
    /// framed error line on failure; both sides of the `Result` are sent
    /// the same way.
    fn download_file(&self, user: &str, group: &str, file: &str) -> Result<String, String> {
        self.require_member(user, group).map_err(|err| err.to_string())?;

        let Some(mut manifest) = self.state.files.get(group, file) else {
            return Err(FileError::NotFound {
                file: file.to_string(),
                group: group.to_string(),
            }
            .to_string());
        };

        // Offer only live seeders, and never the requester itself.
        manifest
            .seeders
            .retain(|seeder, _| seeder != user && self.state.users.is_logged_in(seeder));
        manifest.seeder_paths.retain(|seeder, _| manifest.seeders.contains_key(seeder));

        if !manifest.has_seeders() {
            return Err(FileError::NoLiveSeeder {
                file: file.to_string(),
                group: group.to_string(),
            }
            .to_string());
        }

        Ok(format!("file_data {}", manifest.to_wire_string()))
    }

    fn update_file_info(
        &self,
        user: &str,
        group: &str,
        file: &str,
        new_path: &str,
        origin: PeerAddress,
    ) -> Result<String, CommandError> {
        self.require_member(user, group)?;
        self.state.files.add_seeder(group, file, user, origin, new_path)?;

        Ok(format!("File path for file name {file} is successfully updated in group {group}."))
    }

    fn stop_share(&self, user: &str, group: &str, file: &str) -> Result<String, CommandError> {
        self.require_member(user, group)?;
        self.state.files.remove_seeder(group, file, user)?;

        Ok(format!("You successfully stopped sharing file name {file} in group {group}."))
    }

    fn require_member(&self, user: &str, group: &str) -> Result<(), CommandError> {
        if !self.state.groups.exists(group) {
            return Err(GroupError::NotFound { group: group.to_string() }.into());
        }

        if !self.state.groups.is_member(user, group) {
            return Err(GroupError::NotMember { group: group.to_string() }.into());
        }

        Ok(())
    }
}

/// File names on the wire may arrive as full paths; registries key by the
/// final component.
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
