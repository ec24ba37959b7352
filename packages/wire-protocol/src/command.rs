//! The client command set.
//!
//! Commands travel as space-tokenized, newline-terminated ASCII lines. They
//! are decoded once, at the protocol boundary, into [`Command`] so the
//! handler layer can match exhaustively instead of re-counting tokens at
//! every call site.
use peergrid_primitives::PeerAddress;

/// A command a client can issue against its tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { user: String, pass: String },
    CreateUser { user: String, pass: String },
    /// The username is optional: inside an authenticated session the tracker
    /// already knows who is logging out.
    Logout { user: Option<String> },
    CreateGroup { group: String },
    ListGroups,
    JoinGroup { group: String },
    LeaveGroup { group: String },
    ListRequests { group: String },
    AcceptRequest { group: String, user: String },
    ListFiles { group: String },
    UploadFile { group: String, path: String },
    /// Phase 2 of an upload; the manifest arrives serialized after the
    /// command word, inside a length-prefixed frame.
    UploadFileData { manifest: String },
    DownloadFile { group: String, file: String },
    UpdateFileInfo { group: String, file: String, new_path: String },
    StopShare { group: String, file: String },
    Exit,
}

/// Error answering a malformed command line. The connection stays open; the
/// display form is the single-line usage reply sent back to the client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("Invalid command. Please try again.")]
    Empty,

    #[error("Please, Enter valid command.")]
    Unknown { command: String },

    #[error("Usage: {usage}")]
    WrongArity { usage: &'static str },
}

impl Command {
    /// Decodes one command line.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseCommandError`] whose display form is the usage reply
    /// for the offending command.
    pub fn parse(line: &str) -> Result<Self, ParseCommandError> {
        let line = line.trim();
        let mut tokens = line.split_whitespace();

        let Some(command) = tokens.next() else {
            return Err(ParseCommandError::Empty);
        };

        let rest: Vec<&str> = tokens.collect();

        match command {
            "login" => match rest.as_slice() {
                [user, pass] => Ok(Self::Login {
                    user: (*user).to_string(),
                    pass: (*pass).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "login <username> <password>",
                }),
            },
            "create_user" => match rest.as_slice() {
                [user, pass] => Ok(Self::CreateUser {
                    user: (*user).to_string(),
                    pass: (*pass).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "create_user <username> <password>",
                }),
            },
            "logout" => match rest.as_slice() {
                [] => Ok(Self::Logout { user: None }),
                [user] => Ok(Self::Logout {
                    user: Some((*user).to_string()),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "logout [<username>]" }),
            },
            "create_group" => match rest.as_slice() {
                [group] => Ok(Self::CreateGroup {
                    group: (*group).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "create_group <group_id>" }),
            },
            "list_groups" => Ok(Self::ListGroups),
            "join_group" => match rest.as_slice() {
                [group] => Ok(Self::JoinGroup {
                    group: (*group).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "join_group <group_id>" }),
            },
            "leave_group" => match rest.as_slice() {
                [group] => Ok(Self::LeaveGroup {
                    group: (*group).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "leave_group <group_id>" }),
            },
            "list_requests" => match rest.as_slice() {
                [group] => Ok(Self::ListRequests {
                    group: (*group).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "list_requests <group_id>" }),
            },
            "accept_request" => match rest.as_slice() {
                [group, user] => Ok(Self::AcceptRequest {
                    group: (*group).to_string(),
                    user: (*user).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "accept_request <group_id> <user_id>",
                }),
            },
            "list_files" => match rest.as_slice() {
                [group] => Ok(Self::ListFiles {
                    group: (*group).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity { usage: "list_files <group_id>" }),
            },
            "upload_file" => match rest.as_slice() {
                [group, path] => Ok(Self::UploadFile {
                    group: (*group).to_string(),
                    path: (*path).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "upload_file <group_id> <file_path>",
                }),
            },
            "upload_file_data" => {
                let manifest = line
                    .strip_prefix("upload_file_data")
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if manifest.is_empty() {
                    return Err(ParseCommandError::WrongArity {
                        usage: "upload_file_data <manifest>",
                    });
                }
                Ok(Self::UploadFileData { manifest })
            }
            "download_file" => match rest.as_slice() {
                [group, file] => Ok(Self::DownloadFile {
                    group: (*group).to_string(),
                    file: (*file).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "download_file <group_id> <file_name>",
                }),
            },
            "update_file_info" => match rest.as_slice() {
                [group, file, new_path] => Ok(Self::UpdateFileInfo {
                    group: (*group).to_string(),
                    file: (*file).to_string(),
                    new_path: (*new_path).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "update_file_info <group_id> <file_name> <new_file_path>",
                }),
            },
            "stop_share" => match rest.as_slice() {
                [group, file] => Ok(Self::StopShare {
                    group: (*group).to_string(),
                    file: (*file).to_string(),
                }),
                _ => Err(ParseCommandError::WrongArity {
                    usage: "stop_share <group_id> <file_name>",
                }),
            },
            "exit" => Ok(Self::Exit),
            other => Err(ParseCommandError::Unknown {
                command: other.to_string(),
            }),
        }
    }
}

/// The first message on an inbound tracker connection, which decides whether
/// the connection is a client session or a replication envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstMessage {
    /// A client handshake: `<ip>  <port>`, the address the peer listens on.
    Handshake(PeerAddress),
    /// A sibling tracker announcing a replication envelope of `n` bytes.
    SyncSize(u64),
}

impl FirstMessage {
    /// Decodes the first line of an inbound connection.
    ///
    /// # Errors
    ///
    /// Returns [`ParseCommandError::Empty`] when the line matches neither
    /// shape.
    pub fn parse(line: &str) -> Result<Self, ParseCommandError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.as_slice() {
            ["SYNC_SIZE", len] => len
                .parse::<u64>()
                .map(Self::SyncSize)
                .map_err(|_| ParseCommandError::Empty),
            [ip, port] => {
                let addr = format!("{ip}:{port}").parse::<PeerAddress>().map_err(|_| ParseCommandError::Empty)?;
                Ok(Self::Handshake(addr))
            }
            _ => Err(ParseCommandError::Empty),
        }
    }
}
