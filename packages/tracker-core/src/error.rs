//! Core tracker errors.
//!
//! One enum per registry concern. The `Display` form of every variant is the
//! single-line reply sent back to the client, so the session layer can render
//! any failure with `to_string()` and keep the connection open. Clients
//! pattern-match substrings of these lines ("successful", "Failed"), which
//! makes the exact wording part of the compatibility surface.

/// Errors raised by the user registry: account creation and session state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("Username already exists. Please choose a different username.")]
    AlreadyExists { user: String },

    #[error("You are already logged in.")]
    AlreadyLoggedIn { user: String },

    #[error("Your password is wrong.")]
    WrongPassword { user: String },

    #[error("You are not a user. First call create_user command.")]
    UnknownUser { user: String },

    #[error("You are not logged in.")]
    NotLoggedIn { user: String },
}

/// Errors raised by the group registry: membership and the join-request flow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("Group id {group} is already registered.")]
    AlreadyExists { group: String },

    #[error("Group name {group} is not available.")]
    NotFound { group: String },

    #[error("You are already owner of group {group}.")]
    AlreadyOwner { group: String },

    #[error("You are already member of group {group}.")]
    AlreadyMember { group: String },

    #[error("You are not owner of group {group}.")]
    NotOwner { group: String },

    #[error("You are not member of group {group}.")]
    NotMember { group: String },

    #[error("{user} is already member of group {group}.")]
    UserAlreadyMember { user: String, group: String },

    #[error("There is no pending request of {user} in group {group}.")]
    NoPendingRequest { user: String, group: String },
}

/// Errors raised by the file registry: manifests and their seeder sets.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    #[error("File name {file} already exists in group {group}.")]
    AlreadyExists { file: String, group: String },

    #[error("File name {file} does not exist in group {group}.")]
    NotFound { file: String, group: String },

    #[error("File name {file} is not available for download in group {group}, no seeder available.")]
    NoLiveSeeder { file: String, group: String },

    #[error("Failed to stop sharing file name {file} in group {group}.")]
    NotASeeder { file: String, group: String },
}

/// Umbrella over every registry error, produced by the command handlers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Invalid file data. Please try again.")]
    MalformedFileData { reason: String },
}
