//! The user registry: accounts and live sessions.
//!
//! An account is a username/password pair; a session is the listen address
//! the peer announced in its handshake, present while the user is logged in.
//! The session address is what download replies hand out as the seeder
//! contact point, so logout (explicit or implicit on disconnect) immediately
//! stops a user's files from being offered.
use std::collections::BTreeMap;

use parking_lot::RwLock;
use peergrid_primitives::PeerAddress;

use crate::error::UserError;

#[derive(Debug, Clone)]
struct UserEntry {
    password: String,
    session: Option<PeerAddress>,
}

/// Accounts and sessions behind a single `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryUserRegistry {
    users: RwLock<BTreeMap<String, UserEntry>>,
}

impl InMemoryUserRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new account.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::AlreadyExists`] when the username is taken.
    pub fn register(&self, user: &str, password: &str) -> Result<(), UserError> {
        let mut users = self.users.write();

        if users.contains_key(user) {
            return Err(UserError::AlreadyExists { user: user.to_string() });
        }

        users.insert(
            user.to_string(),
            UserEntry {
                password: password.to_string(),
                session: None,
            },
        );

        Ok(())
    }

    /// Opens a session bound to the peer's announced listen address.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::AlreadyLoggedIn`], [`UserError::UnknownUser`] or
    /// [`UserError::WrongPassword`].
    pub fn login(&self, user: &str, password: &str, address: PeerAddress) -> Result<(), UserError> {
        let mut users = self.users.write();

        let Some(entry) = users.get_mut(user) else {
            return Err(UserError::UnknownUser { user: user.to_string() });
        };

        if entry.session.is_some() {
            return Err(UserError::AlreadyLoggedIn { user: user.to_string() });
        }

        if entry.password != password {
            return Err(UserError::WrongPassword { user: user.to_string() });
        }

        entry.session = Some(address);

        Ok(())
    }

    /// Closes the user's session.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::NotLoggedIn`] when no session is open.
    pub fn logout(&self, user: &str) -> Result<(), UserError> {
        let mut users = self.users.write();

        match users.get_mut(user) {
            Some(entry) if entry.session.is_some() => {
                entry.session = None;
                Ok(())
            }
            _ => Err(UserError::NotLoggedIn { user: user.to_string() }),
        }
    }

    #[must_use]
    pub fn is_user(&self, user: &str) -> bool {
        self.users.read().contains_key(user)
    }

    #[must_use]
    pub fn is_logged_in(&self, user: &str) -> bool {
        self.users.read().get(user).is_some_and(|entry| entry.session.is_some())
    }

    /// The listen address announced at login, while the session is open.
    #[must_use]
    pub fn session_address(&self, user: &str) -> Option<PeerAddress> {
        self.users.read().get(user).and_then(|entry| entry.session)
    }
}
