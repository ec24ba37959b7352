//! The group registry: membership and the join-request flow.
//!
//! A group has exactly one owner, who is always a member. Joining is a
//! two-step flow: the candidate places a request, the owner approves it.
//! When the owner leaves, ownership passes to the longest-standing remaining
//! member (insertion order); when the last member leaves, the group is
//! deleted.
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::error::GroupError;

#[derive(Debug, Clone)]
struct GroupEntry {
    owner: String,
    /// Members in join order; the owner is always present.
    members: Vec<String>,
    pending: BTreeSet<String>,
}

/// What happened when a member left a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    OwnershipTransferred { new_owner: String },
    GroupRemoved,
}

/// Groups behind a single `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryGroupRegistry {
    groups: RwLock<BTreeMap<String, GroupEntry>>,
}

impl InMemoryGroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group with `owner` as its only member.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::AlreadyExists`] when the group id is taken.
    pub fn create(&self, group: &str, owner: &str) -> Result<(), GroupError> {
        let mut groups = self.groups.write();

        if groups.contains_key(group) {
            return Err(GroupError::AlreadyExists { group: group.to_string() });
        }

        groups.insert(
            group.to_string(),
            GroupEntry {
                owner: owner.to_string(),
                members: vec![owner.to_string()],
                pending: BTreeSet::new(),
            },
        );

        Ok(())
    }

    #[must_use]
    pub fn exists(&self, group: &str) -> bool {
        self.groups.read().contains_key(group)
    }

    #[must_use]
    pub fn is_owner(&self, user: &str, group: &str) -> bool {
        self.groups.read().get(group).is_some_and(|entry| entry.owner == user)
    }

    #[must_use]
    pub fn is_member(&self, user: &str, group: &str) -> bool {
        self.groups
            .read()
            .get(group)
            .is_some_and(|entry| entry.members.iter().any(|member| member == user))
    }

    #[must_use]
    pub fn owner_of(&self, group: &str) -> Option<String> {
        self.groups.read().get(group).map(|entry| entry.owner.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    /// Places a join request, to be approved by the owner. Re-requesting is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`], [`GroupError::AlreadyOwner`] or
    /// [`GroupError::AlreadyMember`].
    pub fn request_join(&self, user: &str, group: &str) -> Result<(), GroupError> {
        let mut groups = self.groups.write();

        let Some(entry) = groups.get_mut(group) else {
            return Err(GroupError::NotFound { group: group.to_string() });
        };

        if entry.owner == user {
            return Err(GroupError::AlreadyOwner { group: group.to_string() });
        }

        if entry.members.iter().any(|member| member == user) {
            return Err(GroupError::AlreadyMember { group: group.to_string() });
        }

        entry.pending.insert(user.to_string());

        Ok(())
    }

    /// Lists the pending join requests, visible to the owner only.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`] or [`GroupError::NotOwner`].
    pub fn pending_requests(&self, owner: &str, group: &str) -> Result<Vec<String>, GroupError> {
        let groups = self.groups.read();

        let Some(entry) = groups.get(group) else {
            return Err(GroupError::NotFound { group: group.to_string() });
        };

        if entry.owner != owner {
            return Err(GroupError::NotOwner { group: group.to_string() });
        }

        Ok(entry.pending.iter().cloned().collect())
    }

    /// Approves a pending join request, turning the candidate into a member.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`], [`GroupError::NotOwner`],
    /// [`GroupError::UserAlreadyMember`] or [`GroupError::NoPendingRequest`].
    pub fn approve(&self, owner: &str, requested: &str, group: &str) -> Result<(), GroupError> {
        let mut groups = self.groups.write();

        let Some(entry) = groups.get_mut(group) else {
            return Err(GroupError::NotFound { group: group.to_string() });
        };

        if entry.owner != owner {
            return Err(GroupError::NotOwner { group: group.to_string() });
        }

        if entry.members.iter().any(|member| member == requested) {
            return Err(GroupError::UserAlreadyMember {
                user: requested.to_string(),
                group: group.to_string(),
            });
        }

        if !entry.pending.remove(requested) {
            return Err(GroupError::NoPendingRequest {
                user: requested.to_string(),
                group: group.to_string(),
            });
        }

        entry.members.push(requested.to_string());

        Ok(())
    }

    /// Removes `user` from the group, promoting a new owner or deleting the
    /// group as needed.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`] or [`GroupError::NotMember`].
    pub fn leave(&self, user: &str, group: &str) -> Result<LeaveOutcome, GroupError> {
        let mut groups = self.groups.write();

        let Some(entry) = groups.get_mut(group) else {
            return Err(GroupError::NotFound { group: group.to_string() });
        };

        let Some(position) = entry.members.iter().position(|member| member == user) else {
            return Err(GroupError::NotMember { group: group.to_string() });
        };

        let was_owner = entry.owner == user;
        entry.members.remove(position);

        if entry.members.is_empty() {
            groups.remove(group);
            return Ok(LeaveOutcome::GroupRemoved);
        }

        if was_owner {
            entry.owner = entry.members[0].clone();
            return Ok(LeaveOutcome::OwnershipTransferred {
                new_owner: entry.owner.clone(),
            });
        }

        Ok(LeaveOutcome::Left)
    }
}

#[cfg(test)]
mod tests {

    mod the_group_registry {
        use crate::error::GroupError;
        use crate::registry::group::{InMemoryGroupRegistry, LeaveOutcome};

        fn registry_with_members() -> InMemoryGroupRegistry {
            let registry = InMemoryGroupRegistry::new();
            registry.create("g1", "alice").unwrap();
            registry.request_join("bob", "g1").unwrap();
            registry.approve("alice", "bob", "g1").unwrap();
            registry.request_join("carol", "g1").unwrap();
            registry.approve("alice", "carol", "g1").unwrap();
            registry
        }

        #[test]
        fn the_creator_should_be_owner_and_member() {
            let registry = InMemoryGroupRegistry::new();

            registry.create("g1", "alice").unwrap();

            assert!(registry.is_owner("alice", "g1"));
            assert!(registry.is_member("alice", "g1"));
        }

        #[test]
        fn joining_should_require_owner_approval() {
            let registry = InMemoryGroupRegistry::new();
            registry.create("g1", "alice").unwrap();

            registry.request_join("bob", "g1").unwrap();

            assert!(!registry.is_member("bob", "g1"));
            assert_eq!(registry.pending_requests("alice", "g1").unwrap(), vec!["bob"]);

            registry.approve("alice", "bob", "g1").unwrap();

            assert!(registry.is_member("bob", "g1"));
            assert!(registry.pending_requests("alice", "g1").unwrap().is_empty());
        }

        #[test]
        fn only_the_owner_should_see_pending_requests() {
            let registry = registry_with_members();

            assert_eq!(
                registry.pending_requests("bob", "g1"),
                Err(GroupError::NotOwner {
                    group: "g1".to_string()
                })
            );
        }

        #[test]
        fn approving_without_a_pending_request_should_fail() {
            let registry = InMemoryGroupRegistry::new();
            registry.create("g1", "alice").unwrap();

            assert_eq!(
                registry.approve("alice", "bob", "g1"),
                Err(GroupError::NoPendingRequest {
                    user: "bob".to_string(),
                    group: "g1".to_string()
                })
            );
        }

        #[test]
        fn when_the_owner_leaves_the_next_member_in_join_order_should_be_promoted() {
            let registry = registry_with_members();

            let outcome = registry.leave("alice", "g1").unwrap();

            assert_eq!(
                outcome,
                LeaveOutcome::OwnershipTransferred {
                    new_owner: "bob".to_string()
                }
            );
            assert!(registry.is_owner("bob", "g1"));
            assert!(!registry.is_member("alice", "g1"));
        }

        #[test]
        fn when_the_last_member_leaves_the_group_should_be_deleted() {
            let registry = InMemoryGroupRegistry::new();
            registry.create("g1", "alice").unwrap();

            let outcome = registry.leave("alice", "g1").unwrap();

            assert_eq!(outcome, LeaveOutcome::GroupRemoved);
            assert!(!registry.exists("g1"));
        }

        #[test]
        fn a_non_member_leave_should_fail_without_mutating_the_group() {
            let registry = registry_with_members();

            assert_eq!(
                registry.leave("mallory", "g1"),
                Err(GroupError::NotMember {
                    group: "g1".to_string()
                })
            );
            assert!(registry.is_owner("alice", "g1"));
        }

        #[test]
        fn re_creating_an_existing_group_should_fail() {
            let registry = registry_with_members();

            assert_eq!(
                registry.create("g1", "bob"),
                Err(GroupError::AlreadyExists {
                    group: "g1".to_string()
                })
            );
        }
    }
}
