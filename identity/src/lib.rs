// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Identity collaborator.
//!
//! The engine never owns user records: it reads profiles and requests balance
//! deltas through [`IdentityProvider`]. [`InMemoryIdentity`] is the reference
//! provider used by the binary and the test suites.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_types::{Cents, UserId, UserSnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unknown user {user_id}")]
    UnknownUser { user_id: UserId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Collector,
    Breaker,
    Moderator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub role: UserRole,
    pub balance: Cents,
}

impl UserProfile {
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            verified: self.verified,
        }
    }
}

/// Field-wise profile mutation. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub verified: Option<bool>,
    pub role: Option<UserRole>,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;
    fn user(&self, id: UserId) -> Option<UserProfile>;
    /// Applies `delta` to the live balance and returns the new balance.
    fn apply_balance_delta(&self, id: UserId, delta: Cents) -> Result<Cents, IdentityError>;
    fn set_fields(&self, id: UserId, patch: ProfilePatch) -> Result<(), IdentityError>;
}

/// In-process provider backed by a keyed map.
pub struct InMemoryIdentity {
    users: RwLock<HashMap<UserId, UserProfile>>,
    current: RwLock<Option<UserId>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.write().insert(profile.id, profile);
    }

    pub fn sign_in(&self, id: UserId) {
        *self.current.write() = Some(id);
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }

    pub fn balance(&self, id: UserId) -> Option<Cents> {
        self.users.read().get(&id).map(|u| u.balance)
    }
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for InMemoryIdentity {
    fn current_user(&self) -> Option<UserProfile> {
        let current = *self.current.read();
        current.and_then(|id| self.users.read().get(&id).cloned())
    }

    fn user(&self, id: UserId) -> Option<UserProfile> {
        self.users.read().get(&id).cloned()
    }

    fn apply_balance_delta(&self, id: UserId, delta: Cents) -> Result<Cents, IdentityError> {
        let mut users = self.users.write();
        let profile = users
            .get_mut(&id)
            .ok_or(IdentityError::UnknownUser { user_id: id })?;
        profile.balance += delta;
        Ok(profile.balance)
    }

    fn set_fields(&self, id: UserId, patch: ProfilePatch) -> Result<(), IdentityError> {
        let mut users = self.users.write();
        let profile = users
            .get_mut(&id)
            .ok_or(IdentityError::UnknownUser { user_id: id })?;
        if let Some(name) = patch.display_name {
            profile.display_name = name;
        }
        if let Some(avatar) = patch.avatar_url {
            profile.avatar_url = avatar;
        }
        if let Some(verified) = patch.verified {
            profile.verified = verified;
        }
        if let Some(role) = patch.role {
            profile.role = role;
        }
        Ok(())
    }
}

/// Convenience constructor for seed/test users.
pub fn profile(id: UserId, name: &str, balance: Cents) -> UserProfile {
    UserProfile {
        id,
        display_name: name.to_string(),
        avatar_url: None,
        verified: false,
        role: UserRole::Collector,
        balance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_delta_round_trips() {
        let identity = InMemoryIdentity::new();
        identity.insert(profile(1, "mara", 10_000));

        assert_eq!(identity.apply_balance_delta(1, -2_500), Ok(7_500));
        assert_eq!(identity.balance(1), Some(7_500));
        assert_eq!(
            identity.apply_balance_delta(99, 1),
            Err(IdentityError::UnknownUser { user_id: 99 })
        );
    }

    #[test]
    fn set_fields_patches_only_requested_fields() {
        let identity = InMemoryIdentity::new();
        identity.insert(profile(1, "mara", 0));

        identity
            .set_fields(
                1,
                ProfilePatch {
                    role: Some(UserRole::Breaker),
                    verified: Some(true),
                    ..ProfilePatch::default()
                },
            )
            .unwrap();

        let user = identity.user(1).unwrap();
        assert_eq!(user.role, UserRole::Breaker);
        assert!(user.verified);
        assert_eq!(user.display_name, "mara");
    }

    #[test]
    fn current_user_follows_sign_in() {
        let identity = InMemoryIdentity::new();
        identity.insert(profile(1, "mara", 0));
        assert!(identity.current_user().is_none());

        identity.sign_in(1);
        assert_eq!(identity.current_user().unwrap().id, 1);

        identity.sign_out();
        assert!(identity.current_user().is_none());
    }
}
