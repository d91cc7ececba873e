use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Stable identity of an interacting party, as supplied by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum AccessStoreError {
    #[error("access store lock is poisoned")]
    Poisoned,
    #[error("could not read access list `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse access list `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("could not write access list `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

/// Backing store for the allow list.
pub trait AccessStore: Send + Sync {
    fn contains(&self, user: UserId) -> Result<bool, AccessStoreError>;

    /// Inserts `user` only when the store is empty, atomically. Returns whether the user was
    /// granted bootstrap admin.
    fn try_bootstrap(&self, user: UserId) -> Result<bool, AccessStoreError>;

    fn grant(&self, user: UserId) -> Result<(), AccessStoreError>;

    fn members(&self) -> Result<Vec<UserId>, AccessStoreError>;
}

impl<T> AccessStore for Arc<T>
where
    T: AccessStore + ?Sized,
{
    fn contains(&self, user: UserId) -> Result<bool, AccessStoreError> {
        (**self).contains(user)
    }

    fn try_bootstrap(&self, user: UserId) -> Result<bool, AccessStoreError> {
        (**self).try_bootstrap(user)
    }

    fn grant(&self, user: UserId) -> Result<(), AccessStoreError> {
        (**self).grant(user)
    }

    fn members(&self) -> Result<Vec<UserId>, AccessStoreError> {
        (**self).members()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    members: Mutex<BTreeSet<UserId>>,
}

impl InMemoryAccessStore {
    pub fn with_members(members: impl IntoIterator<Item = UserId>) -> Self {
        Self { members: Mutex::new(members.into_iter().collect()) }
    }
}

impl AccessStore for InMemoryAccessStore {
    fn contains(&self, user: UserId) -> Result<bool, AccessStoreError> {
        let members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        Ok(members.contains(&user))
    }

    fn try_bootstrap(&self, user: UserId) -> Result<bool, AccessStoreError> {
        let mut members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        if !members.is_empty() {
            return Ok(false);
        }
        members.insert(user);
        Ok(true)
    }

    fn grant(&self, user: UserId) -> Result<(), AccessStoreError> {
        let mut members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        members.insert(user);
        Ok(())
    }

    fn members(&self) -> Result<Vec<UserId>, AccessStoreError> {
        let members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        Ok(members.iter().copied().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccessFile {
    members: BTreeSet<UserId>,
}

/// JSON-file allow list. Every mutation is written through before the lock is released.
#[derive(Debug)]
pub struct FileAccessStore {
    path: PathBuf,
    members: Mutex<BTreeSet<UserId>>,
}

impl FileAccessStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AccessStoreError> {
        let path = path.into();
        let members = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|source| AccessStoreError::Read { path: path.clone(), source })?;
            if raw.trim().is_empty() {
                BTreeSet::new()
            } else {
                serde_json::from_str::<AccessFile>(&raw)
                    .map_err(|source| AccessStoreError::Parse { path: path.clone(), source })?
                    .members
            }
        } else {
            BTreeSet::new()
        };
        Ok(Self { path, members: Mutex::new(members) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes and removes the staging file, so a missing or read-only directory surfaces at
    /// startup instead of on the first bootstrap.
    pub fn ensure_writable(&self) -> Result<(), AccessStoreError> {
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, b"")
            .and_then(|()| fs::remove_file(&staging))
            .map_err(|source| AccessStoreError::Write { path: self.path.clone(), source })
    }

    fn persist(&self, members: &BTreeSet<UserId>) -> Result<(), AccessStoreError> {
        let payload = AccessFile { members: members.clone() };
        let raw = serde_json::to_string_pretty(&payload)
            .map_err(|source| AccessStoreError::Parse { path: self.path.clone(), source })?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, raw)
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|source| AccessStoreError::Write { path: self.path.clone(), source })
    }
}

impl AccessStore for FileAccessStore {
    fn contains(&self, user: UserId) -> Result<bool, AccessStoreError> {
        let members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        Ok(members.contains(&user))
    }

    fn try_bootstrap(&self, user: UserId) -> Result<bool, AccessStoreError> {
        let mut members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        if !members.is_empty() {
            return Ok(false);
        }
        let mut next = members.clone();
        next.insert(user);
        self.persist(&next)?;
        *members = next;
        Ok(true)
    }

    fn grant(&self, user: UserId) -> Result<(), AccessStoreError> {
        let mut members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        if members.contains(&user) {
            return Ok(());
        }
        let mut next = members.clone();
        next.insert(user);
        self.persist(&next)?;
        *members = next;
        Ok(())
    }

    fn members(&self) -> Result<Vec<UserId>, AccessStoreError> {
        let members = self.members.lock().map_err(|_| AccessStoreError::Poisoned)?;
        Ok(members.iter().copied().collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Bootstrapped,
    Allowed,
    Denied,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Trust-on-first-use gate in front of every conversation step.
pub struct AccessGate<S> {
    store: S,
}

impl<S> AccessGate<S>
where
    S: AccessStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn check(&self, user: UserId) -> Result<AccessDecision, AccessStoreError> {
        if self.store.try_bootstrap(user)? {
            warn!(
                event_name = "access.bootstrap_admin_granted",
                correlation_id = "access",
                user_id = user.0,
                "first user registered as administrator"
            );
            return Ok(AccessDecision::Bootstrapped);
        }

        if self.store.contains(user)? {
            Ok(AccessDecision::Allowed)
        } else {
            info!(
                event_name = "access.denied",
                correlation_id = "access",
                user_id = user.0,
                "user is not on the allow list"
            );
            Ok(AccessDecision::Denied)
        }
    }
}
