use bimap::BiMap;
use std::collections::HashSet;
use std::fmt::Debug;

use crate::api::cluster_dto::ClusterDto;

/// Name to numeric identity lookup (the system's user database).
pub trait UserResolver: Debug + Send + Sync {
    fn uid_from_name(&self, name: &str) -> Option<u32>;
    fn name_from_uid(&self, uid: u32) -> Option<String>;
}

/// Decides whether a bank account name may appear in a reservation.
pub trait AccountValidator: Debug + Send + Sync {
    fn is_account_valid(&self, name: &str) -> bool;
}

/// User table loaded from the cluster configuration.
///
/// Numeric tokens are accepted as uids directly, as the system lookup does.
#[derive(Debug, Default, Clone)]
pub struct StaticUserResolver {
    users: BiMap<String, u32>,
}

impl StaticUserResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: impl Into<String>, uid: u32) -> Self {
        self.users.insert(name.into(), uid);
        self
    }
}

impl From<&ClusterDto> for StaticUserResolver {
    fn from(dto: &ClusterDto) -> Self {
        dto.users.iter().fold(StaticUserResolver::new(), |resolver, user| resolver.with_user(user.name.clone(), user.uid))
    }
}

impl UserResolver for StaticUserResolver {
    fn uid_from_name(&self, name: &str) -> Option<u32> {
        if let Some(uid) = self.users.get_by_left(name) {
            return Some(*uid);
        }
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            return name.parse().ok();
        }
        None
    }

    fn name_from_uid(&self, uid: u32) -> Option<String> {
        self.users.get_by_right(&uid).cloned()
    }
}

/// Account names known to the accounting database.
///
/// With no accounts configured any well-formed name is accepted.
#[derive(Debug, Default, Clone)]
pub struct KnownAccounts {
    accounts: HashSet<String>,
}

impl KnownAccounts {
    pub fn new<S: Into<String>>(accounts: impl IntoIterator<Item = S>) -> Self {
        KnownAccounts { accounts: accounts.into_iter().map(Into::into).collect() }
    }
}

impl From<&ClusterDto> for KnownAccounts {
    fn from(dto: &ClusterDto) -> Self {
        KnownAccounts::new(dto.accounts.iter().cloned())
    }
}

impl AccountValidator for KnownAccounts {
    fn is_account_valid(&self, name: &str) -> bool {
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ',') {
            return false;
        }
        self.accounts.is_empty() || self.accounts.contains(name)
    }
}
