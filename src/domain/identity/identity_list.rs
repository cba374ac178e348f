//! Account and user lists of a reservation.
//!
//! An expression is a comma separated token list. Plain tokens replace the
//! list, `+name` adds and `-name` removes. Plain and signed tokens can not be
//! mixed. A failing token leaves the list untouched.

use thiserror::Error;

use crate::domain::identity::resolver::{AccountValidator, UserResolver};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityListError {
    #[error("mixed set and +/- tokens in '{0}'")]
    MixedOperations(String),

    #[error("'{0}' could not be resolved")]
    Unresolvable(String),

    #[error("'{0}' is not in the list")]
    NotPresent(String),

    #[error("empty token in '{0}'")]
    EmptyToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListOp {
    Set,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry<T> {
    name: String,
    value: T,
}

/// Ordered list of resolved identities plus its canonical string form.
///
/// Entries keep first-insertion order. The canonical string is rebuilt after
/// every change so both views always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityList<T> {
    entries: Vec<Entry<T>>,
    canonical: String,
}

impl<T> Default for IdentityList<T> {
    fn default() -> Self {
        IdentityList { entries: Vec::new(), canonical: String::new() }
    }
}

pub type AccountList = IdentityList<String>;
pub type UserList = IdentityList<u32>;

impl<T: Clone + PartialEq> IdentityList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `expr`, resolving each token with `resolve`.
    ///
    /// Every token is parsed and resolved before anything changes, and set,
    /// add and remove all run on a copy that replaces `self` only on success.
    pub fn apply<F>(&mut self, expr: &str, resolve: F) -> Result<(), IdentityListError>
    where
        F: Fn(&str) -> Option<T>,
    {
        let tokens = parse_tokens(expr)?;
        let mut resolved = Vec::with_capacity(tokens.len());
        for (op, name) in &tokens {
            let value = resolve(name).ok_or_else(|| IdentityListError::Unresolvable(name.to_string()))?;
            resolved.push((*op, Entry { name: name.to_string(), value }));
        }

        let mut next: Vec<Entry<T>> = if tokens.iter().all(|(op, _)| *op == ListOp::Set) { Vec::new() } else { self.entries.clone() };

        for (op, entry) in resolved {
            match op {
                ListOp::Set | ListOp::Add => {
                    if !next.iter().any(|e| e.value == entry.value) {
                        next.push(entry);
                    }
                }
                ListOp::Remove => {
                    let position = next.iter().position(|e| e.value == entry.value).ok_or_else(|| IdentityListError::NotPresent(entry.name.clone()))?;
                    next.remove(position);
                }
            }
        }

        self.entries = next;
        self.canonical = self.entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(",");
        Ok(())
    }

    pub fn contains(&self, value: &T) -> bool {
        self.entries.iter().any(|e| &e.value == value)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.value)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.entries.first().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comma joined names, `None` when the list is empty.
    pub fn as_canonical(&self) -> Option<&str> {
        if self.canonical.is_empty() { None } else { Some(&self.canonical) }
    }
}

impl AccountList {
    pub fn apply_accounts(&mut self, expr: &str, validator: &dyn AccountValidator) -> Result<(), IdentityListError> {
        self.apply(expr, |name| validator.is_account_valid(name).then(|| name.to_string()))
    }

    pub fn contains_account(&self, account: &str) -> bool {
        self.entries.iter().any(|e| e.value == account)
    }
}

impl UserList {
    pub fn apply_users(&mut self, expr: &str, resolver: &dyn UserResolver) -> Result<(), IdentityListError> {
        self.apply(expr, |name| resolver.uid_from_name(name))
    }
}

fn parse_tokens(expr: &str) -> Result<Vec<(ListOp, &str)>, IdentityListError> {
    let mut tokens = Vec::new();
    for raw in expr.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (op, name) = match raw.as_bytes()[0] {
            b'+' => (ListOp::Add, raw[1..].trim()),
            b'-' => (ListOp::Remove, raw[1..].trim()),
            _ => (ListOp::Set, raw),
        };
        if name.is_empty() {
            return Err(IdentityListError::EmptyToken(expr.to_string()));
        }
        tokens.push((op, name));
    }

    let has_set = tokens.iter().any(|(op, _)| *op == ListOp::Set);
    let has_signed = tokens.iter().any(|(op, _)| *op != ListOp::Set);
    if has_set && has_signed {
        return Err(IdentityListError::MixedOperations(expr.to_string()));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::resolver::{KnownAccounts, StaticUserResolver};

    fn accounts() -> KnownAccounts {
        KnownAccounts::new(["acctA", "acctB", "acctC"])
    }

    #[test]
    fn test_set_replaces_and_dedupes() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA,acctB,acctA", &accounts()).unwrap();
        assert_eq!(list.as_canonical(), Some("acctA,acctB"));

        list.apply_accounts("acctC", &accounts()).unwrap();
        assert_eq!(list.as_canonical(), Some("acctC"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA", &accounts()).unwrap();
        list.apply_accounts("+acctA", &accounts()).unwrap();
        assert_eq!(list.as_canonical(), Some("acctA"));

        list.apply_accounts("+acctB", &accounts()).unwrap();
        assert_eq!(list.as_canonical(), Some("acctA,acctB"));
    }

    #[test]
    fn test_remove_absent_fails_without_mutation() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA,acctB", &accounts()).unwrap();
        let before = list.clone();

        let err = list.apply_accounts("-acctB,-acctC", &accounts()).unwrap_err();
        assert_eq!(err, IdentityListError::NotPresent("acctC".to_string()));
        assert_eq!(list, before);
    }

    #[test]
    fn test_remove_shifts_remaining_entries() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA,acctB,acctC", &accounts()).unwrap();
        list.apply_accounts("-acctA", &accounts()).unwrap();
        assert_eq!(list.as_canonical(), Some("acctB,acctC"));
        assert_eq!(list.first_name(), Some("acctB"));
    }

    #[test]
    fn test_mixed_tokens_rejected_both_ways() {
        let mut list = AccountList::new();
        assert!(matches!(list.apply_accounts("acctA,+acctB", &accounts()), Err(IdentityListError::MixedOperations(_))));
        assert!(matches!(list.apply_accounts("-acctA,acctB", &accounts()), Err(IdentityListError::MixedOperations(_))));
        assert!(list.is_empty());
    }

    #[test]
    fn test_invalid_token_aborts_whole_expression() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA", &accounts()).unwrap();
        assert_eq!(list.apply_accounts("+acctB,+nosuch", &accounts()), Err(IdentityListError::Unresolvable("nosuch".to_string())));
        assert_eq!(list.as_canonical(), Some("acctA"));
    }

    #[test]
    fn test_users_resolve_to_uids() {
        let resolver = StaticUserResolver::new().with_user("alice", 1001).with_user("bob", 1002);
        let mut list = UserList::new();
        list.apply_users("alice,1002", &resolver).unwrap();
        assert!(list.contains(&1001));
        assert!(list.contains(&1002));
        assert_eq!(list.as_canonical(), Some("alice,1002"));

        // same uid under another spelling is a no-op
        list.apply_users("+bob", &resolver).unwrap();
        assert_eq!(list.len(), 2);

        assert!(list.apply_users("+mallory", &resolver).is_err());
    }

    #[test]
    fn test_empty_set_clears() {
        let mut list = AccountList::new();
        list.apply_accounts("acctA", &accounts()).unwrap();
        list.apply_accounts("", &accounts()).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.as_canonical(), None);
    }
}
