use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: u32,
    pub token: String,
}

/// Every identity the drawer knows about, with its current token.
///
/// The pool only tracks ids; workers resolve the token here right before
/// painting, so a token refreshed through `insert` takes effect on the next
/// attempt.
#[derive(Debug, Default)]
pub struct CredentialRegistry {
    tokens: RwLock<BTreeMap<u32, String>>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `id` was not known before.
    pub fn insert(&self, id: u32, token: impl Into<String>) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, token.into())
            .is_none()
    }

    pub fn token(&self, id: u32) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn credential(&self, id: u32) -> Option<Credential> {
        self.token(id).map(|token| Credential { id, token })
    }

    pub fn ids(&self) -> Vec<u32> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<u32, String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_new_ids_and_replaces_tokens() {
        let registry = CredentialRegistry::new();
        assert!(registry.insert(7, "t"));
        assert!(!registry.insert(7, "t2"));
        assert!(registry.insert(3, "u"));
        assert_eq!(registry.token(7).as_deref(), Some("t2"));
        assert_eq!(registry.ids(), vec![3, 7]);
        assert_eq!(
            registry.credential(3),
            Some(Credential {
                id: 3,
                token: "u".to_string()
            })
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn clear_forgets_everything() {
        let registry = CredentialRegistry::new();
        registry.insert(1, "a");
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.token(1), None);
        assert!(registry.snapshot().is_empty());
    }
}
