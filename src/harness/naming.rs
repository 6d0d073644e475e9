//! Idempotent external object naming.
//!
//! Names look like `<prefix>-[<id>-]<suffix>`. A provider asks its
//! [`NameRegistry`] for a name and gets, in order of preference, one it created
//! earlier, an unmanaged object that already exists, or a freshly created one.

use std::collections::BTreeSet;

use rand::Rng;

use crate::error::Result;

/// Fixed prefix of every generated name.
pub const NAME_PREFIX: &str = "testkit";

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Returns `len` random characters from `[a-z0-9]`.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Returns `<prefix>-` or `<prefix>-<id>-`.
pub fn name_prefix(prefix: &str, id: &str) -> String {
    if id.is_empty() {
        format!("{prefix}-")
    } else {
        format!("{prefix}-{id}-")
    }
}

/// True when `name` is `prefix` followed by a bare suffix.
///
/// `testkit-` does not match `testkit-a-xyz1`, which belongs to ID `a`.
pub fn matches_prefix(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)),
        None => false,
    }
}

/// How a name was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameResolution {
    /// Created earlier by this registry.
    Owned(String),
    /// Found in the external system. Never cleaned up.
    Unmanaged(String),
    /// Created just now and registered for cleanup.
    Created(String),
}

impl NameResolution {
    pub fn name(&self) -> &str {
        match self {
            Self::Owned(n) | Self::Unmanaged(n) | Self::Created(n) => n,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            Self::Owned(n) | Self::Unmanaged(n) | Self::Created(n) => n,
        }
    }
}

/// Names a provider created and must delete at cleanup.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    names: BTreeSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registered name matching `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| matches_prefix(n, prefix))
            .map(String::as_str)
    }

    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reuses or creates an object named `prefix` + a `suffix_len` random suffix.
    ///
    /// `list_unmanaged` is only called when no registered name matches, and
    /// `create` only when neither source has one.
    pub fn resolve<L, C>(
        &mut self,
        prefix: &str,
        suffix_len: usize,
        list_unmanaged: L,
        create: C,
    ) -> Result<NameResolution>
    where
        L: FnOnce() -> Result<Vec<String>>,
        C: FnOnce(&str) -> Result<()>,
    {
        if let Some(name) = self.find(prefix) {
            return Ok(NameResolution::Owned(name.to_string()));
        }

        if let Some(name) = list_unmanaged()?.into_iter().find(|n| matches_prefix(n, prefix)) {
            tracing::info!(name = %name, "reusing unmanaged object");
            return Ok(NameResolution::Unmanaged(name));
        }

        let name = format!("{prefix}{}", random_suffix(suffix_len));
        create(&name)?;
        tracing::info!(name = %name, "created object");
        self.register(name.clone());
        Ok(NameResolution::Created(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[test]
    fn suffix_uses_lowercase_alphanumerics() {
        let suffix = random_suffix(64);
        assert_eq!(suffix.len(), 64);
        assert!(suffix.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn prefix_includes_id_when_set() {
        assert_eq!(name_prefix("testkit", ""), "testkit-");
        assert_eq!(name_prefix("testkit", "db"), "testkit-db-");
    }

    #[test]
    fn prefix_match_excludes_other_ids() {
        assert!(matches_prefix("testkit-abc12", "testkit-"));
        assert!(!matches_prefix("testkit-db-abc12", "testkit-"));
        assert!(matches_prefix("testkit-db-abc12", "testkit-db-"));
        assert!(!matches_prefix("testkit-db-", "testkit-db-"));
        assert!(!matches_prefix("other-abc12", "testkit-"));
    }

    #[test]
    fn created_name_is_reused_without_listing() {
        let mut registry = NameRegistry::new();
        let first = registry
            .resolve("testkit-a-", 5, || Ok(vec![]), |_| Ok(()))
            .unwrap();
        assert!(matches!(first, NameResolution::Created(_)));
        assert!(first.name().starts_with("testkit-a-"));
        assert_eq!(first.name().len(), "testkit-a-".len() + 5);

        let second = registry
            .resolve(
                "testkit-a-",
                5,
                || panic!("must not list"),
                |_| panic!("must not create"),
            )
            .unwrap();
        assert_eq!(second, NameResolution::Owned(first.into_name()));
    }

    #[test]
    fn unmanaged_name_is_reused_but_not_registered() {
        let mut registry = NameRegistry::new();
        let created = Cell::new(false);
        let got = registry
            .resolve(
                "testkit-",
                5,
                || Ok(vec!["kube-system".to_string(), "testkit-zzzzz".to_string()]),
                |_| {
                    created.set(true);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(got, NameResolution::Unmanaged("testkit-zzzzz".to_string()));
        assert!(!created.get());
        assert!(registry.is_empty());
    }

    #[test]
    fn failed_create_registers_nothing() {
        let mut registry = NameRegistry::new();
        let err = registry
            .resolve(
                "testkit-",
                5,
                || Ok(vec![]),
                |_| Err(Error::Precondition("boom".to_string())),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(registry.is_empty());
    }
}
