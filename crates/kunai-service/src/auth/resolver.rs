//! The cached effective-privilege resolver.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::binding;
use super::effective::Effective;
use crate::directory::{Directory, DirectoryUser};
use crate::error::ServiceResult;

struct CacheEntry {
    fetched_at: Instant,
    bindings: Arc<HashMap<String, Effective>>,
}

/// Resolves a user's effective privileges per collection URI from
/// directory group bindings, with a short-TTL cache keyed by user DN.
/// Entries are value-typed and replaced atomically; the cache is never
/// the basis of correctness.
pub struct AclResolver {
    directory: Arc<dyn Directory>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl AclResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, ttl: Duration) -> Self {
        Self {
            directory,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// ## Summary
    /// The per-URI privilege map for a user, from cache when fresh.
    ///
    /// ## Errors
    /// Propagates directory failures; cache misses hit the directory.
    pub async fn bindings_for(
        &self,
        user: &DirectoryUser,
    ) -> ServiceResult<Arc<HashMap<String, Effective>>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = cache.get(&user.dn) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.bindings));
                }
            }
        }

        let groups = self.directory.user_groups_acl(&user.dn).await?;
        let mut map = HashMap::new();
        for group in &groups {
            binding::fold_group(group, &mut map);
        }
        let bindings = Arc::new(map);

        tracing::debug!(
            user_dn = %user.dn,
            groups = groups.len(),
            uris = bindings.len(),
            "refreshed ACL bindings"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            user.dn.clone(),
            CacheEntry {
                fetched_at: Instant::now(),
                bindings: Arc::clone(&bindings),
            },
        );
        Ok(bindings)
    }

    /// ## Summary
    /// The effective privilege set for one collection URI; empty when no
    /// group binding matches.
    ///
    /// ## Errors
    /// Propagates directory failures.
    pub async fn effective(&self, user: &DirectoryUser, uri: &str) -> ServiceResult<Effective> {
        let bindings = self.bindings_for(user).await?;
        Ok(bindings.get(uri).copied().unwrap_or_default())
    }

    /// ## Summary
    /// Every collection URI the user holds any privilege on, with the
    /// granted set.
    ///
    /// ## Errors
    /// Propagates directory failures.
    pub async fn visible_collections(
        &self,
        user: &DirectoryUser,
    ) -> ServiceResult<HashMap<String, Effective>> {
        let bindings = self.bindings_for(user).await?;
        Ok(bindings
            .iter()
            .filter(|(_, eff)| !eff.is_empty())
            .map(|(uri, eff)| (uri.clone(), *eff))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{GroupAclAttrs, StaticDirectory};

    fn user() -> DirectoryUser {
        DirectoryUser::new("bob", "uid=bob,ou=users,dc=example", Some("bob@example.com"))
    }

    fn directory_with_binding() -> Arc<StaticDirectory> {
        let directory = StaticDirectory::new();
        directory.add_user(user(), "pw");
        directory.add_binding(
            "uid=bob,ou=users,dc=example",
            GroupAclAttrs {
                group_dn: "cn=team,ou=groups,dc=example".to_string(),
                combined: vec!["calendar-id=team;priv=read,bind".to_string()],
                ..GroupAclAttrs::default()
            },
        );
        Arc::new(directory)
    }

    #[tokio::test]
    async fn resolves_effective_for_bound_uri() {
        let resolver = AclResolver::new(directory_with_binding(), Duration::from_secs(60));
        let eff = resolver.effective(&user(), "team").await.expect("resolve");
        assert!(eff.read);
        assert!(eff.bind);
        assert!(!eff.unbind);

        let none = resolver.effective(&user(), "other").await.expect("resolve");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn visible_collections_lists_bound_uris() {
        let resolver = AclResolver::new(directory_with_binding(), Duration::from_secs(60));
        let visible = resolver.visible_collections(&user()).await.expect("resolve");
        assert_eq!(visible.len(), 1);
        assert!(visible.contains_key("team"));
    }

    #[tokio::test]
    async fn cache_serves_within_ttl() {
        let directory = directory_with_binding();
        let resolver = AclResolver::new(Arc::clone(&directory) as Arc<dyn Directory>, Duration::from_secs(60));

        let first = resolver.bindings_for(&user()).await.expect("first");
        // A binding added after the first resolution is invisible until
        // the TTL expires.
        directory.add_binding(
            "uid=bob,ou=users,dc=example",
            GroupAclAttrs {
                group_dn: "g2".to_string(),
                combined: vec!["calendar-id=late;priv=read".to_string()],
                ..GroupAclAttrs::default()
            },
        );
        let second = resolver.bindings_for(&user()).await.expect("second");
        assert!(Arc::ptr_eq(&first, &second));

        // A zero-TTL resolver sees it immediately.
        let fresh = AclResolver::new(directory as Arc<dyn Directory>, Duration::ZERO);
        let third = fresh.bindings_for(&user()).await.expect("third");
        assert!(third.contains_key("late"));
    }
}
