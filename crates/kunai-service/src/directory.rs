//! The directory seam.
//!
//! Users, groups, and per-group privilege bindings live in an external
//! directory service; kunai consumes it through [`Directory`]. Credential
//! verification (simple bind, token introspection) happens behind the
//! trait as well. [`StaticDirectory`] is the fixture implementation used
//! by tests and the standalone deployment.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};

/// A directory-sourced principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub uid: String,
    pub dn: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
}

impl DirectoryUser {
    #[must_use]
    pub fn new(uid: &str, dn: &str, mail: Option<&str>) -> Self {
        Self {
            uid: uid.to_string(),
            dn: dn.to_string(),
            display_name: None,
            mail: mail.map(str::to_string),
        }
    }
}

/// Raw binding attributes of one group that matched the user.
///
/// Two directory shapes are accepted: a single multi-valued attribute of
/// `calendar-id=<uri>;priv=<p1>,<p2>,...` values, or two parallel
/// attributes (a calendar-id list plus a privilege list applied
/// uniformly).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupAclAttrs {
    pub group_dn: String,
    pub combined: Vec<String>,
    pub calendar_ids: Vec<String>,
    pub privileges: Vec<String>,
}

/// A directory-backed read-only address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAddressbook {
    /// URI carrying the reserved `ldap_` prefix.
    pub uri: String,
    pub display_name: String,
}

/// A contact sourced from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryContact {
    pub uid: String,
    pub data: String,
    pub etag: String,
}

/// The consumed directory interface.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Verifies credentials; `None` means the bind was rejected.
    async fn bind_user(&self, username: &str, password: &str)
    -> ServiceResult<Option<DirectoryUser>>;

    /// Resolves a bearer token to a user; `None` for unknown tokens.
    async fn introspect_token(&self, token: &str) -> ServiceResult<Option<DirectoryUser>>;

    /// Looks a user up by an attribute such as `uid` or `mail`.
    async fn lookup_user_by_attr(
        &self,
        attr: &str,
        value: &str,
    ) -> ServiceResult<Option<DirectoryUser>>;

    /// Binding attributes of every group the user belongs to,
    /// transitively.
    async fn user_groups_acl(&self, user_dn: &str) -> ServiceResult<Vec<GroupAclAttrs>>;

    /// Directory-backed address books.
    async fn list_addressbooks(&self) -> ServiceResult<Vec<DirectoryAddressbook>>;

    async fn list_contacts(&self, book_uri: &str) -> ServiceResult<Vec<DirectoryContact>>;

    async fn get_contact(
        &self,
        book_uri: &str,
        uid: &str,
    ) -> ServiceResult<Option<DirectoryContact>>;
}

#[derive(Default)]
struct StaticTables {
    users: Vec<(DirectoryUser, String)>,
    tokens: HashMap<String, String>,
    bindings: HashMap<String, Vec<GroupAclAttrs>>,
    books: Vec<DirectoryAddressbook>,
    contacts: HashMap<String, Vec<DirectoryContact>>,
}

/// Fixture directory with a fixed user/group population.
#[derive(Default)]
pub struct StaticDirectory {
    tables: RwLock<StaticTables>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StaticTables> {
        self.tables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StaticTables> {
        self.tables
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_user(&self, user: DirectoryUser, password: &str) {
        self.write().users.push((user, password.to_string()));
    }

    pub fn add_token(&self, token: &str, uid: &str) {
        self.write().tokens.insert(token.to_string(), uid.to_string());
    }

    /// Attaches group binding attributes to a user DN.
    pub fn add_binding(&self, user_dn: &str, attrs: GroupAclAttrs) {
        self.write()
            .bindings
            .entry(user_dn.to_string())
            .or_default()
            .push(attrs);
    }

    pub fn add_addressbook(&self, book: DirectoryAddressbook, contacts: Vec<DirectoryContact>) {
        let mut tables = self.write();
        tables.contacts.insert(book.uri.clone(), contacts);
        tables.books.push(book);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn bind_user(
        &self,
        username: &str,
        password: &str,
    ) -> ServiceResult<Option<DirectoryUser>> {
        let tables = self.read();
        Ok(tables
            .users
            .iter()
            .find(|(u, p)| u.uid == username && p == password)
            .map(|(u, _)| u.clone()))
    }

    async fn introspect_token(&self, token: &str) -> ServiceResult<Option<DirectoryUser>> {
        let tables = self.read();
        let Some(uid) = tables.tokens.get(token) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .iter()
            .find(|(u, _)| &u.uid == uid)
            .map(|(u, _)| u.clone()))
    }

    async fn lookup_user_by_attr(
        &self,
        attr: &str,
        value: &str,
    ) -> ServiceResult<Option<DirectoryUser>> {
        let tables = self.read();
        let found = tables.users.iter().map(|(u, _)| u).find(|u| match attr {
            "uid" => u.uid == value,
            "mail" => u.mail.as_deref() == Some(value),
            "dn" => u.dn == value,
            _ => false,
        });
        if found.is_none() && !matches!(attr, "uid" | "mail" | "dn") {
            return Err(ServiceError::Directory(format!("unknown attribute {attr}")));
        }
        Ok(found.cloned())
    }

    async fn user_groups_acl(&self, user_dn: &str) -> ServiceResult<Vec<GroupAclAttrs>> {
        let tables = self.read();
        Ok(tables.bindings.get(user_dn).cloned().unwrap_or_default())
    }

    async fn list_addressbooks(&self) -> ServiceResult<Vec<DirectoryAddressbook>> {
        Ok(self.read().books.clone())
    }

    async fn list_contacts(&self, book_uri: &str) -> ServiceResult<Vec<DirectoryContact>> {
        Ok(self
            .read()
            .contacts
            .get(book_uri)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_contact(
        &self,
        book_uri: &str,
        uid: &str,
    ) -> ServiceResult<Option<DirectoryContact>> {
        Ok(self
            .read()
            .contacts
            .get(book_uri)
            .and_then(|contacts| contacts.iter().find(|c| c.uid == uid))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_lookup() {
        let directory = StaticDirectory::new();
        directory.add_user(
            DirectoryUser::new("alice", "uid=alice,ou=users,dc=example", Some("alice@example.com")),
            "secret",
        );

        assert!(
            directory
                .bind_user("alice", "secret")
                .await
                .expect("bind")
                .is_some()
        );
        assert!(
            directory
                .bind_user("alice", "wrong")
                .await
                .expect("bind")
                .is_none()
        );
        let by_mail = directory
            .lookup_user_by_attr("mail", "alice@example.com")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(by_mail.uid, "alice");
    }
}
