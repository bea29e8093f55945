//! The effective privilege set and its RFC 3744 projection.

use kunai_rfc::dav::property::{Ace, AcePrincipal, Privilege};

/// Union of the WebDAV privileges a principal holds on a collection.
/// `WriteAcl` is never granted in this implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effective {
    pub read: bool,
    pub write_props: bool,
    pub write_content: bool,
    pub bind: bool,
    pub unbind: bool,
    pub unlock: bool,
    pub read_acl: bool,
    pub read_current_user_privilege_set: bool,
}

impl Effective {
    /// Everything an owner holds.
    #[must_use]
    pub fn all() -> Self {
        Self {
            read: true,
            write_props: true,
            write_content: true,
            bind: true,
            unbind: true,
            unlock: true,
            read_acl: true,
            read_current_user_privilege_set: true,
        }
    }

    /// Bitwise OR with another set.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            read: self.read || other.read,
            write_props: self.write_props || other.write_props,
            write_content: self.write_content || other.write_content,
            bind: self.bind || other.bind,
            unbind: self.unbind || other.unbind,
            unlock: self.unlock || other.unlock,
            read_acl: self.read_acl || other.read_acl,
            read_current_user_privilege_set: self.read_current_user_privilege_set
                || other.read_current_user_privilege_set,
        }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::default()
    }

    /// `DAV:write` may only be advertised as a compound when all four of
    /// its sub-privileges are held.
    #[must_use]
    pub fn has_full_write(self) -> bool {
        self.write_props && self.write_content && self.bind && self.unbind
    }

    /// ## Summary
    /// Projects the set onto the privilege list advertised in
    /// `current-user-privilege-set` and non-owner ACEs:
    /// the `DAV:write` compound when complete, sub-privileges otherwise;
    /// `Read` implies `CALDAV:read-free-busy`;
    /// `read-current-user-privilege-set` is always present.
    #[must_use]
    pub fn privileges(self) -> Vec<Privilege> {
        let mut out = Vec::new();
        if self.read {
            out.push(Privilege::Read);
            out.push(Privilege::ReadFreeBusy);
        }
        if self.has_full_write() {
            out.push(Privilege::Write);
        } else {
            if self.write_props {
                out.push(Privilege::WriteProperties);
            }
            if self.write_content {
                out.push(Privilege::WriteContent);
            }
            if self.bind {
                out.push(Privilege::Bind);
            }
            if self.unbind {
                out.push(Privilege::Unbind);
            }
        }
        if self.unlock {
            out.push(Privilege::Unlock);
        }
        if self.read_acl {
            out.push(Privilege::ReadAcl);
        }
        out.push(Privilege::ReadCurrentUserPrivilegeSet);
        out
    }
}

/// ## Summary
/// Composes the `DAV:acl` value for a collection: the protected owner ACE,
/// plus — on shared mounts — one ACE carrying exactly the privileges the
/// requesting non-owner holds.
#[must_use]
pub fn compose_acl(
    owner_principal_href: &str,
    non_owner: Option<(&str, Effective)>,
) -> Vec<Ace> {
    let mut aces = vec![Ace::owner(owner_principal_href)];
    if let Some((href, effective)) = non_owner {
        if !effective.is_empty() {
            aces.push(Ace {
                principal: AcePrincipal::Href(href.to_string()),
                grant: effective.privileges(),
                protected: false,
            });
        }
    }
    aces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_write_collapses_to_compound() {
        let eff = Effective {
            write_props: true,
            write_content: true,
            bind: true,
            unbind: true,
            ..Effective::default()
        };
        let privs = eff.privileges();
        assert!(privs.contains(&Privilege::Write));
        assert!(!privs.contains(&Privilege::WriteContent));
    }

    #[test]
    fn partial_write_lists_sub_privileges() {
        let eff = Effective {
            write_content: true,
            bind: true,
            ..Effective::default()
        };
        let privs = eff.privileges();
        assert!(!privs.contains(&Privilege::Write));
        assert!(privs.contains(&Privilege::WriteContent));
        assert!(privs.contains(&Privilege::Bind));
        assert!(!privs.contains(&Privilege::Unbind));
    }

    #[test]
    fn read_implies_free_busy() {
        let eff = Effective {
            read: true,
            ..Effective::default()
        };
        let privs = eff.privileges();
        assert!(privs.contains(&Privilege::ReadFreeBusy));
    }

    #[test]
    fn introspection_always_granted() {
        assert!(
            Effective::default()
                .privileges()
                .contains(&Privilege::ReadCurrentUserPrivilegeSet)
        );
    }

    #[test]
    fn acl_omits_empty_non_owner_ace() {
        let aces = compose_acl("/dav/principals/users/alice", Some(("/dav/principals/users/bob", Effective::default())));
        assert_eq!(aces.len(), 1);
        assert!(aces[0].protected);
        assert_eq!(aces[0].grant, vec![Privilege::All]);
    }
}
