//! Parsing of directory group binding attributes into privilege sets.

use std::collections::HashMap;

use super::effective::Effective;
use crate::directory::GroupAclAttrs;

/// ## Summary
/// Applies one privilege token to a set. Tokens are case-insensitive and
/// trimmed; unknown tokens are ignored.
pub fn apply_token(effective: &mut Effective, token: &str) {
    match token.trim().to_ascii_lowercase().as_str() {
        "read" => effective.read = true,
        "edit" | "writeprops" | "write-properties" => effective.write_props = true,
        "write" | "writecontent" | "write-content" => effective.write_content = true,
        "bind" | "create" => effective.bind = true,
        "unbind" | "delete" => effective.unbind = true,
        "unlock" => effective.unlock = true,
        "readacl" | "read-acl" => effective.read_acl = true,
        "readprivs" | "read-current-user-privilege-set" | "read-privileges" => {
            effective.read_current_user_privilege_set = true;
        }
        _ => {}
    }
}

/// Parses one combined binding value: `calendar-id=<uri>;priv=<p1>,<p2>,...`.
#[must_use]
pub fn parse_combined(value: &str) -> Option<(String, Effective)> {
    let mut uri: Option<&str> = None;
    let mut effective = Effective::default();

    for part in value.split(';') {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "calendar-id" => uri = Some(val.trim()),
            "priv" => {
                for token in val.split(',') {
                    apply_token(&mut effective, token);
                }
            }
            _ => {}
        }
    }

    let uri = uri?.to_string();
    if uri.is_empty() {
        return None;
    }
    Some((uri, effective))
}

/// ## Summary
/// Folds one group's binding attributes into per-URI privilege sets. Both
/// directory shapes are accepted: the combined attribute, and the parallel
/// calendar-id/privilege lists (privileges applied uniformly to each URI).
pub fn fold_group(attrs: &GroupAclAttrs, into: &mut HashMap<String, Effective>) {
    for value in &attrs.combined {
        if let Some((uri, effective)) = parse_combined(value) {
            let entry = into.entry(uri).or_default();
            *entry = entry.union(effective);
        }
    }

    if !attrs.calendar_ids.is_empty() {
        let mut uniform = Effective::default();
        for value in &attrs.privileges {
            for token in value.split(',') {
                apply_token(&mut uniform, token);
            }
        }
        for uri in &attrs.calendar_ids {
            let uri = uri.trim();
            if uri.is_empty() {
                continue;
            }
            let entry = into.entry(uri.to_string()).or_default();
            *entry = entry.union(uniform);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_shape() {
        let (uri, eff) = parse_combined("calendar-id=team;priv=read,bind").expect("parses");
        assert_eq!(uri, "team");
        assert!(eff.read);
        assert!(eff.bind);
        assert!(!eff.write_content);
    }

    #[test]
    fn token_aliases_and_case() {
        let (_, eff) =
            parse_combined("calendar-id=x;priv=EDIT, Write-Content ,CREATE,delete,READPRIVS")
                .expect("parses");
        assert!(eff.write_props);
        assert!(eff.write_content);
        assert!(eff.bind);
        assert!(eff.unbind);
        assert!(eff.read_current_user_privilege_set);
    }

    #[test]
    fn unknown_tokens_ignored() {
        let (_, eff) = parse_combined("calendar-id=x;priv=read,fly").expect("parses");
        assert!(eff.read);
        assert!(!eff.write_content);
    }

    #[test]
    fn missing_calendar_id_rejected() {
        assert!(parse_combined("priv=read").is_none());
        assert!(parse_combined("calendar-id=;priv=read").is_none());
    }

    #[test]
    fn parallel_shape_applies_uniformly() {
        let attrs = GroupAclAttrs {
            group_dn: "cn=cal-readers,ou=groups,dc=example".to_string(),
            combined: vec![],
            calendar_ids: vec!["team".to_string(), "ops".to_string()],
            privileges: vec!["read".to_string(), "unlock".to_string()],
        };
        let mut map = HashMap::new();
        fold_group(&attrs, &mut map);
        assert_eq!(map.len(), 2);
        assert!(map["team"].read);
        assert!(map["team"].unlock);
        assert!(map["ops"].read);
    }

    #[test]
    fn groups_union_per_uri() {
        let mut map = HashMap::new();
        fold_group(
            &GroupAclAttrs {
                group_dn: "g1".to_string(),
                combined: vec!["calendar-id=team;priv=read".to_string()],
                ..GroupAclAttrs::default()
            },
            &mut map,
        );
        fold_group(
            &GroupAclAttrs {
                group_dn: "g2".to_string(),
                combined: vec!["calendar-id=team;priv=write,bind,unbind,edit".to_string()],
                ..GroupAclAttrs::default()
            },
            &mut map,
        );
        let eff = map["team"];
        assert!(eff.read);
        assert!(eff.has_full_write());
    }
}
