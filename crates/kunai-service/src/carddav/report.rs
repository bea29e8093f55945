//! The CardDAV REPORT engine: addressbook-query filtering,
//! addressbook-multiget, and sync-collection.

use kunai_core::path::{self, CollectionRef, DavPath};
use kunai_rfc::dav::multistatus::{Multistatus, Propstat, PropstatResponse};
use kunai_rfc::dav::namespace::QName;
use kunai_rfc::dav::property::{DavProperty, PropertyValue};
use kunai_rfc::dav::report::{AddressbookQuery, MatchType, Multiget, PropFilter, SyncCollection};
use kunai_rfc::vcard::{Card, parse_cards};
use kunai_store::Store;
use kunai_store::model::Addressbook;

use crate::caldav::report::http_date;
use crate::error::ServiceResult;
use crate::sync::{format_sync_token, parse_sync_token};

fn contact_properties(
    requested: &[QName],
    etag: &str,
    data: Option<&str>,
    last_modified: chrono::DateTime<chrono::Utc>,
) -> Vec<DavProperty> {
    let default_names = [QName::dav("getetag"), QName::carddav("address-data")];
    let names: &[QName] = if requested.is_empty() {
        &default_names
    } else {
        requested
    };

    names
        .iter()
        .map(|name| match (name.namespace_uri(), name.local_name()) {
            ("DAV:", "getetag") => DavProperty::text(name.clone(), format!("\"{etag}\"")),
            ("DAV:", "getcontenttype") => {
                DavProperty::text(name.clone(), kunai_core::constants::VCARD_CONTENT_TYPE)
            }
            ("DAV:", "getlastmodified") => DavProperty::text(name.clone(), http_date(last_modified)),
            (kunai_rfc::dav::CARDDAV_NS, "address-data") => data.map_or_else(
                || DavProperty::not_found(name.clone()),
                |payload| {
                    DavProperty::with_value(
                        name.clone(),
                        PropertyValue::ContentData(payload.to_string()),
                    )
                },
            ),
            _ => DavProperty::not_found(name.clone()),
        })
        .collect()
}

fn text_matches(value: &str, filter: &kunai_rfc::dav::report::TextMatch) -> bool {
    // i;octet compares bytes; the casemap collations fold case.
    let (haystack, needle) = if filter.collation == "i;octet" {
        (value.to_string(), filter.value.clone())
    } else {
        (value.to_lowercase(), filter.value.to_lowercase())
    };
    let hit = match filter.match_type {
        MatchType::Contains => haystack.contains(&needle),
        MatchType::Equals => haystack == needle,
        MatchType::StartsWith => haystack.starts_with(&needle),
        MatchType::EndsWith => haystack.ends_with(&needle),
    };
    hit != filter.negate
}

fn prop_filter_matches(card: &Card, filter: &PropFilter) -> bool {
    let present = card.values_named(&filter.name).next().is_some();
    if filter.is_not_defined {
        return !present;
    }
    if !present {
        return false;
    }
    if let Some(ref text_match) = filter.text_match {
        if !card.values_named(&filter.name).any(|v| text_matches(v, text_match)) {
            return false;
        }
    }
    for param_filter in &filter.param_filters {
        let has_param = card
            .properties
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(&filter.name))
            .any(|p| p.param(&param_filter.name).is_some());
        if has_param == param_filter.is_not_defined {
            return false;
        }
    }
    true
}

/// ## Summary
/// Whether a card satisfies the query's prop-filters under anyof/allof
/// semantics. An empty filter list matches everything.
#[must_use]
pub fn card_matches(card: &Card, filters: &[PropFilter], any_of: bool) -> bool {
    if filters.is_empty() {
        return true;
    }
    if any_of {
        filters.iter().any(|f| prop_filter_matches(card, f))
    } else {
        filters.iter().all(|f| prop_filter_matches(card, f))
    }
}

/// Shared inputs of the report executors.
pub struct ReportContext<'a> {
    pub store: &'a dyn Store,
    pub base_prefix: &'a str,
    pub collection: &'a CollectionRef,
}

/// ## Summary
/// Executes an addressbook-query over stored contacts.
///
/// ## Errors
/// Propagates store failures; unparseable stored cards are skipped.
pub async fn addressbook_query(
    ctx: &ReportContext<'_>,
    addressbook: &Addressbook,
    query: &AddressbookQuery,
) -> ServiceResult<Multistatus> {
    let contacts = ctx.store.list_contacts(addressbook.id).await?;

    let mut responses = Vec::new();
    for contact in &contacts {
        if let Some(limit) = query.limit {
            if responses.len() >= limit as usize {
                break;
            }
        }
        let Ok(cards) = parse_cards(&contact.data) else {
            tracing::warn!(uid = %contact.uid, "stored contact no longer parses, skipping");
            continue;
        };
        if !cards
            .iter()
            .any(|card| card_matches(card, &query.prop_filters, query.any_of))
        {
            continue;
        }
        let href = path::href::object(ctx.base_prefix, ctx.collection, &contact.uid);
        responses.push(PropstatResponse::with_propstat(
            href,
            Propstat::ok(contact_properties(
                &query.properties,
                &contact.etag,
                Some(&contact.data),
                contact.updated_at,
            )),
        ));
    }

    Ok(Multistatus::new(responses))
}

/// ## Summary
/// Executes an addressbook-multiget; each href resolves independently and
/// misses yield per-resource 404s.
///
/// ## Errors
/// Propagates store failures.
pub async fn addressbook_multiget(
    store: &dyn Store,
    base_prefix: &str,
    multiget: &Multiget,
) -> ServiceResult<Multistatus> {
    let mut responses = Vec::new();

    for href in &multiget.hrefs {
        let Ok(DavPath::Object { collection, uid }) = path::parse(base_prefix, href) else {
            responses.push(PropstatResponse::gone(href.clone()));
            continue;
        };
        let Some(addressbook) = super::resolve_addressbook(store, &collection).await? else {
            responses.push(PropstatResponse::gone(href.clone()));
            continue;
        };
        match store.get_contact(addressbook.id, &uid).await? {
            Some(contact) => responses.push(PropstatResponse::with_propstat(
                href.clone(),
                Propstat::ok(contact_properties(
                    &multiget.properties,
                    &contact.etag,
                    Some(&contact.data),
                    contact.updated_at,
                )),
            )),
            None => responses.push(PropstatResponse::gone(href.clone())),
        }
    }

    Ok(Multistatus::new(responses))
}

/// ## Summary
/// Executes a sync-collection report for an address book; same token and
/// paging semantics as the calendar variant.
///
/// ## Errors
/// Propagates store failures.
pub async fn sync_collection(
    ctx: &ReportContext<'_>,
    addressbook: &Addressbook,
    request: &SyncCollection,
) -> ServiceResult<Multistatus> {
    let since = parse_sync_token(&request.sync_token);
    let page = ctx
        .store
        .list_changes_since(addressbook.id, since, request.limit.map(|l| l as usize))
        .await?;

    let mut responses = Vec::new();
    for change in &page.changes {
        let href = path::href::object(ctx.base_prefix, ctx.collection, &change.uid);
        if change.deleted {
            responses.push(PropstatResponse::gone(href));
            continue;
        }
        match ctx.store.get_contact(addressbook.id, &change.uid).await? {
            Some(contact) => responses.push(PropstatResponse::with_propstat(
                href,
                Propstat::ok(contact_properties(
                    &request.properties,
                    &contact.etag,
                    Some(&contact.data),
                    contact.updated_at,
                )),
            )),
            None => responses.push(PropstatResponse::gone(href)),
        }
    }

    let token_seq = if page.truncated {
        page.changes.last().map_or(page.current_seq, |c| c.seq)
    } else {
        page.current_seq
    };

    let mut multistatus = Multistatus::new(responses);
    multistatus.sync_token = Some(format_sync_token(token_seq));
    multistatus.matches_within_limits = page.truncated;
    Ok(multistatus)
}
