//! Resource property emission for PROPFIND responses: WebDAV, CalDAV,
//! CardDAV, and CalendarServer properties.

use chrono::{DateTime, Utc};

use kunai_core::config::DavConfig;
use kunai_core::path::{self, ResourceKind, SchedulingBox};
use kunai_rfc::dav::namespace::{CALDAV_NS, CARDDAV_NS, CS_NS, DAV_NS, QName};
use kunai_rfc::dav::parse::propfind::{PropfindRequest, PropfindType};
use kunai_rfc::dav::property::{DavProperty, PropertyValue};
use kunai_service::auth::Effective;
use kunai_service::auth::effective::compose_acl;
use kunai_service::caldav::report::http_date;
use kunai_service::directory::DirectoryUser;
use kunai_service::sync::format_sync_token;
use kunai_store::model::{Addressbook, Calendar};

/// Advertised `C:max-instances`.
const MAX_INSTANCES: i64 = 10_000;
/// Advertised `C:max-attendees-per-instance`.
const MAX_ATTENDEES: i64 = 100;
/// Advertised `C:min-date-time` / `C:max-date-time`.
const MIN_DATE_TIME: &str = "00010101T000000Z";
const MAX_DATE_TIME: &str = "99991231T235959Z";

/// Emission context shared across one PROPFIND.
pub struct PropEmitter<'a> {
    pub prefix: &'a str,
    pub principal: &'a DirectoryUser,
    pub dav: &'a DavConfig,
}

/// How the requester relates to a collection, for ACL emission.
pub struct AclView<'a> {
    pub owner_uid: &'a str,
    /// Present when the requester is not the owner.
    pub non_owner_effective: Option<Effective>,
}

impl PropEmitter<'_> {
    fn principal_href(&self, uid: &str) -> String {
        path::href::principal(self.prefix, uid)
    }

    fn self_principal_href(&self) -> String {
        self.principal_href(&self.principal.uid)
    }

    fn address_set(&self) -> PropertyValue {
        let mut hrefs = Vec::new();
        if let Some(mail) = &self.principal.mail {
            hrefs.push(format!("mailto:{mail}"));
        }
        hrefs.push(self.self_principal_href());
        PropertyValue::HrefSet(hrefs)
    }

    fn resolve(
        &self,
        request: &PropfindRequest,
        defaults: &[QName],
        value_for: impl Fn(&QName) -> Option<PropertyValue>,
    ) -> Vec<DavProperty> {
        let names: Vec<QName> = match &request.kind {
            PropfindType::Prop(names) => names.clone(),
            PropfindType::AllProp | PropfindType::PropName => defaults.to_vec(),
        };
        names
            .into_iter()
            .map(|name| match value_for(&name) {
                Some(value) => DavProperty::with_value(name, value),
                None => DavProperty::not_found(name),
            })
            .collect()
    }

    /// Properties of a calendar collection.
    #[must_use]
    pub fn calendar_collection(
        &self,
        request: &PropfindRequest,
        calendar: &Calendar,
        acl_view: &AclView<'_>,
    ) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("displayname"),
            QName::dav("owner"),
            QName::dav("current-user-principal"),
            QName::dav("sync-token"),
            QName::cs("getctag"),
            QName::dav("supported-report-set"),
            QName::dav("current-user-privilege-set"),
            QName::dav("getlastmodified"),
            QName::caldav("supported-calendar-component-set"),
        ];
        self.resolve(request, &defaults, |name| {
            self.calendar_value(name, calendar, acl_view)
        })
    }

    #[expect(clippy::too_many_lines, reason = "one arm per advertised property")]
    fn calendar_value(
        &self,
        name: &QName,
        calendar: &Calendar,
        acl_view: &AclView<'_>,
    ) -> Option<PropertyValue> {
        match (name.namespace_uri(), name.local_name()) {
            (DAV_NS, "resourcetype") => Some(PropertyValue::ResourceType(vec![
                QName::dav("collection"),
                QName::caldav("calendar"),
            ])),
            (DAV_NS, "displayname") => Some(PropertyValue::Text(
                calendar
                    .display_name
                    .clone()
                    .unwrap_or_else(|| calendar.uri.clone()),
            )),
            (DAV_NS, "owner") => Some(PropertyValue::Href(
                self.principal_href(&calendar.owner_uid),
            )),
            (DAV_NS, "current-user-principal") => {
                Some(PropertyValue::Href(self.self_principal_href()))
            }
            (DAV_NS, "sync-token") | (CS_NS, "getctag") => {
                Some(PropertyValue::Text(format_sync_token(calendar.ctag)))
            }
            (DAV_NS, "getlastmodified") => {
                Some(PropertyValue::Text(http_date(calendar.updated_at)))
            }
            (DAV_NS, "supported-report-set") => Some(PropertyValue::SupportedReports(vec![
                QName::caldav("calendar-query"),
                QName::caldav("calendar-multiget"),
                QName::caldav("free-busy-query"),
                QName::dav("sync-collection"),
            ])),
            (DAV_NS, "acl") => {
                let owner_href = self.principal_href(acl_view.owner_uid);
                let non_owner = acl_view
                    .non_owner_effective
                    .map(|eff| (self.self_principal_href(), eff));
                Some(PropertyValue::Acl(compose_acl(
                    &owner_href,
                    non_owner.as_ref().map(|(href, eff)| (href.as_str(), *eff)),
                )))
            }
            (DAV_NS, "current-user-privilege-set") => {
                Some(PropertyValue::Privileges(match acl_view.non_owner_effective {
                    Some(effective) => effective.privileges(),
                    None => Effective::all().privileges(),
                }))
            }
            (CALDAV_NS, "calendar-description") => {
                calendar.description.clone().map(PropertyValue::Text)
            }
            (CALDAV_NS, "calendar-timezone") => None,
            (CALDAV_NS, "supported-calendar-component-set") => {
                Some(PropertyValue::SupportedComponents(vec![
                    "VEVENT".to_string(),
                    "VTODO".to_string(),
                    "VJOURNAL".to_string(),
                ]))
            }
            (CALDAV_NS, "supported-calendar-data") => Some(PropertyValue::DataTypes(vec![(
                "text/calendar".to_string(),
                "2.0".to_string(),
            )])),
            (CALDAV_NS, "supported-collation-set") => Some(PropertyValue::SupportedCollations(vec![
                "i;ascii-casemap".to_string(),
                "i;octet".to_string(),
                "i;unicode-casemap".to_string(),
            ])),
            (CALDAV_NS, "max-resource-size") => {
                Some(PropertyValue::Integer(
                i64::try_from(self.dav.max_resource_size).unwrap_or(i64::MAX),
            ))
            }
            (CALDAV_NS, "min-date-time") => Some(PropertyValue::Text(MIN_DATE_TIME.to_string())),
            (CALDAV_NS, "max-date-time") => Some(PropertyValue::Text(MAX_DATE_TIME.to_string())),
            (CALDAV_NS, "max-instances") => Some(PropertyValue::Integer(MAX_INSTANCES)),
            (CALDAV_NS, "max-attendees-per-instance") => {
                Some(PropertyValue::Integer(MAX_ATTENDEES))
            }
            (CALDAV_NS, "schedule-inbox-URL") => Some(PropertyValue::Href(path::href::scheduling(
                self.prefix,
                &self.principal.uid,
                SchedulingBox::Inbox,
            ))),
            (CALDAV_NS, "schedule-outbox-URL") => Some(PropertyValue::Href(
                path::href::scheduling(self.prefix, &self.principal.uid, SchedulingBox::Outbox),
            )),
            (CALDAV_NS, "calendar-home-set") => Some(PropertyValue::Href(path::href::home(
                self.prefix,
                ResourceKind::Calendar,
                &self.principal.uid,
            ))),
            (CALDAV_NS, "calendar-user-address-set") => Some(self.address_set()),
            _ => None,
        }
    }

    /// Properties of an address-book collection.
    #[must_use]
    pub fn addressbook_collection(
        &self,
        request: &PropfindRequest,
        addressbook: &Addressbook,
        acl_view: &AclView<'_>,
    ) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("displayname"),
            QName::dav("owner"),
            QName::dav("current-user-principal"),
            QName::dav("sync-token"),
            QName::cs("getctag"),
            QName::dav("supported-report-set"),
            QName::dav("current-user-privilege-set"),
            QName::carddav("supported-address-data"),
        ];
        self.resolve(request, &defaults, |name| {
            self.addressbook_value(name, addressbook, acl_view)
        })
    }

    fn addressbook_value(
        &self,
        name: &QName,
        addressbook: &Addressbook,
        acl_view: &AclView<'_>,
    ) -> Option<PropertyValue> {
        match (name.namespace_uri(), name.local_name()) {
            (DAV_NS, "resourcetype") => Some(PropertyValue::ResourceType(vec![
                QName::dav("collection"),
                QName::carddav("addressbook"),
            ])),
            (DAV_NS, "displayname") => Some(PropertyValue::Text(
                addressbook
                    .display_name
                    .clone()
                    .unwrap_or_else(|| addressbook.uri.clone()),
            )),
            (DAV_NS, "owner") => Some(PropertyValue::Href(
                self.principal_href(&addressbook.owner_uid),
            )),
            (DAV_NS, "current-user-principal") => {
                Some(PropertyValue::Href(self.self_principal_href()))
            }
            (DAV_NS, "sync-token") | (CS_NS, "getctag") => {
                Some(PropertyValue::Text(format_sync_token(addressbook.ctag)))
            }
            (DAV_NS, "getlastmodified") => {
                Some(PropertyValue::Text(http_date(addressbook.updated_at)))
            }
            (DAV_NS, "supported-report-set") => Some(PropertyValue::SupportedReports(vec![
                QName::carddav("addressbook-query"),
                QName::carddav("addressbook-multiget"),
                QName::dav("sync-collection"),
            ])),
            (DAV_NS, "acl") => {
                let owner_href = self.principal_href(acl_view.owner_uid);
                let non_owner = acl_view
                    .non_owner_effective
                    .map(|eff| (self.self_principal_href(), eff));
                Some(PropertyValue::Acl(compose_acl(
                    &owner_href,
                    non_owner.as_ref().map(|(href, eff)| (href.as_str(), *eff)),
                )))
            }
            (DAV_NS, "current-user-privilege-set") => {
                Some(PropertyValue::Privileges(match acl_view.non_owner_effective {
                    Some(effective) => effective.privileges(),
                    None => Effective::all().privileges(),
                }))
            }
            (CARDDAV_NS, "addressbook-description") => {
                addressbook.description.clone().map(PropertyValue::Text)
            }
            (CARDDAV_NS, "supported-address-data") => Some(PropertyValue::DataTypes(vec![
                ("text/vcard".to_string(), "3.0".to_string()),
                ("text/vcard".to_string(), "4.0".to_string()),
            ])),
            (CARDDAV_NS, "max-resource-size") => {
                Some(PropertyValue::Integer(
                i64::try_from(self.dav.max_resource_size).unwrap_or(i64::MAX),
            ))
            }
            _ => None,
        }
    }

    /// Properties of the principal resource.
    #[must_use]
    pub fn principal_resource(&self, request: &PropfindRequest, uid: &str) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("displayname"),
            QName::dav("current-user-principal"),
            QName::dav("principal-URL"),
            QName::caldav("calendar-home-set"),
            QName::carddav("addressbook-home-set"),
            QName::caldav("calendar-user-address-set"),
            QName::caldav("schedule-inbox-URL"),
            QName::caldav("schedule-outbox-URL"),
        ];
        self.resolve(request, &defaults, |name| self.principal_value(name, uid))
    }

    fn principal_value(&self, name: &QName, uid: &str) -> Option<PropertyValue> {
        match (name.namespace_uri(), name.local_name()) {
            (DAV_NS, "resourcetype") => Some(PropertyValue::ResourceType(vec![
                QName::dav("collection"),
                QName::dav("principal"),
            ])),
            (DAV_NS, "displayname") => Some(PropertyValue::Text(
                self.principal
                    .display_name
                    .clone()
                    .unwrap_or_else(|| uid.to_string()),
            )),
            (DAV_NS, "current-user-principal") => {
                Some(PropertyValue::Href(self.self_principal_href()))
            }
            (DAV_NS, "principal-URL") => Some(PropertyValue::Href(self.principal_href(uid))),
            (CALDAV_NS, "calendar-home-set") => Some(PropertyValue::Href(path::href::home(
                self.prefix,
                ResourceKind::Calendar,
                uid,
            ))),
            (CARDDAV_NS, "addressbook-home-set") => Some(PropertyValue::Href(path::href::home(
                self.prefix,
                ResourceKind::Addressbook,
                uid,
            ))),
            (CALDAV_NS, "calendar-user-address-set") => Some(self.address_set()),
            (CALDAV_NS, "schedule-inbox-URL") => Some(PropertyValue::Href(
                path::href::scheduling(self.prefix, uid, SchedulingBox::Inbox),
            )),
            (CALDAV_NS, "schedule-outbox-URL") => Some(PropertyValue::Href(
                path::href::scheduling(self.prefix, uid, SchedulingBox::Outbox),
            )),
            _ => None,
        }
    }

    /// Properties of a calendar or address-book home.
    #[must_use]
    pub fn home_collection(
        &self,
        request: &PropfindRequest,
        kind: ResourceKind,
        owner: &str,
    ) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("displayname"),
            QName::dav("owner"),
            QName::dav("current-user-principal"),
        ];
        self.resolve(request, &defaults, |name| {
            match (name.namespace_uri(), name.local_name()) {
                (DAV_NS, "resourcetype") => {
                    Some(PropertyValue::ResourceType(vec![QName::dav("collection")]))
                }
                (DAV_NS, "displayname") => Some(PropertyValue::Text(match kind {
                    ResourceKind::Calendar => format!("{owner} calendars"),
                    ResourceKind::Addressbook => format!("{owner} address books"),
                })),
                (DAV_NS, "owner") => Some(PropertyValue::Href(self.principal_href(owner))),
                (DAV_NS, "current-user-principal") => {
                    Some(PropertyValue::Href(self.self_principal_href()))
                }
                _ => None,
            }
        })
    }

    /// Properties of a scheduling inbox/outbox.
    #[must_use]
    pub fn scheduling_collection(
        &self,
        request: &PropfindRequest,
        owner: &str,
        bin: SchedulingBox,
    ) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("displayname"),
            QName::dav("owner"),
            QName::dav("current-user-principal"),
        ];
        self.resolve(request, &defaults, |name| {
            match (name.namespace_uri(), name.local_name()) {
                (DAV_NS, "resourcetype") => {
                    let flavour = match bin {
                        SchedulingBox::Inbox => QName::caldav("schedule-inbox"),
                        SchedulingBox::Outbox => QName::caldav("schedule-outbox"),
                    };
                    Some(PropertyValue::ResourceType(vec![
                        QName::dav("collection"),
                        flavour,
                    ]))
                }
                (DAV_NS, "displayname") => Some(PropertyValue::Text(
                    match bin {
                        SchedulingBox::Inbox => "Inbox",
                        SchedulingBox::Outbox => "Outbox",
                    }
                    .to_string(),
                )),
                (DAV_NS, "owner") => Some(PropertyValue::Href(self.principal_href(owner))),
                (DAV_NS, "current-user-principal") => {
                    Some(PropertyValue::Href(self.self_principal_href()))
                }
                _ => None,
            }
        })
    }

    /// Properties of an object in a depth-1 listing or object PROPFIND.
    #[must_use]
    pub fn object_entry(
        &self,
        request: &PropfindRequest,
        kind: ResourceKind,
        etag: &str,
        data: Option<&str>,
        last_modified: DateTime<Utc>,
    ) -> Vec<DavProperty> {
        let defaults = [
            QName::dav("resourcetype"),
            QName::dav("getetag"),
            QName::dav("getcontenttype"),
            QName::dav("getlastmodified"),
        ];
        self.resolve(request, &defaults, |name| {
            match (name.namespace_uri(), name.local_name()) {
                (DAV_NS, "resourcetype") => Some(PropertyValue::Empty),
                (DAV_NS, "getetag") => Some(PropertyValue::Text(format!("\"{etag}\""))),
                (DAV_NS, "getcontenttype") => Some(PropertyValue::Text(
                    match kind {
                        ResourceKind::Calendar => kunai_core::constants::CALENDAR_CONTENT_TYPE,
                        ResourceKind::Addressbook => kunai_core::constants::VCARD_CONTENT_TYPE,
                    }
                    .to_string(),
                )),
                (DAV_NS, "getlastmodified") => Some(PropertyValue::Text(http_date(last_modified))),
                (CALDAV_NS, "calendar-data") if kind == ResourceKind::Calendar => {
                    data.map(|d| PropertyValue::ContentData(d.to_string()))
                }
                (CARDDAV_NS, "address-data") if kind == ResourceKind::Addressbook => {
                    data.map(|d| PropertyValue::ContentData(d.to_string()))
                }
                _ => None,
            }
        })
    }
}
