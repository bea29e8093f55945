//! End-to-end tests driving the salvo service over the in-memory store
//! and a static directory fixture.

use std::sync::Arc;

use salvo::Service;
use salvo::http::header::HeaderName;
use salvo::http::{Method, ReqBody, StatusCode};
use salvo::test::{RequestBuilder, ResponseExt, TestClient};

use kunai_app::app::routes;
use kunai_app::state::AppState;
use kunai_core::config::{AuthConfig, DavConfig, LoggingConfig, ServerConfig, Settings};
use kunai_service::directory::{DirectoryUser, GroupAclAttrs, StaticDirectory};
use kunai_store::memory::new_calendar;
use kunai_store::{MemoryStore, Store};

fn settings() -> Settings {
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5232,
            base_prefix: "/dav".to_string(),
        },
        dav: DavConfig {
            max_resource_size: 1_048_576,
            timezone: "UTC".to_string(),
            scheduling_retention_days: 7,
            acl_cache_ttl_secs: 60,
        },
        auth: AuthConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

/// Builds the service: `team` and `personal` calendars owned by bob;
/// alice holds read/bind/write-content/unbind on `team` via a group
/// binding.
async fn setup() -> Service {
    let store = Arc::new(MemoryStore::new());
    store
        .create_calendar(new_calendar("bob", "team", Some("Team".to_string())))
        .await
        .expect("create team calendar");
    store
        .create_calendar(new_calendar("bob", "personal", None))
        .await
        .expect("create personal calendar");

    let directory = Arc::new(StaticDirectory::new());
    directory.add_user(
        DirectoryUser::new("alice", "uid=alice,ou=users,dc=example", Some("alice@example.com")),
        "alicepw",
    );
    directory.add_user(
        DirectoryUser::new("bob", "uid=bob,ou=users,dc=example", Some("bob@example.com")),
        "bobpw",
    );
    directory.add_binding(
        "uid=alice,ou=users,dc=example",
        GroupAclAttrs {
            group_dn: "cn=team-cal,ou=groups,dc=example".to_string(),
            combined: vec!["calendar-id=team;priv=read,edit,write,bind,unbind".to_string()],
            ..GroupAclAttrs::default()
        },
    );

    let state = AppState::new(settings(), store, directory);
    Service::new(routes(state))
}

struct TestRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl TestRequest {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn options(path: &str) -> Self {
        Self::new(Method::OPTIONS, path)
    }

    fn report(path: &str) -> Self {
        Self::new(Method::from_bytes(b"REPORT").expect("valid method"), path)
    }

    fn propfind(path: &str) -> Self {
        Self::new(Method::from_bytes(b"PROPFIND").expect("valid method"), path)
    }

    fn proppatch(path: &str) -> Self {
        Self::new(Method::from_bytes(b"PROPPATCH").expect("valid method"), path)
    }

    fn mkcalendar(path: &str) -> Self {
        Self::new(Method::from_bytes(b"MKCALENDAR").expect("valid method"), path)
    }

    fn acl(path: &str) -> Self {
        Self::new(Method::from_bytes(b"ACL").expect("valid method"), path)
    }

    fn basic_auth(mut self, user: &str, password: &str) -> Self {
        use base64::Engine as _;
        let credential =
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        self.headers
            .push(("Authorization".to_string(), format!("Basic {credential}")));
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn body(mut self, body: &str) -> Self {
        self.body = Some(body.as_bytes().to_vec());
        self
    }

    async fn send(self, service: &Service) -> TestResponse {
        let url = format!("http://127.0.0.1:5232{}", self.path);
        let mut client = match self.method.as_str() {
            "GET" => TestClient::get(&url),
            "PUT" => TestClient::put(&url),
            "POST" => TestClient::post(&url),
            "DELETE" => TestClient::delete(&url),
            "OPTIONS" => TestClient::options(&url),
            _ => RequestBuilder::new(&url, self.method.clone()),
        };
        for (name, value) in self.headers {
            if let Ok(header_name) = HeaderName::try_from(name.as_str()) {
                client = client.add_header(header_name, value, true);
            }
        }
        if let Some(body) = self.body {
            client = client.body(ReqBody::Once(body.into()));
        }

        let mut response = client.send(service).await;
        let status = response
            .status_code
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response.take_string().await.unwrap_or_default();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

struct TestResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: String,
}

impl TestResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

const EVT1: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:evt1\r\nDTSTART:20250101T100000Z\r\nDTEND:20250101T110000Z\r\nSUMMARY:Test\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

const RECURRING: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:evt2\r\nDTSTART:20250101T090000Z\r\nDTEND:20250101T093000Z\r\nSUMMARY:Standup\r\nRRULE:FREQ=DAILY;COUNT=5\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

fn calendar_query_body(range_start: &str, range_end: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><D:getetag/><C:calendar-data/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="{range_start}" end="{range_end}"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>"#
    )
}

#[test_log::test(tokio::test)]
async fn shared_put_get_query_cycle() {
    let service = setup().await;
    let url = "/dav/calendars/alice/shared/team/evt1.ics";

    // Scenario 1: non-owner PUT through the shared mount with Bind.
    let response = TestRequest::put(url)
        .basic_auth("alice", "alicepw")
        .header("If-None-Match", "*")
        .body(EVT1)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let etag = response.header("ETag").expect("ETag present").to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    // Scenario 2: GET returns the body with the same ETag.
    let response = TestRequest::get(url)
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header("Content-Type"),
        Some("text/calendar; charset=utf-8")
    );
    assert!(response.body.contains("SUMMARY:Test"));
    assert_eq!(response.header("ETag"), Some(etag.as_str()));

    // Scenario 3: calendar-query over the window finds the event.
    let response = TestRequest::report("/dav/calendars/alice/shared/team/")
        .basic_auth("alice", "alicepw")
        .body(&calendar_query_body("20250101T000000Z", "20250102T000000Z"))
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("UID:evt1"));

    // Scenario 4: a second If-None-Match: * PUT fails the precondition.
    let response = TestRequest::put(url)
        .basic_auth("alice", "alicepw")
        .header("If-None-Match", "*")
        .body(EVT1)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn recurring_event_expands_to_instance_hrefs() {
    let service = setup().await;

    let response = TestRequest::put("/dav/calendars/bob/team/evt2.ics")
        .basic_auth("bob", "bobpw")
        .body(RECURRING)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = TestRequest::report("/dav/calendars/bob/team/")
        .basic_auth("bob", "bobpw")
        .body(&calendar_query_body("20250101T000000Z", "20250106T000000Z"))
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);

    let instance_hrefs: Vec<&str> = response
        .body
        .match_indices("<D:href>")
        .map(|(start, _)| {
            let rest = &response.body[start + "<D:href>".len()..];
            &rest[..rest.find("</D:href>").unwrap_or(0)]
        })
        .filter(|href| href.contains("evt2-"))
        .collect();
    assert_eq!(instance_hrefs.len(), 5);
    assert!(instance_hrefs.iter().all(|href| href.ends_with("Z.ics")));
    assert!(instance_hrefs
        .iter()
        .any(|href| href.ends_with("/evt2-20250103T090000Z.ics")));
}

#[test_log::test(tokio::test)]
async fn outbox_free_busy_merges_recipient_calendars() {
    let service = setup().await;

    // Bob's own events across two calendars.
    for (path, body) in [
        ("/dav/calendars/bob/team/evt1.ics", EVT1),
        ("/dav/calendars/bob/personal/evt2.ics", RECURRING),
    ] {
        let response = TestRequest::put(path)
            .basic_auth("bob", "bobpw")
            .body(body)
            .send(&service)
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let freebusy = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nMETHOD:REQUEST\r\nBEGIN:VFREEBUSY\r\nDTSTART:20250101T000000Z\r\nDTEND:20250102T000000Z\r\nEND:VFREEBUSY\r\nEND:VCALENDAR\r\n";
    let response = TestRequest::post("/dav/calendars/alice/outbox/")
        .basic_auth("alice", "alicepw")
        .header("Originator", "mailto:alice@example.com")
        .header("Recipient", "mailto:bob@example.com")
        .body(freebusy)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("schedule-response"));
    assert!(response.body.contains("2.0;Success"));
    // 09:00-09:30 (standup) and 10:00-11:00 (evt1) stay disjoint.
    assert!(response
        .body
        .contains("FREEBUSY;FBTYPE=BUSY:20250101T090000Z/20250101T093000Z"));
    assert!(response
        .body
        .contains("FREEBUSY;FBTYPE=BUSY:20250101T100000Z/20250101T110000Z"));
}

#[tokio::test]
async fn outbox_unknown_recipient_and_foreign_outbox() {
    let service = setup().await;
    let freebusy = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nMETHOD:REQUEST\r\nBEGIN:VFREEBUSY\r\nDTSTART:20250101T000000Z\r\nDTEND:20250102T000000Z\r\nEND:VFREEBUSY\r\nEND:VCALENDAR\r\n";

    let response = TestRequest::post("/dav/calendars/alice/outbox/")
        .basic_auth("alice", "alicepw")
        .header("Originator", "mailto:alice@example.com")
        .header("Recipient", "mailto:nobody@example.com")
        .body(freebusy)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("3.7;Invalid calendar user"));

    // Posting through someone else's outbox is refused.
    let response = TestRequest::post("/dav/calendars/bob/outbox/")
        .basic_auth("alice", "alicepw")
        .header("Originator", "mailto:alice@example.com")
        .header("Recipient", "mailto:bob@example.com")
        .body(freebusy)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sync_collection_reports_changes_and_idempotence() {
    let service = setup().await;

    let put = TestRequest::put("/dav/calendars/bob/team/evt1.ics")
        .basic_auth("bob", "bobpw")
        .body(EVT1)
        .send(&service)
        .await;
    assert_eq!(put.status, StatusCode::CREATED);
    let delete = TestRequest::delete("/dav/calendars/bob/team/evt1.ics")
        .basic_auth("bob", "bobpw")
        .send(&service)
        .await;
    assert_eq!(delete.status, StatusCode::NO_CONTENT);

    let sync_body = |token: &str| {
        format!(
            r#"<?xml version="1.0"?>
<D:sync-collection xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:sync-token>{token}</D:sync-token>
  <D:prop><D:getetag/><C:calendar-data/></D:prop>
</D:sync-collection>"#
        )
    };

    let response = TestRequest::report("/dav/calendars/bob/team/")
        .basic_auth("bob", "bobpw")
        .body(&sync_body(""))
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("<D:sync-token>seq:2</D:sync-token>"));
    assert!(response.body.contains("HTTP/1.1 404 Not Found"));

    // Freshest token: no members, same token echoed.
    let response = TestRequest::report("/dav/calendars/bob/team/")
        .basic_auth("bob", "bobpw")
        .body(&sync_body("seq:2"))
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("<D:sync-token>seq:2</D:sync-token>"));
    assert!(!response.body.contains("<D:propstat>"));
}

#[tokio::test]
async fn propfind_principal_and_collection() {
    let service = setup().await;

    let body = r#"<?xml version="1.0"?>
<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <C:calendar-home-set/>
    <C:schedule-inbox-URL/>
    <C:calendar-user-address-set/>
  </D:prop>
</D:propfind>"#;
    let response = TestRequest::propfind("/dav/principals/users/alice")
        .basic_auth("alice", "alicepw")
        .send_with_body(&service, body)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("/dav/calendars/alice/"));
    assert!(response.body.contains("/dav/calendars/alice/inbox/"));
    assert!(response.body.contains("mailto:alice@example.com"));

    let ctag_body = r#"<?xml version="1.0"?>
<D:propfind xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
  <D:prop><D:sync-token/><CS:getctag/><D:current-user-privilege-set/><D:acl/></D:prop>
</D:propfind>"#;
    let response = TestRequest::propfind("/dav/calendars/alice/shared/team/")
        .basic_auth("alice", "alicepw")
        .send_with_body(&service, ctag_body)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("<D:sync-token>seq:0</D:sync-token>"));
    assert!(response.body.contains("<CS:getctag>seq:0</CS:getctag>"));
    // Alice holds full write on team, so the compound is advertised.
    assert!(response.body.contains("<D:privilege><D:write/></D:privilege>"));
    // The ACL carries bob's protected owner ACE.
    assert!(response.body.contains("/dav/principals/users/bob"));
    assert!(response.body.contains("<D:protected/>"));
}

#[tokio::test]
async fn mkcalendar_proppatch_and_conflict() {
    let service = setup().await;

    let response = TestRequest::mkcalendar("/dav/calendars/alice/holidays/")
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = TestRequest::mkcalendar("/dav/calendars/alice/holidays/")
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    // Creating under someone else's home is refused.
    let response = TestRequest::mkcalendar("/dav/calendars/bob/sneaky/")
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let proppatch_body = r#"<?xml version="1.0"?>
<D:propertyupdate xmlns:D="DAV:">
  <D:set><D:prop><D:displayname>Holidays 2025</D:displayname></D:prop></D:set>
</D:propertyupdate>"#;
    let response = TestRequest::proppatch("/dav/calendars/alice/holidays/")
        .basic_auth("alice", "alicepw")
        .send_with_body(&service, proppatch_body)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);

    let propfind_body = r#"<D:propfind xmlns:D="DAV:"><D:prop><D:displayname/></D:prop></D:propfind>"#;
    let response = TestRequest::propfind("/dav/calendars/alice/holidays/")
        .basic_auth("alice", "alicepw")
        .send_with_body(&service, propfind_body)
        .await;
    assert!(response.body.contains("<D:displayname>Holidays 2025</D:displayname>"));
}

#[tokio::test]
async fn auth_and_misc_surfaces() {
    let service = setup().await;

    // Missing credentials.
    let response = TestRequest::get("/dav/calendars/bob/team/").send(&service).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.header("WWW-Authenticate"),
        Some("Basic realm=\"kunai\"")
    );

    // Wrong password.
    let response = TestRequest::get("/dav/calendars/bob/team/")
        .basic_auth("bob", "wrong")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // OPTIONS advertises the DAV classes without auth.
    let response = TestRequest::options("/dav/calendars/bob/team/").send(&service).await;
    assert_eq!(response.status, StatusCode::OK);
    let dav = response.header("DAV").expect("DAV header");
    assert!(dav.contains("calendar-access"));
    assert!(dav.contains("addressbook"));

    // ACL management is delegated to the directory.
    let response = TestRequest::acl("/dav/calendars/bob/team/")
        .basic_auth("bob", "bobpw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body.contains("ACLs managed via LDAP groups"));

    // No read binding means no cross-owner access.
    let response = TestRequest::get("/dav/calendars/bob/shared/personal/")
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Well-known discovery redirects into the DAV tree.
    let response = TestRequest::get("/.well-known/caldav").send(&service).await;
    assert!(matches!(
        response.status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
    ));
    assert_eq!(response.header("Location"), Some("/dav"));
}

#[tokio::test]
async fn addressbook_round_trip_and_query() {
    let service = setup().await;

    let mkcol = TestRequest::new(
        Method::from_bytes(b"MKCOL").expect("valid method"),
        "/dav/addressbooks/alice/friends/",
    )
    .basic_auth("alice", "alicepw")
    .send(&service)
    .await;
    assert_eq!(mkcol.status, StatusCode::CREATED);

    let card = "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:card1\r\nFN:Bob Smith\r\nEMAIL:bob@example.com\r\nEND:VCARD\r\n";
    let response = TestRequest::put("/dav/addressbooks/alice/friends/card1.vcf")
        .basic_auth("alice", "alicepw")
        .body(card)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let query = r#"<?xml version="1.0"?>
<CR:addressbook-query xmlns:D="DAV:" xmlns:CR="urn:ietf:params:xml:ns:carddav">
  <D:prop><D:getetag/><CR:address-data/></D:prop>
  <CR:filter>
    <CR:prop-filter name="FN">
      <CR:text-match collation="i;unicode-casemap">smith</CR:text-match>
    </CR:prop-filter>
  </CR:filter>
</CR:addressbook-query>"#;
    let response = TestRequest::report("/dav/addressbooks/alice/friends/")
        .basic_auth("alice", "alicepw")
        .body(query)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert!(response.body.contains("card1.vcf"));
    assert!(response.body.contains("FN:Bob Smith"));

    // FN synthesized from N when missing.
    let card_no_fn = "BEGIN:VCARD\r\nVERSION:4.0\r\nUID:card2\r\nN:Jones;Ann;;;\r\nEND:VCARD\r\n";
    let response = TestRequest::put("/dav/addressbooks/alice/friends/card2.vcf")
        .basic_auth("alice", "alicepw")
        .body(card_no_fn)
        .send(&service)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let response = TestRequest::get("/dav/addressbooks/alice/friends/card2.vcf")
        .basic_auth("alice", "alicepw")
        .send(&service)
        .await;
    assert!(response.body.contains("FN:Ann Jones"));
}

impl TestRequest {
    async fn send_with_body(self, service: &Service, body: &str) -> TestResponse {
        self.body(body).send(service).await
    }
}
