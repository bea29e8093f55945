//! In-memory reference implementation of [`Store`].
//!
//! All tables live behind one `RwLock`; each mutating object operation
//! performs its upsert, change-log append, and CTag bump inside a single
//! write-guard critical section, which gives the linearizability the sync
//! protocol requires.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Store;
use crate::error::{StoreError, StoreResult};
use crate::etag::generate_etag;
use crate::model::{
    Addressbook, AttendeeResponse, Calendar, CalendarObject, CalendarObjectUpsert, Change,
    ChangePage, Contact, FreeBusyCacheEntry, SchedulingObject, SchedulingStatus, SyncInfo,
};

#[derive(Default)]
struct Tables {
    calendars: HashMap<Uuid, Calendar>,
    calendar_objects: HashMap<(Uuid, String), CalendarObject>,
    addressbooks: HashMap<Uuid, Addressbook>,
    contacts: HashMap<(Uuid, String), Contact>,
    changes: HashMap<Uuid, Vec<Change>>,
    seqs: HashMap<Uuid, i64>,
    scheduling_owners: HashSet<String>,
    scheduling_objects: HashMap<(String, String), SchedulingObject>,
    attendee_responses: HashMap<(String, String), AttendeeResponse>,
    free_busy_cache: Vec<FreeBusyCacheEntry>,
}

impl Tables {
    /// Allocates the next change sequence for a collection and appends the
    /// entry. Returns the new sequence.
    fn record_change(&mut self, collection_id: Uuid, uid: &str, deleted: bool) -> i64 {
        let seq = self.seqs.entry(collection_id).or_insert(0);
        *seq += 1;
        let seq = *seq;
        self.changes.entry(collection_id).or_default().push(Change {
            collection_id,
            seq,
            uid: uid.to_string(),
            deleted,
            at: Utc::now(),
        });
        if let Some(calendar) = self.calendars.get_mut(&collection_id) {
            calendar.ctag = seq;
            calendar.updated_at = Utc::now();
        }
        if let Some(book) = self.addressbooks.get_mut(&collection_id) {
            book.ctag = seq;
            book.updated_at = Utc::now();
        }
        seq
    }
}

/// The in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_calendars(&self, owner_uid: &str) -> StoreResult<Vec<Calendar>> {
        let tables = self.read();
        let mut calendars: Vec<Calendar> = tables
            .calendars
            .values()
            .filter(|c| c.owner_uid == owner_uid)
            .cloned()
            .collect();
        calendars.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(calendars)
    }

    async fn list_all_calendars(&self) -> StoreResult<Vec<Calendar>> {
        let tables = self.read();
        let mut calendars: Vec<Calendar> = tables.calendars.values().cloned().collect();
        calendars.sort_by(|a, b| (&a.owner_uid, &a.uri).cmp(&(&b.owner_uid, &b.uri)));
        Ok(calendars)
    }

    async fn find_calendar(&self, owner_uid: &str, uri: &str) -> StoreResult<Option<Calendar>> {
        let tables = self.read();
        Ok(tables
            .calendars
            .values()
            .find(|c| c.owner_uid == owner_uid && c.uri == uri)
            .cloned())
    }

    async fn find_calendar_by_uri(&self, uri: &str) -> StoreResult<Option<Calendar>> {
        let tables = self.read();
        Ok(tables.calendars.values().find(|c| c.uri == uri).cloned())
    }

    async fn create_calendar(&self, calendar: Calendar) -> StoreResult<Calendar> {
        let mut tables = self.write();
        if tables
            .calendars
            .values()
            .any(|c| c.owner_uid == calendar.owner_uid && c.uri == calendar.uri)
        {
            return Err(StoreError::Conflict(format!(
                "calendar {}/{}",
                calendar.owner_uid, calendar.uri
            )));
        }
        tables.calendars.insert(calendar.id, calendar.clone());
        Ok(calendar)
    }

    async fn update_calendar_displayname(
        &self,
        id: Uuid,
        display_name: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.write();
        let calendar = tables
            .calendars
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("calendar {id}")))?;
        calendar.display_name = display_name;
        calendar.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_calendar(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.write();
        tables
            .calendars
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("calendar {id}")))?;
        tables.calendar_objects.retain(|(cal_id, _), _| *cal_id != id);
        tables.changes.remove(&id);
        tables.seqs.remove(&id);
        Ok(())
    }

    async fn get_calendar_object(
        &self,
        calendar_id: Uuid,
        uid: &str,
    ) -> StoreResult<Option<CalendarObject>> {
        let tables = self.read();
        Ok(tables
            .calendar_objects
            .get(&(calendar_id, uid.to_string()))
            .cloned())
    }

    async fn list_calendar_objects(&self, calendar_id: Uuid) -> StoreResult<Vec<CalendarObject>> {
        let tables = self.read();
        let mut objects: Vec<CalendarObject> = tables
            .calendar_objects
            .values()
            .filter(|o| o.calendar_id == calendar_id)
            .cloned()
            .collect();
        objects.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(objects)
    }

    async fn put_calendar_object(
        &self,
        upsert: CalendarObjectUpsert,
    ) -> StoreResult<(CalendarObject, bool)> {
        let mut tables = self.write();
        if !tables.calendars.contains_key(&upsert.calendar_id) {
            return Err(StoreError::NotFound(format!(
                "calendar {}",
                upsert.calendar_id
            )));
        }
        let key = (upsert.calendar_id, upsert.uid.clone());
        let created = !tables.calendar_objects.contains_key(&key);
        let object = CalendarObject {
            calendar_id: upsert.calendar_id,
            uid: upsert.uid.clone(),
            component: upsert.component,
            etag: generate_etag(upsert.data.as_bytes()),
            data: upsert.data,
            start_at: upsert.start_at,
            end_at: upsert.end_at,
            updated_at: Utc::now(),
        };
        tables.calendar_objects.insert(key, object.clone());
        tables.record_change(upsert.calendar_id, &upsert.uid, false);
        Ok((object, created))
    }

    async fn delete_calendar_object(&self, calendar_id: Uuid, uid: &str) -> StoreResult<()> {
        let mut tables = self.write();
        tables
            .calendar_objects
            .remove(&(calendar_id, uid.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("object {uid}")))?;
        tables.record_change(calendar_id, uid, true);
        Ok(())
    }

    async fn list_addressbooks(&self, owner_uid: &str) -> StoreResult<Vec<Addressbook>> {
        let tables = self.read();
        let mut books: Vec<Addressbook> = tables
            .addressbooks
            .values()
            .filter(|b| b.owner_uid == owner_uid)
            .cloned()
            .collect();
        books.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(books)
    }

    async fn find_addressbook(
        &self,
        owner_uid: &str,
        uri: &str,
    ) -> StoreResult<Option<Addressbook>> {
        let tables = self.read();
        Ok(tables
            .addressbooks
            .values()
            .find(|b| b.owner_uid == owner_uid && b.uri == uri)
            .cloned())
    }

    async fn find_addressbook_by_uri(&self, uri: &str) -> StoreResult<Option<Addressbook>> {
        let tables = self.read();
        Ok(tables.addressbooks.values().find(|b| b.uri == uri).cloned())
    }

    async fn create_addressbook(&self, addressbook: Addressbook) -> StoreResult<Addressbook> {
        let mut tables = self.write();
        if tables
            .addressbooks
            .values()
            .any(|b| b.owner_uid == addressbook.owner_uid && b.uri == addressbook.uri)
        {
            return Err(StoreError::Conflict(format!(
                "addressbook {}/{}",
                addressbook.owner_uid, addressbook.uri
            )));
        }
        tables.addressbooks.insert(addressbook.id, addressbook.clone());
        Ok(addressbook)
    }

    async fn update_addressbook_displayname(
        &self,
        id: Uuid,
        display_name: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.write();
        let book = tables
            .addressbooks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("addressbook {id}")))?;
        book.display_name = display_name;
        book.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_addressbook(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.write();
        tables
            .addressbooks
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("addressbook {id}")))?;
        tables.contacts.retain(|(book_id, _), _| *book_id != id);
        tables.changes.remove(&id);
        tables.seqs.remove(&id);
        Ok(())
    }

    async fn get_contact(&self, addressbook_id: Uuid, uid: &str) -> StoreResult<Option<Contact>> {
        let tables = self.read();
        Ok(tables.contacts.get(&(addressbook_id, uid.to_string())).cloned())
    }

    async fn list_contacts(&self, addressbook_id: Uuid) -> StoreResult<Vec<Contact>> {
        let tables = self.read();
        let mut contacts: Vec<Contact> = tables
            .contacts
            .values()
            .filter(|c| c.addressbook_id == addressbook_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(contacts)
    }

    async fn put_contact(
        &self,
        addressbook_id: Uuid,
        uid: &str,
        data: String,
    ) -> StoreResult<(Contact, bool)> {
        let mut tables = self.write();
        if !tables.addressbooks.contains_key(&addressbook_id) {
            return Err(StoreError::NotFound(format!("addressbook {addressbook_id}")));
        }
        let key = (addressbook_id, uid.to_string());
        let created = !tables.contacts.contains_key(&key);
        let contact = Contact {
            addressbook_id,
            uid: uid.to_string(),
            etag: generate_etag(data.as_bytes()),
            data,
            updated_at: Utc::now(),
        };
        tables.contacts.insert(key, contact.clone());
        tables.record_change(addressbook_id, uid, false);
        Ok((contact, created))
    }

    async fn delete_contact(&self, addressbook_id: Uuid, uid: &str) -> StoreResult<()> {
        let mut tables = self.write();
        tables
            .contacts
            .remove(&(addressbook_id, uid.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("contact {uid}")))?;
        tables.record_change(addressbook_id, uid, true);
        Ok(())
    }

    async fn list_changes_since(
        &self,
        collection_id: Uuid,
        since_seq: i64,
        limit: Option<usize>,
    ) -> StoreResult<ChangePage> {
        let tables = self.read();
        let current_seq = tables.seqs.get(&collection_id).copied().unwrap_or(0);
        let empty = Vec::new();
        let all = tables.changes.get(&collection_id).unwrap_or(&empty);
        let mut changes: Vec<Change> =
            all.iter().filter(|c| c.seq > since_seq).cloned().collect();
        changes.sort_by_key(|c| c.seq);
        let truncated = limit.is_some_and(|l| changes.len() > l);
        if let Some(l) = limit {
            changes.truncate(l);
        }
        Ok(ChangePage {
            changes,
            current_seq,
            truncated,
        })
    }

    async fn get_sync_info(&self, collection_id: Uuid) -> StoreResult<SyncInfo> {
        let tables = self.read();
        Ok(SyncInfo {
            seq: tables.seqs.get(&collection_id).copied().unwrap_or(0),
        })
    }

    async fn ensure_scheduling_collections(&self, owner_uid: &str) -> StoreResult<()> {
        let mut tables = self.write();
        tables.scheduling_owners.insert(owner_uid.to_string());
        Ok(())
    }

    async fn put_scheduling_object(&self, object: SchedulingObject) -> StoreResult<()> {
        let mut tables = self.write();
        tables.scheduling_owners.insert(object.owner_uid.clone());
        tables
            .scheduling_objects
            .insert((object.owner_uid.clone(), object.uid.clone()), object);
        Ok(())
    }

    async fn list_scheduling_objects(
        &self,
        owner_uid: &str,
    ) -> StoreResult<Vec<SchedulingObject>> {
        let tables = self.read();
        let mut objects: Vec<SchedulingObject> = tables
            .scheduling_objects
            .values()
            .filter(|o| o.owner_uid == owner_uid)
            .cloned()
            .collect();
        objects.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(objects)
    }

    async fn get_scheduling_object(
        &self,
        owner_uid: &str,
        uid: &str,
    ) -> StoreResult<Option<SchedulingObject>> {
        let tables = self.read();
        Ok(tables
            .scheduling_objects
            .get(&(owner_uid.to_string(), uid.to_string()))
            .cloned())
    }

    async fn delete_scheduling_object(&self, owner_uid: &str, uid: &str) -> StoreResult<()> {
        let mut tables = self.write();
        tables
            .scheduling_objects
            .remove(&(owner_uid.to_string(), uid.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("scheduling object {uid}")))?;
        Ok(())
    }

    async fn record_attendee_response(&self, response: AttendeeResponse) -> StoreResult<()> {
        let mut tables = self.write();
        tables.attendee_responses.insert(
            (response.event_uid.clone(), response.attendee_email.clone()),
            response,
        );
        Ok(())
    }

    async fn list_attendee_responses(
        &self,
        event_uid: &str,
    ) -> StoreResult<Vec<AttendeeResponse>> {
        let tables = self.read();
        let mut responses: Vec<AttendeeResponse> = tables
            .attendee_responses
            .values()
            .filter(|r| r.event_uid == event_uid)
            .cloned()
            .collect();
        responses.sort_by(|a, b| a.attendee_email.cmp(&b.attendee_email));
        Ok(responses)
    }

    async fn put_free_busy_cache(&self, entry: FreeBusyCacheEntry) -> StoreResult<()> {
        let mut tables = self.write();
        tables.free_busy_cache.retain(|e| {
            !(e.user_uid == entry.user_uid
                && e.range_start == entry.range_start
                && e.range_end == entry.range_end)
        });
        tables.free_busy_cache.push(entry);
        Ok(())
    }

    async fn get_free_busy_cache(
        &self,
        user_uid: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> StoreResult<Option<FreeBusyCacheEntry>> {
        let tables = self.read();
        Ok(tables
            .free_busy_cache
            .iter()
            .find(|e| {
                e.user_uid == user_uid && e.range_start == range_start && e.range_end == range_end
            })
            .cloned())
    }

    async fn purge_scheduling_objects_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.write();
        let before = tables.scheduling_objects.len();
        tables
            .scheduling_objects
            .retain(|_, o| o.received_at >= cutoff);
        Ok((before - tables.scheduling_objects.len()) as u64)
    }

    async fn purge_attendee_responses_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.write();
        let before = tables.attendee_responses.len();
        tables
            .attendee_responses
            .retain(|_, r| r.responded_at >= cutoff);
        Ok((before - tables.attendee_responses.len()) as u64)
    }

    async fn purge_free_busy_cache_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.write();
        let before = tables.free_busy_cache.len();
        tables.free_busy_cache.retain(|e| e.computed_at >= cutoff);
        Ok((before - tables.free_busy_cache.len()) as u64)
    }
}

/// Builds a calendar with fresh identity and zeroed sync state.
#[must_use]
pub fn new_calendar(owner_uid: &str, uri: &str, display_name: Option<String>) -> Calendar {
    let now = Utc::now();
    Calendar {
        id: Uuid::new_v4(),
        owner_uid: owner_uid.to_string(),
        uri: uri.to_string(),
        display_name,
        description: None,
        color: None,
        ctag: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Builds an address book with fresh identity and zeroed sync state.
#[must_use]
pub fn new_addressbook(owner_uid: &str, uri: &str, display_name: Option<String>) -> Addressbook {
    Addressbook {
        id: Uuid::new_v4(),
        owner_uid: owner_uid.to_string(),
        uri: uri.to_string(),
        display_name,
        description: None,
        ctag: 0,
        updated_at: Utc::now(),
    }
}

/// Builds a pending scheduling object received now.
#[must_use]
pub fn new_scheduling_object(
    owner_uid: &str,
    uid: &str,
    data: String,
    method: &str,
    originator: &str,
    recipient: &str,
) -> SchedulingObject {
    SchedulingObject {
        owner_uid: owner_uid.to_string(),
        uid: uid.to_string(),
        data,
        method: method.to_string(),
        originator: originator.to_string(),
        recipient: recipient.to_string(),
        status: SchedulingStatus::Pending,
        received_at: Utc::now(),
    }
}
