//! Persistence seam for kunai.
//!
//! The [`Store`] trait is the consumed interface a durable backend
//! implements; [`memory::MemoryStore`] is the in-tree reference
//! implementation used by tests and the standalone deployment. Every
//! mutating object operation fuses the upsert/delete with a change-log
//! append and the collection CTag bump in one linearizable step.

pub mod error;
pub mod etag;
pub mod memory;
pub mod model;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use error::StoreResult;
use model::{
    Addressbook, AttendeeResponse, Calendar, CalendarObject, CalendarObjectUpsert, ChangePage,
    Contact, FreeBusyCacheEntry, SchedulingObject, SyncInfo,
};

/// Typed CRUD plus change-log and scheduling state.
#[async_trait]
pub trait Store: Send + Sync {
    // Calendars

    async fn list_calendars(&self, owner_uid: &str) -> StoreResult<Vec<Calendar>>;

    /// All calendars across owners; the shared mount resolves URIs with
    /// this.
    async fn list_all_calendars(&self) -> StoreResult<Vec<Calendar>>;

    async fn find_calendar(&self, owner_uid: &str, uri: &str) -> StoreResult<Option<Calendar>>;

    /// Resolves a collection URI across all owners (shared mount).
    async fn find_calendar_by_uri(&self, uri: &str) -> StoreResult<Option<Calendar>>;

    async fn create_calendar(&self, calendar: Calendar) -> StoreResult<Calendar>;

    async fn update_calendar_displayname(
        &self,
        id: Uuid,
        display_name: Option<String>,
    ) -> StoreResult<()>;

    async fn delete_calendar(&self, id: Uuid) -> StoreResult<()>;

    // Calendar objects

    async fn get_calendar_object(
        &self,
        calendar_id: Uuid,
        uid: &str,
    ) -> StoreResult<Option<CalendarObject>>;

    async fn list_calendar_objects(&self, calendar_id: Uuid) -> StoreResult<Vec<CalendarObject>>;

    /// Upserts an object, appends the change-log entry, and bumps the
    /// collection CTag in one step. Returns the stored object and whether
    /// it was created.
    async fn put_calendar_object(
        &self,
        upsert: CalendarObjectUpsert,
    ) -> StoreResult<(CalendarObject, bool)>;

    /// Deletes an object and appends a deletion change.
    async fn delete_calendar_object(&self, calendar_id: Uuid, uid: &str) -> StoreResult<()>;

    // Address books

    async fn list_addressbooks(&self, owner_uid: &str) -> StoreResult<Vec<Addressbook>>;

    async fn find_addressbook(&self, owner_uid: &str, uri: &str)
    -> StoreResult<Option<Addressbook>>;

    async fn find_addressbook_by_uri(&self, uri: &str) -> StoreResult<Option<Addressbook>>;

    async fn create_addressbook(&self, addressbook: Addressbook) -> StoreResult<Addressbook>;

    async fn update_addressbook_displayname(
        &self,
        id: Uuid,
        display_name: Option<String>,
    ) -> StoreResult<()>;

    async fn delete_addressbook(&self, id: Uuid) -> StoreResult<()>;

    // Contacts

    async fn get_contact(&self, addressbook_id: Uuid, uid: &str) -> StoreResult<Option<Contact>>;

    async fn list_contacts(&self, addressbook_id: Uuid) -> StoreResult<Vec<Contact>>;

    async fn put_contact(
        &self,
        addressbook_id: Uuid,
        uid: &str,
        data: String,
    ) -> StoreResult<(Contact, bool)>;

    async fn delete_contact(&self, addressbook_id: Uuid, uid: &str) -> StoreResult<()>;

    // Change log

    /// Changes with `seq > since_seq`, oldest first, up to `limit`.
    async fn list_changes_since(
        &self,
        collection_id: Uuid,
        since_seq: i64,
        limit: Option<usize>,
    ) -> StoreResult<ChangePage>;

    async fn get_sync_info(&self, collection_id: Uuid) -> StoreResult<SyncInfo>;

    // Scheduling

    /// Ensures the per-user inbox/outbox pair exists; idempotent.
    async fn ensure_scheduling_collections(&self, owner_uid: &str) -> StoreResult<()>;

    async fn put_scheduling_object(&self, object: SchedulingObject) -> StoreResult<()>;

    async fn list_scheduling_objects(&self, owner_uid: &str)
    -> StoreResult<Vec<SchedulingObject>>;

    async fn get_scheduling_object(
        &self,
        owner_uid: &str,
        uid: &str,
    ) -> StoreResult<Option<SchedulingObject>>;

    async fn delete_scheduling_object(&self, owner_uid: &str, uid: &str) -> StoreResult<()>;

    async fn record_attendee_response(&self, response: AttendeeResponse) -> StoreResult<()>;

    async fn list_attendee_responses(&self, event_uid: &str)
    -> StoreResult<Vec<AttendeeResponse>>;

    // Free-busy cache

    async fn put_free_busy_cache(&self, entry: FreeBusyCacheEntry) -> StoreResult<()>;

    async fn get_free_busy_cache(
        &self,
        user_uid: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> StoreResult<Option<FreeBusyCacheEntry>>;

    // Housekeeping

    async fn purge_scheduling_objects_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn purge_attendee_responses_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn purge_free_busy_cache_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Convenience re-exports.
pub use error::StoreError;
pub use memory::MemoryStore;
