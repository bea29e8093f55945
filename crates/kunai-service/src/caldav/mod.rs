//! CalDAV domain services: collection resolution, the conditional write
//! pipeline, the REPORT engine, recurrence expansion, and free-busy
//! aggregation.

pub mod freebusy;
pub mod object;
pub mod recurrence;
pub mod report;

use kunai_core::path::CollectionRef;
use kunai_store::Store;
use kunai_store::model::Calendar;

use crate::error::ServiceResult;

/// ## Summary
/// Resolves a routed collection reference to a stored calendar. Owned
/// references match `(owner, uri)`; shared-mount references resolve the
/// URI across all owners.
///
/// ## Errors
/// Propagates store failures; an unknown collection is `Ok(None)`.
pub async fn resolve_calendar(
    store: &dyn Store,
    collection: &CollectionRef,
) -> ServiceResult<Option<Calendar>> {
    let found = if collection.shared {
        store.find_calendar_by_uri(&collection.uri).await?
    } else {
        store.find_calendar(&collection.owner, &collection.uri).await?
    };
    Ok(found)
}
