//! CardDAV domain services.

pub mod object;
pub mod report;

use kunai_core::path::CollectionRef;
use kunai_store::Store;
use kunai_store::model::Addressbook;

use crate::error::ServiceResult;

/// ## Summary
/// Resolves a routed collection reference to a stored address book;
/// shared-mount references resolve the URI across all owners.
///
/// ## Errors
/// Propagates store failures; an unknown collection is `Ok(None)`.
pub async fn resolve_addressbook(
    store: &dyn Store,
    collection: &CollectionRef,
) -> ServiceResult<Option<Addressbook>> {
    let found = if collection.shared {
        store.find_addressbook_by_uri(&collection.uri).await?
    } else {
        store
            .find_addressbook(&collection.owner, &collection.uri)
            .await?
    };
    Ok(found)
}
