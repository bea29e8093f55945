//! The conditional write pipeline for contacts.

use kunai_rfc::vcard;
use kunai_store::Store;
use kunai_store::model::{Addressbook, Contact};

use crate::caldav::object::{Preconditions, WriteAccess};
use crate::error::{ServiceError, ServiceResult};

/// Result of a successful contact PUT.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub contact: Contact,
    pub created: bool,
}

/// ## Summary
/// PUT of a contact: vCard validation (VERSION required, FN synthesized
/// from N when absent), preconditions, and the fused upsert. Writes to
/// directory-backed (`ldap_`) books are rejected.
///
/// ## Errors
/// `Forbidden` for read-only books or missing privileges, `BadRequest`
/// for invalid vCards, `PayloadTooLarge`, `PreconditionFailed`.
pub async fn put_contact(
    store: &dyn Store,
    addressbook: &Addressbook,
    uid: &str,
    body: &[u8],
    preconditions: Preconditions<'_>,
    access: WriteAccess,
    max_resource_size: usize,
) -> ServiceResult<PutOutcome> {
    if addressbook.is_directory_backed() {
        return Err(ServiceError::Forbidden(format!(
            "address book {} is directory-backed and read-only",
            addressbook.uri
        )));
    }
    if body.is_empty() {
        return Err(ServiceError::BadRequest("empty vCard".to_string()));
    }
    if body.len() > max_resource_size {
        return Err(ServiceError::PayloadTooLarge(body.len()));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| ServiceError::BadRequest("vCard is not UTF-8".to_string()))?;

    let normalized =
        vcard::validate_and_normalize(text).map_err(|e| ServiceError::BadRequest(e.to_string()))?;

    let existing = store.get_contact(addressbook.id, uid).await?;

    let allowed = match (existing.is_some(), access) {
        (_, WriteAccess::Owner) => true,
        (true, WriteAccess::Shared(effective)) => effective.write_content,
        (false, WriteAccess::Shared(effective)) => effective.bind,
    };
    if !allowed {
        return Err(ServiceError::Forbidden(format!(
            "write to address book {} denied",
            addressbook.uri
        )));
    }

    preconditions.check(existing.as_ref().map(|c| c.etag.as_str()))?;

    let (contact, created) = store.put_contact(addressbook.id, uid, normalized).await?;

    tracing::debug!(
        addressbook = %addressbook.uri,
        uid,
        created,
        etag = %contact.etag,
        "contact stored"
    );

    Ok(PutOutcome { contact, created })
}

/// ## Summary
/// DELETE of a contact; mirrors the calendar rules.
///
/// ## Errors
/// `Forbidden`, `NotFound`, `PreconditionFailed`.
pub async fn delete_contact(
    store: &dyn Store,
    addressbook: &Addressbook,
    uid: &str,
    preconditions: Preconditions<'_>,
    access: WriteAccess,
) -> ServiceResult<()> {
    if addressbook.is_directory_backed() {
        return Err(ServiceError::Forbidden(format!(
            "address book {} is directory-backed and read-only",
            addressbook.uri
        )));
    }
    let allowed = match access {
        WriteAccess::Owner => true,
        WriteAccess::Shared(effective) => effective.unbind,
    };
    if !allowed {
        return Err(ServiceError::Forbidden(format!(
            "delete from address book {} denied",
            addressbook.uri
        )));
    }

    let existing = store
        .get_contact(addressbook.id, uid)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("contact {uid}")))?;

    preconditions.check(Some(existing.etag.as_str()))?;

    store.delete_contact(addressbook.id, uid).await?;
    Ok(())
}
