//! # Scope Filter Builder
//!
//! First pass over the snapshot. Turns a requested allow-list (usernames or
//! organization slugs) into the complete set of filters the importers need,
//! before anything is persisted.
//!
//! Only the filter-relevant kinds are scanned and the scan stops once their
//! contiguous block ends.

use shared_types::{Filter, FieldValue, ImportScope, PrimaryKey, Record, PK_FIELD};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::WellKnownKinds;
use crate::domain::ImportingError;

/// Field holding a user's login name.
pub const USERNAME_FIELD: &str = "username";
/// Field holding an organization's slug.
pub const SLUG_FIELD: &str = "slug";
/// Field holding a contact address, on users and on emails.
pub const EMAIL_FIELD: &str = "email";
/// Membership field referencing the user.
pub const MEMBER_USER_FIELD: &str = "user";
/// Membership field referencing the organization.
pub const MEMBER_ORGANIZATION_FIELD: &str = "organization";

/// Reject filters the scope cannot honor.
pub fn validate_filter(
    scope: ImportScope,
    filter: Option<&Filter>,
    kinds: &WellKnownKinds,
) -> Result<(), ImportingError> {
    let Some(filter) = filter else {
        return Ok(());
    };

    if scope == ImportScope::Global {
        return Err(ImportingError::FilterMisuse(
            "global imports cannot be filtered".to_string(),
        ));
    }

    if filter.kind == kinds.organization {
        if scope != ImportScope::Organization {
            return Err(ImportingError::FilterMisuse(format!(
                "organization filters are only allowed in the organization scope, not {scope}"
            )));
        }
        if filter.field != SLUG_FIELD {
            return Err(ImportingError::FilterMisuse(format!(
                "organizations can only be filtered by {SLUG_FIELD}"
            )));
        }
        return Ok(());
    }

    if filter.kind == kinds.user {
        if !matches!(scope, ImportScope::User | ImportScope::Config) {
            return Err(ImportingError::FilterMisuse(format!(
                "user filters are only allowed in the user and config scopes, not {scope}"
            )));
        }
        if filter.field != USERNAME_FIELD {
            return Err(ImportingError::FilterMisuse(format!(
                "users can only be filtered by {USERNAME_FIELD}"
            )));
        }
        return Ok(());
    }

    Err(ImportingError::FilterMisuse(format!(
        "filtering on {} is not supported",
        filter.kind
    )))
}

/// Expand a validated filter into every filter the run needs.
pub fn build_filters(
    records: &[Record],
    requested: Option<&Filter>,
    kinds: &WellKnownKinds,
) -> Vec<Filter> {
    let Some(requested) = requested else {
        return Vec::new();
    };

    if requested.kind == kinds.organization {
        organization_filters(records, requested, kinds)
    } else {
        user_filters(records, requested, kinds)
    }
}

fn organization_filters(
    records: &[Record],
    requested: &Filter,
    kinds: &WellKnownKinds,
) -> Vec<Filter> {
    let mut user_emails: BTreeMap<PrimaryKey, String> = BTreeMap::new();
    let mut org_pks: BTreeSet<PrimaryKey> = BTreeSet::new();
    let mut user_pks: BTreeSet<PrimaryKey> = BTreeSet::new();
    let mut seen_member = false;

    for record in records {
        if record.kind == kinds.user {
            if let Some(email) = record.str_field(EMAIL_FIELD) {
                user_emails.insert(record.pk, email.to_string());
            }
        } else if record.kind == kinds.organization {
            if requested.admits(record) {
                org_pks.insert(record.pk);
            }
        } else if record.kind == kinds.organization_member {
            seen_member = true;
            let in_allowed_org = record
                .int_field(MEMBER_ORGANIZATION_FIELD)
                .is_some_and(|org| org_pks.contains(&org));
            if in_allowed_org {
                if let Some(user) = record.int_field(MEMBER_USER_FIELD) {
                    user_pks.insert(user);
                }
            }
        } else if seen_member {
            break;
        }
    }

    let emails: BTreeSet<String> = user_pks
        .iter()
        .filter_map(|pk| user_emails.get(pk).cloned())
        .collect();

    tracing::debug!(
        organizations = org_pks.len(),
        users = user_pks.len(),
        "Built organization scope filters"
    );

    vec![
        requested.clone(),
        Filter::new(kinds.user.clone(), PK_FIELD, user_pks),
        Filter::new(kinds.email.clone(), EMAIL_FIELD, emails),
    ]
}

fn user_filters(records: &[Record], requested: &Filter, kinds: &WellKnownKinds) -> Vec<Filter> {
    let mut emails: BTreeSet<FieldValue> = BTreeSet::new();
    let mut seen_user = false;

    for record in records {
        if record.kind == kinds.user {
            seen_user = true;
            if requested.admits(record) {
                if let Some(email) = record.str_field(EMAIL_FIELD) {
                    emails.insert(FieldValue::from(email));
                }
            }
        } else if seen_user {
            break;
        }
    }

    vec![
        requested.clone(),
        Filter {
            kind: kinds.email.clone(),
            field: EMAIL_FIELD.to_string(),
            values: emails,
        },
    ]
}
