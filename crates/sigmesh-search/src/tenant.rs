//! Tenant index naming.
//!
//! Each tenant gets its own index table named `{prefix}_{tenant}`. Tenant
//! ids are externally supplied, so the name is sanitized down to a safe
//! SQL identifier before it is ever interpolated into DDL or queries.

use sigmesh_core::{Error, Result};

/// Postgres truncates identifiers beyond this length.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Hex characters of the raw-id hash appended to lossy names.
const HASH_TAG_LEN: usize = 8;

/// Build the index table name for a tenant: `{prefix}_{tenant}`, lowered
/// and with every non `[a-z0-9_]` byte replaced by `_`.
///
/// Sanitization is lossy: distinct raw ids can collapse to the same
/// identifier, and so can truncation to the Postgres limit. Whenever the
/// name no longer round-trips to the raw id, a short hash of the raw id
/// is appended so such tenants never share a table.
pub fn index_name(prefix: &str, tenant_id: &str) -> Result<String> {
    let tenant = sanitize(tenant_id);
    if tenant.is_empty() {
        return Err(Error::InvalidInput(format!(
            "tenant id {tenant_id:?} sanitizes to an empty identifier"
        )));
    }

    let mut name = format!("{}_{}", sanitize(prefix), tenant);
    if tenant != tenant_id || name.len() > MAX_IDENTIFIER_LEN {
        let digest = blake3::hash(tenant_id.as_bytes()).to_hex();
        name.truncate(MAX_IDENTIFIER_LEN - HASH_TAG_LEN - 1);
        name.push('_');
        name.push_str(&digest[..HASH_TAG_LEN]);
    }
    Ok(name)
}

fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
