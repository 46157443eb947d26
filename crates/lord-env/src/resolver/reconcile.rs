use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{DirectoryWriter, EnvResult, resolver::{Changes, EnvResolver}};

/// Bring `directory` in line with the tenants listed by `resolver`.
///
/// Listing failures abort the pass. Per-tenant load failures are isolated:
/// the tenant keeps its previous row and is reported in no bucket. Every
/// loaded environment is written back, unchanged ones included, with its
/// ordinal id set to its position in the listing and `TENANT_ID` injected.
/// Rows whose keys the backend no longer lists are deleted.
///
/// The pass is not transactional; a failure midway leaves partial state
/// that the next pass repairs.
pub async fn reconcile<R>(resolver: &R, directory: &DirectoryWriter) -> EnvResult<Changes>
where
    R: EnvResolver + ?Sized,
{
    let backend_keys = resolver.list_secrets().await?;
    let stored_keys = directory.keys().await;

    let mut changes = Changes::default();
    for (index, key) in backend_keys.iter().enumerate() {
        let Some(loaded) = resolver.load_secret(key, true).await? else {
            warn!(resolver = resolver.name(), tenant = %key, "tenant skipped, keeping previous state");
            continue;
        };
        let loaded = loaded.with_id(index).with_tenant_id();

        match directory.find(key).await {
            None => changes.created.push(key.clone()),
            Some(current) if current.is_diff(&loaded) => changes.updated.push(key.clone()),
            Some(_) => {}
        }
        directory.store(loaded).await?;
    }

    let listed: HashSet<&str> = backend_keys.iter().map(String::as_str).collect();
    for key in stored_keys {
        if !listed.contains(key.as_str()) {
            directory.delete(&key).await?;
            changes.removed.push(key);
        }
    }

    debug!(resolver = resolver.name(), %changes, "reconciliation pass finished");
    Ok(changes)
}
