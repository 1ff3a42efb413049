use super::error::MigrationError;
use super::remote::RemoteHistoryChannel;
use crate::clipboard::item::{now_millis, ClipboardEntry, Provenance};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub copied: usize,
    /// False when the copy landed but the source entries could not be deleted.
    pub source_cleared: bool,
}

/// Re-parent every entry of `from_owner` under `to_owner`.
///
/// The copy batch must commit before anything is deleted. A failed copy aborts with
/// nothing changed. A failed delete leaves duplicates under both owners, which is
/// logged and reported through `source_cleared` but is not an error.
pub async fn migrate_all<R>(
    remote: &R,
    from_owner: &str,
    to_owner: &str,
) -> Result<MigrationReport, MigrationError>
where
    R: RemoteHistoryChannel + ?Sized,
{
    let entries = remote
        .list(from_owner)
        .await
        .map_err(|source| MigrationError::Read {
            from: from_owner.to_string(),
            source,
        })?;

    if entries.is_empty() {
        log::info!("Migration {} -> {}: nothing to migrate", from_owner, to_owner);
        return Ok(MigrationReport {
            copied: 0,
            source_cleared: true,
        });
    }

    let migrated_at = now_millis();
    let copies: Vec<ClipboardEntry> = entries
        .iter()
        .map(|entry| ClipboardEntry {
            owner_id: Some(to_owner.to_string()),
            provenance: Some(Provenance {
                migrated_from: from_owner.to_string(),
                migrated_at,
            }),
            ..entry.clone()
        })
        .collect();

    remote
        .copy_batch(to_owner, &copies)
        .await
        .map_err(|source| MigrationError::Copy {
            from: from_owner.to_string(),
            to: to_owner.to_string(),
            count: copies.len(),
            source,
        })?;

    let ids: Vec<String> = entries.into_iter().map(|e| e.id).collect();
    let source_cleared = match remote.delete_batch(from_owner, &ids).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!(
                "Migration {} -> {}: copied {} entries but could not delete the originals: {}",
                from_owner,
                to_owner,
                ids.len(),
                e
            );
            false
        }
    };

    log::info!(
        "Migration {} -> {}: moved {} entries",
        from_owner,
        to_owner,
        copies.len()
    );
    Ok(MigrationReport {
        copied: copies.len(),
        source_cleared,
    })
}
