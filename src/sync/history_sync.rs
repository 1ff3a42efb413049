use std::collections::HashSet;

use crate::clipboard::item::ClipboardEntry;

/// Local entries the remote snapshot does not already hold, oldest first.
///
/// Content equality is the identity of an entry here: a local entry whose text is
/// already present remotely is the same item, and so are two local entries with
/// the same text.
pub fn unique_local<'a>(
    local: &'a [ClipboardEntry],
    remote: &[ClipboardEntry],
) -> Vec<&'a ClipboardEntry> {
    let mut seen: HashSet<&str> = remote.iter().map(|r| r.content.as_str()).collect();
    let mut unique: Vec<&ClipboardEntry> = local
        .iter()
        .filter(|entry| seen.insert(entry.content.as_str()))
        .collect();
    // Push in capture order so the store's clock keeps their relative order
    unique.reverse();
    unique
}
