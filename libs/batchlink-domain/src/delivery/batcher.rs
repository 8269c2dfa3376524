//! Batch construction under a record-count limit and a byte limit
//!
//! Both functions are pure: they keep input order, never emit an empty batch,
//! and never refuse an item. An item larger than the byte limit on its own
//! ends up alone in its batch.

use serde::Serialize;

use super::error::Result;

/// Partition serializable records into consecutive batches
///
/// The byte size of a record is the length of its JSON encoding.
///
/// # Errors
///
/// Returns `DeliveryError::Serialization` if any record cannot be serialized.
/// No batch is produced in that case.
pub fn partition<R: Serialize>(
    records: Vec<R>,
    max_records: usize,
    max_bytes: usize,
) -> Result<Vec<Vec<R>>> {
    let sizes = records
        .iter()
        .map(|record| serde_json::to_vec(record).map(|encoded| encoded.len()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sizes = sizes.into_iter();
    Ok(partition_by(records, max_records, max_bytes, |_| {
        sizes.next().unwrap_or_default()
    }))
}

/// Partition items into consecutive batches using `size_of` to weigh each item
///
/// `size_of` is called exactly once per item, in input order.
pub fn partition_by<T, F>(
    items: Vec<T>,
    max_records: usize,
    max_bytes: usize,
    mut size_of: F,
) -> Vec<Vec<T>>
where
    F: FnMut(&T) -> usize,
{
    let mut batches = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_bytes = 0usize;

    for item in items {
        let item_bytes = size_of(&item);
        let batch_full = current.len() >= max_records;
        let size_exceeds = current_bytes.saturating_add(item_bytes) > max_bytes;

        if !current.is_empty() && (batch_full || size_exceeds) {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }

        current.push(item);
        current_bytes = current_bytes.saturating_add(item_bytes);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
