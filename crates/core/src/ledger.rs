//! Bed allocation ledger.
//!
//! Tracks the committed bed-to-admission binding. A bed has at most one
//! un-released allocation at any time, and so does an admission; moving beds
//! is always release-then-allocate inside one unit of work, never two
//! simultaneous actives. Rows are released logically by setting `released_at`
//! and are never removed, preserving occupancy history.
//!
//! The mutating operations work on [`Tables`] so that composite workflows
//! (shift-to-ward, transfer execution) can run them together with the status
//! change under a single write guard. [`BedLedger`] is the read surface.

use crate::store::{Store, Tables};
use crate::{AdmissionError, AdmissionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One row of the allocation ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BedAllocation {
    pub id: Uuid,
    pub bed_id: Uuid,
    pub admission_id: Uuid,
    pub allocated_at: DateTime<Utc>,
    /// `None` while the allocation is active.
    pub released_at: Option<DateTime<Utc>>,
}

impl BedAllocation {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

/// The active allocation for a bed, if any.
pub(crate) fn active_for_bed(tables: &Tables, bed_id: Uuid) -> Option<&BedAllocation> {
    tables
        .allocations
        .iter()
        .find(|row| row.bed_id == bed_id && row.is_active())
}

/// The active allocation for an admission, if any.
pub(crate) fn active_for_admission(
    tables: &Tables,
    admission_id: Uuid,
) -> Option<&BedAllocation> {
    tables
        .allocations
        .iter()
        .find(|row| row.admission_id == admission_id && row.is_active())
}

/// Creates an active allocation binding `bed_id` to `admission_id`.
///
/// # Errors
///
/// * [`AdmissionError::BedAlreadyOccupied`] - the bed has an active allocation
/// * [`AdmissionError::AdmissionAlreadyHasBed`] - the admission holds a bed elsewhere
pub(crate) fn allocate(
    tables: &mut Tables,
    bed_id: Uuid,
    admission_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<BedAllocation> {
    if active_for_bed(tables, bed_id).is_some() {
        return Err(AdmissionError::BedAlreadyOccupied { bed_id });
    }
    if active_for_admission(tables, admission_id).is_some() {
        return Err(AdmissionError::AdmissionAlreadyHasBed { admission_id });
    }

    let allocation = BedAllocation {
        id: Uuid::new_v4(),
        bed_id,
        admission_id,
        allocated_at: now,
        released_at: None,
    };
    tables.allocations.push(allocation.clone());
    Ok(allocation)
}

/// Releases the active allocation for `bed_id`.
///
/// Releasing a bed with no active allocation is an error, not a silent no-op:
/// it usually signals a workflow bug in the caller.
///
/// # Errors
///
/// * [`AdmissionError::NoActiveAllocation`] - the bed has no active allocation
pub(crate) fn release(
    tables: &mut Tables,
    bed_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<BedAllocation> {
    let row = tables
        .allocations
        .iter_mut()
        .find(|row| row.bed_id == bed_id && row.is_active())
        .ok_or(AdmissionError::NoActiveAllocation { bed_id })?;

    row.released_at = Some(now);
    Ok(row.clone())
}

/// Read-side service over the allocation ledger.
#[derive(Clone)]
pub struct BedLedger {
    store: Arc<Store>,
}

impl BedLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The active allocation for a bed, if any.
    pub fn active_allocation_for_bed(&self, bed_id: Uuid) -> Option<BedAllocation> {
        let tables = self.store.read();
        active_for_bed(&tables, bed_id).cloned()
    }

    /// The active allocation for an admission, if any.
    pub fn active_allocation_for_admission(&self, admission_id: Uuid) -> Option<BedAllocation> {
        let tables = self.store.read();
        active_for_admission(&tables, admission_id).cloned()
    }

    /// Full occupancy history for a bed, newest first.
    pub fn history_for_bed(&self, bed_id: Uuid) -> Vec<BedAllocation> {
        let tables = self.store.read();
        let mut rows: Vec<BedAllocation> = tables
            .allocations
            .iter()
            .filter(|row| row.bed_id == bed_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.allocated_at.cmp(&a.allocated_at));
        rows
    }
}
