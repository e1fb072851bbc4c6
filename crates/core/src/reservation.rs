//! Bed reservations for pending transfers.
//!
//! A reservation is a soft hold on a candidate bed: it never touches the
//! allocation ledger. At most one reservation in `HELD` or `CONFIRMED` state
//! may exist per bed, which is what serialises two concurrent transfer
//! attempts onto the same bed without a ward-wide lock. The hold persists
//! until explicitly confirmed or released; there is no expiry sweep.

use crate::store::{Store, Tables};
use crate::{AdmissionError, AdmissionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Released,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReservationStatus::Held => "HELD",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
        };
        write!(f, "{label}")
    }
}

/// A tentative hold on a bed for one transfer recommendation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferBedReservation {
    pub id: Uuid,
    pub recommendation_id: Uuid,
    pub bed_id: Uuid,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    /// Set when a transfer execution consumed this reservation. A consumed
    /// reservation can no longer be released.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl TransferBedReservation {
    /// Whether this reservation blocks other reservations of the same bed.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ReservationStatus::Held | ReservationStatus::Confirmed
        )
    }
}

/// Outcome of a release call, so callers can distinguish a real release from
/// the idempotent no-op and avoid writing duplicate audit rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

/// The active (`HELD`/`CONFIRMED`) reservation for a bed, if any.
pub(crate) fn active_for_bed(tables: &Tables, bed_id: Uuid) -> Option<&TransferBedReservation> {
    tables
        .reservations
        .values()
        .find(|row| row.bed_id == bed_id && row.is_active())
}

/// The most recent reservation attached to a recommendation, if any.
pub(crate) fn latest_for_recommendation(
    tables: &Tables,
    recommendation_id: Uuid,
) -> Option<&TransferBedReservation> {
    tables
        .reservations
        .values()
        .filter(|row| row.recommendation_id == recommendation_id)
        .max_by_key(|row| row.reserved_at)
}

/// Places a `HELD` reservation on `bed_id` for `recommendation_id`.
///
/// # Errors
///
/// * [`AdmissionError::BedAlreadyReserved`] - the bed already has a
///   `HELD`/`CONFIRMED` reservation
pub(crate) fn reserve(
    tables: &mut Tables,
    recommendation_id: Uuid,
    bed_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<TransferBedReservation> {
    if active_for_bed(tables, bed_id).is_some() {
        return Err(AdmissionError::BedAlreadyReserved { bed_id });
    }

    let reservation = TransferBedReservation {
        id: Uuid::new_v4(),
        recommendation_id,
        bed_id,
        status: ReservationStatus::Held,
        reserved_at: now,
        confirmed_at: None,
        released_at: None,
        consumed_at: None,
    };
    tables
        .reservations
        .insert(reservation.id, reservation.clone());
    Ok(reservation)
}

/// Marks a `HELD` reservation `CONFIRMED`.
///
/// # Errors
///
/// * [`AdmissionError::ReservationNotHeld`] - the reservation is in any other state
pub(crate) fn confirm(
    tables: &mut Tables,
    reservation_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<TransferBedReservation> {
    let row = tables
        .reservations
        .get_mut(&reservation_id)
        .ok_or(AdmissionError::NotFound {
            kind: "reservation",
            id: reservation_id.to_string(),
        })?;

    if row.status != ReservationStatus::Held {
        return Err(AdmissionError::ReservationNotHeld { reservation_id });
    }

    row.status = ReservationStatus::Confirmed;
    row.confirmed_at = Some(now);
    Ok(row.clone())
}

/// Releases a reservation.
///
/// Releasing an already-released reservation is an idempotent no-op, so the
/// rollback path can be retried safely. A reservation consumed by a transfer
/// execution can no longer be released.
///
/// # Errors
///
/// * [`AdmissionError::InvalidReservationState`] - the reservation was consumed
pub(crate) fn release(
    tables: &mut Tables,
    reservation_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<ReleaseOutcome> {
    let row = tables
        .reservations
        .get_mut(&reservation_id)
        .ok_or(AdmissionError::NotFound {
            kind: "reservation",
            id: reservation_id.to_string(),
        })?;

    if row.consumed_at.is_some() {
        return Err(AdmissionError::InvalidReservationState { reservation_id });
    }
    if row.status == ReservationStatus::Released {
        return Ok(ReleaseOutcome::AlreadyReleased);
    }

    row.status = ReservationStatus::Released;
    row.released_at = Some(now);
    Ok(ReleaseOutcome::Released)
}

/// Marks a `CONFIRMED` reservation consumed by a transfer execution.
///
/// # Errors
///
/// * [`AdmissionError::ReservationNotConfirmed`] - the reservation is not `CONFIRMED`
pub(crate) fn consume(
    tables: &mut Tables,
    reservation_id: Uuid,
    now: DateTime<Utc>,
) -> AdmissionResult<TransferBedReservation> {
    let row = tables
        .reservations
        .get_mut(&reservation_id)
        .ok_or(AdmissionError::NotFound {
            kind: "reservation",
            id: reservation_id.to_string(),
        })?;

    if row.status != ReservationStatus::Confirmed {
        return Err(AdmissionError::ReservationNotConfirmed { reservation_id });
    }

    row.status = ReservationStatus::Released;
    row.released_at = Some(now);
    row.consumed_at = Some(now);
    Ok(row.clone())
}

/// Read-side service over the reservation table.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<Store>,
}

impl ReservationManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The active reservation for a bed, if any.
    pub fn active_reservation_for_bed(&self, bed_id: Uuid) -> Option<TransferBedReservation> {
        let tables = self.store.read();
        active_for_bed(&tables, bed_id).cloned()
    }

    /// The most recent reservation attached to a recommendation, if any.
    pub fn reservation_for_recommendation(
        &self,
        recommendation_id: Uuid,
    ) -> Option<TransferBedReservation> {
        let tables = self.store.read();
        latest_for_recommendation(&tables, recommendation_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_rejects_already_held_bed() {
        let store = Store::new();
        let mut tables = store.write();
        let bed = Uuid::new_v4();
        let now = Utc::now();

        reserve(&mut tables, Uuid::new_v4(), bed, now).expect("first hold should succeed");
        let err = reserve(&mut tables, Uuid::new_v4(), bed, now)
            .expect_err("exactly one of two holds on the same bed may win");
        assert!(matches!(err, AdmissionError::BedAlreadyReserved { .. }));
    }

    #[test]
    fn test_confirmed_reservation_still_blocks_the_bed() {
        let store = Store::new();
        let mut tables = store.write();
        let bed = Uuid::new_v4();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), bed, now).expect("hold should succeed");
        confirm(&mut tables, held.id, now).expect("confirm should succeed");

        let err = reserve(&mut tables, Uuid::new_v4(), bed, now)
            .expect_err("a CONFIRMED reservation still blocks the bed");
        assert!(matches!(err, AdmissionError::BedAlreadyReserved { .. }));
    }

    #[test]
    fn test_confirm_requires_held_state() {
        let store = Store::new();
        let mut tables = store.write();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), Uuid::new_v4(), now)
            .expect("hold should succeed");
        release(&mut tables, held.id, now).expect("release should succeed");

        let err = confirm(&mut tables, held.id, now)
            .expect_err("only a HELD reservation can be confirmed");
        assert!(matches!(err, AdmissionError::ReservationNotHeld { .. }));
    }

    #[test]
    fn test_release_is_idempotent_until_consumed() {
        let store = Store::new();
        let mut tables = store.write();
        let bed = Uuid::new_v4();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), bed, now).expect("hold should succeed");
        assert_eq!(
            release(&mut tables, held.id, now).expect("release should succeed"),
            ReleaseOutcome::Released
        );
        assert_eq!(
            release(&mut tables, held.id, now).expect("double release is a no-op"),
            ReleaseOutcome::AlreadyReleased
        );

        // The bed is reservable again once the hold is gone.
        reserve(&mut tables, Uuid::new_v4(), bed, now).expect("bed is free to hold again");
    }

    #[test]
    fn test_release_rejected_after_consumption() {
        let store = Store::new();
        let mut tables = store.write();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), Uuid::new_v4(), now)
            .expect("hold should succeed");
        confirm(&mut tables, held.id, now).expect("confirm should succeed");
        consume(&mut tables, held.id, now).expect("consume should succeed");

        let err = release(&mut tables, held.id, now)
            .expect_err("a consumed reservation cannot be released");
        assert!(matches!(err, AdmissionError::InvalidReservationState { .. }));
    }

    #[test]
    fn test_consume_requires_confirmed_state() {
        let store = Store::new();
        let mut tables = store.write();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), Uuid::new_v4(), now)
            .expect("hold should succeed");
        let err = consume(&mut tables, held.id, now)
            .expect_err("a HELD reservation cannot be consumed");
        assert!(matches!(err, AdmissionError::ReservationNotConfirmed { .. }));
    }

    #[test]
    fn test_rollback_release_of_confirmed_reservation_is_allowed() {
        let store = Store::new();
        let mut tables = store.write();
        let bed = Uuid::new_v4();
        let now = Utc::now();

        let held = reserve(&mut tables, Uuid::new_v4(), bed, now).expect("hold should succeed");
        confirm(&mut tables, held.id, now).expect("confirm should succeed");
        assert_eq!(
            release(&mut tables, held.id, now)
                .expect("abandoning before execution releases the confirmed hold"),
            ReleaseOutcome::Released
        );
    }
}
