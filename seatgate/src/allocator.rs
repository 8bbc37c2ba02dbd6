//! First-fit seat allocation
//!
//! Seats are scanned row-major from (1,1) on every call, skipping seats
//! already held by current members, and students take them in batch order.
//! The whole check-plan-apply sequence runs under the room's lock; each
//! individual placement is additionally a conditional write so a student
//! can never end up in two rooms.
//!
//! Placements are applied one by one and are not rolled back: when the
//! grid runs out mid-batch, the students already placed keep their seats.

use std::collections::HashSet;

use seatgate_common::db::{Room, SeatPosition, Student};
use seatgate_common::events::{EventBus, ExamEvent};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::credential::CredentialService;
use crate::db::{self, rooms, students};
use crate::error::{ApiError, ApiResult};
use crate::locks::KeyedLocks;

/// Result of the pure seat planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatPlan {
    pub placements: Vec<(String, SeatPosition)>,
    /// Students left over once the grid was exhausted, in batch order
    pub unplaced: Vec<String>,
}

/// Free seats of a `rows` × `columns` grid in row-major order
pub fn free_seats(
    rows: u32,
    columns: u32,
    occupied: &HashSet<SeatPosition>,
) -> impl Iterator<Item = SeatPosition> + '_ {
    (1..=rows)
        .flat_map(move |row| (1..=columns).map(move |column| SeatPosition::new(row, column)))
        .filter(move |seat| !occupied.contains(seat))
}

/// Pair each student with the next free seat
pub fn plan_seats(room: &Room, occupied: &HashSet<SeatPosition>, batch: &[String]) -> SeatPlan {
    let rows = u32::try_from(room.rows).unwrap_or(0);
    let columns = u32::try_from(room.columns).unwrap_or(0);

    let mut seats = free_seats(rows, columns, occupied);
    let mut placements = Vec::with_capacity(batch.len());
    let mut unplaced = Vec::new();

    for student_id in batch {
        match seats.next() {
            Some(seat) => placements.push((student_id.clone(), seat)),
            None => unplaced.push(student_id.clone()),
        }
    }

    SeatPlan {
        placements,
        unplaced,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub student_id: String,
    pub roll_number: String,
    pub seat: SeatPosition,
}

/// Successful allocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    pub room_id: String,
    pub room_number: String,
    pub placements: Vec<Placement>,
    /// Placed students whose credential could not be regenerated
    pub credential_failures: Vec<String>,
}

/// Assigns batches of students to seats inside one room
#[derive(Clone, Debug)]
pub struct SeatAllocator {
    db: SqlitePool,
    locks: KeyedLocks,
    credentials: CredentialService,
    bus: EventBus,
}

impl SeatAllocator {
    pub fn new(db: SqlitePool, locks: KeyedLocks, credentials: CredentialService, bus: EventBus) -> Self {
        Self {
            db,
            locks,
            credentials,
            bus,
        }
    }

    /// Place `batch` into `room_id`
    ///
    /// # Errors
    ///
    /// * `Validation` - empty batch or duplicate ids
    /// * `NotFound` - room or any student absent
    /// * `Conflict` - a student is already assigned (nothing placed), or
    ///   was assigned concurrently while applying (earlier placements stay)
    /// * `Capacity` - batch larger than the room's free seats (nothing placed)
    /// * `InsufficientSeats` - grid exhausted mid-batch (placed students stay)
    pub async fn allocate(&self, room_id: &str, batch: &[String]) -> ApiResult<AllocationOutcome> {
        validate_batch(batch)?;

        let guard = self.locks.lock(room_id).await;

        let Some(room) = rooms::get_room(&self.db, room_id).await? else {
            drop(guard);
            self.locks.forget(room_id);
            return Err(ApiError::NotFound("Room not found".to_string()));
        };

        let found = students::get_students_by_ids(&self.db, batch).await?;
        if found.len() != batch.len() {
            let known: HashSet<&str> = found.iter().map(|s| s.id.as_str()).collect();
            let missing: Vec<&str> = batch
                .iter()
                .map(String::as_str)
                .filter(|id| !known.contains(id))
                .collect();
            return Err(ApiError::NotFound(format!(
                "Students not found: {}",
                missing.join(", ")
            )));
        }

        if found.iter().any(|s| s.room_id.is_some()) {
            return Err(ApiError::Conflict(
                "Some students are already assigned to rooms".to_string(),
            ));
        }

        let members = students::list_members(&self.db, room_id).await?;
        let available = room.capacity - members.len() as i64;
        if batch.len() as i64 > available {
            return Err(ApiError::Capacity {
                message: format!(
                    "Room has only {} available seats, but {} students selected",
                    available.max(0),
                    batch.len()
                ),
                available: available.max(0),
                requested: batch.len(),
            });
        }

        let occupied: HashSet<SeatPosition> = members
            .iter()
            .filter_map(|m| m.seat_position)
            .collect();
        let plan = plan_seats(&room, &occupied, batch);

        let (applied, failure) = self.apply_plan(room_id, &plan, &found).await;
        drop(guard);

        for placement in &applied {
            self.bus.emit_lossy(ExamEvent::SeatAssigned {
                student_id: placement.student_id.clone(),
                room_id: room_id.to_string(),
                seat: placement.seat,
                timestamp: seatgate_common::time::now(),
            });
        }

        let mut credential_failures = Vec::new();
        for placement in &applied {
            if let Err(e) = self.credentials.issue(&placement.student_id).await {
                warn!(
                    "Credential regeneration failed for student {}: {}",
                    placement.student_id, e
                );
                credential_failures.push(placement.student_id.clone());
            }
        }

        info!(
            "Allocated {} of {} students to room {}",
            applied.len(),
            batch.len(),
            room.room_number
        );

        if let Some(err) = failure {
            return Err(err);
        }
        if !plan.unplaced.is_empty() {
            return Err(ApiError::InsufficientSeats {
                placed: applied.len(),
                requested: batch.len(),
            });
        }

        Ok(AllocationOutcome {
            room_id: room.id,
            room_number: room.room_number,
            placements: applied,
            credential_failures,
        })
    }

    /// Write planned placements in order, stopping at the first failure
    ///
    /// Placements written before the failure are kept and returned.
    async fn apply_plan(
        &self,
        room_id: &str,
        plan: &SeatPlan,
        batch: &[Student],
    ) -> (Vec<Placement>, Option<ApiError>) {
        let mut applied = Vec::with_capacity(plan.placements.len());

        for (student_id, seat) in &plan.placements {
            let now = seatgate_common::time::now();
            match students::assign_seat(&self.db, student_id, room_id, *seat, now).await {
                Ok(true) => {
                    let roll_number = batch
                        .iter()
                        .find(|s| &s.id == student_id)
                        .map(|s| s.roll_number.clone())
                        .unwrap_or_default();
                    applied.push(Placement {
                        student_id: student_id.clone(),
                        roll_number,
                        seat: *seat,
                    });
                }
                Ok(false) => {
                    let err = ApiError::Conflict(format!(
                        "Student {} was assigned concurrently",
                        student_id
                    ));
                    return (applied, Some(err));
                }
                Err(e) if db::is_unique_violation(&e) => {
                    let err = ApiError::Conflict(format!("Seat {} is already taken", seat));
                    return (applied, Some(err));
                }
                Err(e) => return (applied, Some(e.into())),
            }
        }

        (applied, None)
    }
}

fn validate_batch(batch: &[String]) -> ApiResult<()> {
    if batch.is_empty() {
        return Err(ApiError::Validation(
            "Please provide room ID and student IDs".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(batch.len());
    for id in batch {
        if !seen.insert(id.as_str()) {
            return Err(ApiError::Validation(format!(
                "Duplicate student id in batch: {}",
                id
            )));
        }
    }
    Ok(())
}
