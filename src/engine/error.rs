use chrono::NaiveDate;

use crate::model::{BookingId, RoomNo, RoomTypeId};

#[derive(Debug)]
pub enum EngineError {
    // Validation — reported to the caller, never retried.
    InvalidDateFormat(String),
    PastDate(NaiveDate),
    TooFarAhead(NaiveDate),
    InvalidRange,
    StayLengthOutOfBounds {
        nights: i64,
        min_nights: u32,
        max_nights: u32,
    },
    CapacityExceeded {
        adults: u32,
        children: u32,
    },
    LimitExceeded(&'static str),

    // Not found.
    RoomTypeNotFound(RoomTypeId),
    BookingNotFound(BookingId),

    // Conflict.
    AlreadyExists(RoomTypeId),
    /// A concurrent allocation committed this unit first. Consumed by the
    /// retry loop in `create_booking`; callers only see the variants below.
    UnitConflict(RoomNo),
    NoUnitsAvailable,
    AllocationRaceExhausted,
    AlreadyCancelled(BookingId),

    // Storage — fatal for the call.
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidDateFormat(s) => write!(f, "invalid date: {s:?}"),
            EngineError::PastDate(d) => write!(f, "date {d} is in the past"),
            EngineError::TooFarAhead(d) => {
                write!(f, "date {d} is beyond the booking horizon")
            }
            EngineError::InvalidRange => {
                write!(f, "check-out must be after check-in")
            }
            EngineError::StayLengthOutOfBounds {
                nights,
                min_nights,
                max_nights,
            } => write!(
                f,
                "stay of {nights} nights outside allowed {min_nights}..={max_nights}"
            ),
            EngineError::CapacityExceeded { adults, children } => write!(
                f,
                "party of {adults} adults / {children} children exceeds room capacity"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::RoomTypeNotFound(id) => write!(f, "room type not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => {
                write!(f, "room type already exists: {id}")
            }
            EngineError::UnitConflict(room_no) => {
                write!(f, "unit {room_no} was booked concurrently")
            }
            EngineError::NoUnitsAvailable => write!(f, "no units available"),
            EngineError::AllocationRaceExhausted => {
                write!(f, "allocation retries exhausted")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "booking {id} is already cancelled")
            }
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
