use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;

/// Longest accepted request line. Anything larger is a protocol error.
const MAX_LINE_LEN: usize = 64 * 1024;

/// The protocol surface: one JSON object per line, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateRoomType {
        room_type: RoomType,
    },
    UpdateRoomType {
        room_type: RoomType,
    },
    DeleteRoomType {
        id: RoomTypeId,
    },
    GetRoomType {
        id: RoomTypeId,
    },
    ListRoomTypes,
    GetAvailability {
        room_type_id: RoomTypeId,
        check_in: String,
        check_out: String,
        adults: u32,
        children: u32,
    },
    CreateBooking {
        room_type_id: RoomTypeId,
        check_in: String,
        check_out: String,
        user_name: String,
        email: String,
        adults: u32,
        children: u32,
    },
    CancelBooking {
        booking_id: BookingId,
    },
    GetBooking {
        booking_id: BookingId,
    },
    ListBookings,
    BookingsByEmail {
        email: String,
    },
}

fn ok_line(data: Value) -> String {
    json!({ "ok": true, "data": data }).to_string()
}

fn err_line(code: &str, message: impl std::fmt::Display) -> String {
    json!({ "ok": false, "error": { "code": code, "message": message.to_string() } })
        .to_string()
}

/// Stable error code per engine error variant; clients match on these, not
/// on the human-readable message.
pub fn error_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidDateFormat(_) => "invalid_date_format",
        EngineError::PastDate(_) => "past_date",
        EngineError::TooFarAhead(_) => "too_far_ahead",
        EngineError::InvalidRange => "invalid_range",
        EngineError::StayLengthOutOfBounds { .. } => "stay_length_out_of_bounds",
        EngineError::CapacityExceeded { .. } => "capacity_exceeded",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::RoomTypeNotFound(_) => "room_type_not_found",
        EngineError::BookingNotFound(_) => "booking_not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::UnitConflict(_) => "conflict",
        EngineError::NoUnitsAvailable => "no_units_available",
        EngineError::AllocationRaceExhausted => "allocation_race_exhausted",
        EngineError::AlreadyCancelled(_) => "already_cancelled",
        EngineError::WalError(_) => "storage_error",
    }
}

async fn dispatch(engine: &Engine, req: Request) -> Result<Value, EngineError> {
    // The engine never reads the clock for policy decisions; the current
    // date enters here, once per request.
    let today = Utc::now().date_naive();

    match req {
        Request::CreateRoomType { room_type } => {
            let id = room_type.id;
            engine.create_room_type(room_type).await?;
            Ok(json!({ "id": id }))
        }
        Request::UpdateRoomType { room_type } => {
            let id = room_type.id;
            engine.update_room_type(room_type).await?;
            Ok(json!({ "id": id }))
        }
        Request::DeleteRoomType { id } => {
            engine.delete_room_type(id).await?;
            Ok(json!({ "id": id }))
        }
        Request::GetRoomType { id } => {
            let room_type = engine.get_room_type(id)?;
            Ok(serde_json::to_value(room_type).expect("room type serializes"))
        }
        Request::ListRoomTypes => {
            Ok(serde_json::to_value(engine.list_room_types()).expect("room types serialize"))
        }
        Request::GetAvailability {
            room_type_id,
            check_in,
            check_out,
            adults,
            children,
        } => {
            let view = engine
                .get_available_units(room_type_id, &check_in, &check_out, adults, children, today)
                .await?;
            Ok(serde_json::to_value(view).expect("view serializes"))
        }
        Request::CreateBooking {
            room_type_id,
            check_in,
            check_out,
            user_name,
            email,
            adults,
            children,
        } => {
            let booking = engine
                .create_booking(
                    room_type_id,
                    &check_in,
                    &check_out,
                    &user_name,
                    &email,
                    adults,
                    children,
                    today,
                )
                .await?;
            Ok(serde_json::to_value(booking).expect("booking serializes"))
        }
        Request::CancelBooking { booking_id } => {
            engine.cancel_booking(booking_id).await?;
            Ok(json!({ "booking_id": booking_id, "status": "cancelled" }))
        }
        Request::GetBooking { booking_id } => {
            let booking = engine.find_booking(booking_id)?;
            Ok(serde_json::to_value(booking).expect("booking serializes"))
        }
        Request::ListBookings => {
            Ok(serde_json::to_value(engine.list_bookings()).expect("bookings serialize"))
        }
        Request::BookingsByEmail { email } => {
            Ok(serde_json::to_value(engine.bookings_by_email(&email))
                .expect("bookings serialize"))
        }
    }
}

/// Drive one client connection until EOF. Malformed input gets an error
/// response and the connection stays open.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                let op = observability::op_label(&req);
                let started = Instant::now();
                let result = dispatch(&engine, req).await;
                metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
                    .record(started.elapsed().as_secs_f64());
                match result {
                    Ok(data) => {
                        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "ok")
                            .increment(1);
                        ok_line(data)
                    }
                    Err(e) => {
                        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "error")
                            .increment(1);
                        tracing::debug!("request failed: {e}");
                        err_line(error_code(&e), e)
                    }
                }
            }
            Err(e) => err_line("bad_request", e),
        };

        framed.send(reply).await?;
    }

    Ok(())
}
