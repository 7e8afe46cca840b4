use chrono::{NaiveDate, Utc};
use tokio::sync::oneshot;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, WalCommand, normalize_email, policy};

impl Engine {
    // ── Room type catalog (admin path) ───────────────────────

    pub async fn create_room_type(&self, room_type: RoomType) -> Result<(), EngineError> {
        policy::validate_room_type(&room_type)?;
        if self.catalog.len() >= MAX_ROOM_TYPES {
            return Err(EngineError::LimitExceeded("too many room types"));
        }
        if self.catalog.contains_key(&room_type.id) {
            return Err(EngineError::AlreadyExists(room_type.id));
        }

        let event = Event::RoomTypeCreated {
            room_type: room_type.clone(),
        };
        self.wal_append(&event).await?;
        self.ensure_units(&room_type);
        self.catalog.insert(room_type.id, room_type);
        Ok(())
    }

    /// Replaces the catalog entry. Existing bookings keep their denormalized
    /// name and price — edits never rewrite history.
    pub async fn update_room_type(&self, room_type: RoomType) -> Result<(), EngineError> {
        policy::validate_room_type(&room_type)?;
        if !self.catalog.contains_key(&room_type.id) {
            return Err(EngineError::RoomTypeNotFound(room_type.id));
        }

        let event = Event::RoomTypeUpdated {
            room_type: room_type.clone(),
        };
        self.wal_append(&event).await?;
        self.ensure_units(&room_type);
        self.catalog.insert(room_type.id, room_type);
        Ok(())
    }

    /// Removes the type from the catalog. Unit calendars and booking history
    /// stay behind; bookings are never physically deleted.
    pub async fn delete_room_type(&self, id: RoomTypeId) -> Result<(), EngineError> {
        if !self.catalog.contains_key(&id) {
            return Err(EngineError::RoomTypeNotFound(id));
        }
        self.wal_append(&Event::RoomTypeDeleted { id }).await?;
        self.catalog.remove(&id);
        Ok(())
    }

    // ── Allocation ───────────────────────────────────────────

    /// Allocate a unit and commit the booking.
    ///
    /// Validation order: dates, room type, stay length, capacity. Then up to
    /// `MAX_ALLOCATION_ATTEMPTS` rounds of scan-and-commit: the free-unit
    /// scan is optimistic, and a round is lost only when another caller
    /// commits the chosen unit between our scan and our write lock.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_booking(
        &self,
        room_type_id: RoomTypeId,
        check_in: &str,
        check_out: &str,
        user_name: &str,
        email: &str,
        adults: u32,
        children: u32,
        today: NaiveDate,
    ) -> Result<Booking, EngineError> {
        let stay = policy::parse_stay(check_in, check_out, today)?;
        policy::check_guest_fields(user_name, email)?;
        let room_type = self.room_type(room_type_id)?;
        policy::check_stay_length(&room_type, stay.nights())?;
        policy::check_party_fits(&room_type, adults, children)?;

        let email = normalize_email(email);
        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            if attempt > 0 {
                metrics::counter!(crate::observability::ALLOCATION_RETRIES_TOTAL).increment(1);
            }
            let free = self.free_units(&room_type, &stay).await;
            let Some(&room_no) = free.first() else {
                return Err(EngineError::NoUnitsAvailable);
            };
            match self
                .commit_booking(&room_type, room_no, stay, user_name, &email, adults, children)
                .await
            {
                Err(EngineError::UnitConflict(_)) => continue,
                other => return other,
            }
        }
        Err(EngineError::AllocationRaceExhausted)
    }

    /// The atomic check-and-insert: overlap check, id issuance, WAL append
    /// and calendar insert all happen under the unit's write guard, so two
    /// racing callers can never both commit overlapping stays on one unit.
    #[allow(clippy::too_many_arguments)]
    async fn commit_booking(
        &self,
        room_type: &RoomType,
        room_no: RoomNo,
        stay: StayRange,
        user_name: &str,
        email: &str,
        adults: u32,
        children: u32,
    ) -> Result<Booking, EngineError> {
        let cal = self.ensure_unit(room_no);
        let mut guard = cal.write().await;
        if !guard.is_free(&stay) {
            return Err(EngineError::UnitConflict(room_no));
        }

        let nights = stay.nights();
        let booking = Booking {
            booking_id: self.issue_booking_id(),
            room_type_id: room_type.id,
            room_name: room_type.name.clone(),
            room_no,
            stay,
            nights,
            user_name: user_name.to_string(),
            email: email.to_string(),
            adults,
            children,
            total_price: room_type.pricing.total * nights as f64,
            currency: room_type.pricing.currency.clone(),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };

        // A failed append leaves no visible record: the calendar and the
        // booking map are only touched after the WAL accepted the event.
        let event = Event::BookingConfirmed {
            booking: booking.clone(),
        };
        self.wal_append(&event).await?;
        guard.insert_stay(Stay {
            booking_id: booking.booking_id,
            range: stay,
        });
        drop(guard);
        self.record_booking(booking.clone());
        Ok(booking)
    }

    // ── Cancellation ─────────────────────────────────────────

    /// Flip a booking to cancelled and free its unit. One-way: cancelling an
    /// already-cancelled booking is reported, never silently accepted.
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<(), EngineError> {
        let room_no = self
            .bookings
            .get(&booking_id)
            .map(|b| b.room_no)
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        let cal = self.ensure_unit(room_no);
        let mut guard = cal.write().await;

        // Re-check under the unit guard so two concurrent cancels serialize
        // and the loser sees AlreadyCancelled.
        {
            let booking = self
                .bookings
                .get(&booking_id)
                .ok_or(EngineError::BookingNotFound(booking_id))?;
            if booking.status == BookingStatus::Cancelled {
                return Err(EngineError::AlreadyCancelled(booking_id));
            }
        }

        self.wal_append(&Event::BookingCancelled { booking_id })
            .await?;
        guard.remove_stay(booking_id);
        if let Some(mut booking) = self.bookings.get_mut(&booking_id) {
            booking.status = BookingStatus::Cancelled;
        }
        Ok(())
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with the minimal event set recreating current state:
    /// one create per room type, one confirm per booking (cancelled history
    /// travels inside the booking record).
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut room_types: Vec<RoomType> =
            self.catalog.iter().map(|e| e.value().clone()).collect();
        room_types.sort_by_key(|rt| rt.id);

        let mut bookings: Vec<Booking> =
            self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| b.booking_id);

        let mut events = Vec::with_capacity(room_types.len() + bookings.len());
        events.extend(
            room_types
                .into_iter()
                .map(|room_type| Event::RoomTypeCreated { room_type }),
        );
        events.extend(
            bookings
                .into_iter()
                .map(|booking| Event::BookingConfirmed { booking }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
