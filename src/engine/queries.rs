use chrono::NaiveDate;

use crate::model::*;

use super::{Engine, EngineError, normalize_email, policy};

impl Engine {
    pub fn get_room_type(&self, id: RoomTypeId) -> Result<RoomType, EngineError> {
        self.room_type(id)
    }

    pub fn list_room_types(&self) -> Vec<RoomType> {
        let mut room_types: Vec<RoomType> =
            self.catalog.iter().map(|e| e.value().clone()).collect();
        room_types.sort_by_key(|rt| rt.id);
        room_types
    }

    /// The availability query: the room-type profile with `free_units`
    /// reduced to units bookable for the requested range. An empty
    /// `free_units` is a valid answer, not an error.
    pub async fn get_available_units(
        &self,
        room_type_id: RoomTypeId,
        check_in: &str,
        check_out: &str,
        adults: u32,
        children: u32,
        today: NaiveDate,
    ) -> Result<RoomTypeView, EngineError> {
        let stay = policy::parse_stay(check_in, check_out, today)?;
        let room_type = self.room_type(room_type_id)?;
        policy::check_party_fits(&room_type, adults, children)?;

        let free = self.free_units(&room_type, &stay).await;
        Ok(RoomTypeView::of(&room_type, free))
    }

    pub fn find_booking(&self, booking_id: BookingId) -> Result<Booking, EngineError> {
        self.bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    pub fn list_bookings(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> =
            self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| b.booking_id);
        bookings
    }

    /// Guest lookup, case-normalized the same way bookings are stored.
    pub fn bookings_by_email(&self, email: &str) -> Vec<Booking> {
        let key = normalize_email(email);
        let ids = match self.by_email.get(&key) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.bookings.get(id).map(|b| b.value().clone()))
            .collect()
    }
}
