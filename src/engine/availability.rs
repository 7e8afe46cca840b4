use crate::model::*;

use super::Engine;

impl Engine {
    /// Units of `room_type` free for `stay`, in declared `room_numbers`
    /// order — that order is the allocation tie-break, so it must be stable.
    ///
    /// Availability is derived live from each unit's confirmed stays under a
    /// snapshot read lock; no counter is consulted anywhere. A unit missing
    /// from the calendar map has never been booked and is trivially free.
    pub(super) async fn free_units(
        &self,
        room_type: &RoomType,
        stay: &StayRange,
    ) -> Vec<RoomNo> {
        let mut free = Vec::new();
        for &room_no in &room_type.room_numbers {
            match self.unit(room_no) {
                Some(cal) => {
                    if cal.read().await.is_free(stay) {
                        free.push(room_no);
                    }
                }
                None => free.push(room_no),
            }
        }
        free
    }
}
