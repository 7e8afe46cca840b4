use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type RoomTypeId = u32;
/// Physical unit identifier (a concrete room door).
pub type RoomNo = u32;
pub type BookingId = u64;

/// Half-open stay interval `[check_in, check_out)` over calendar dates.
///
/// The half-open form makes same-day turnover non-conflicting: a stay ending
/// on day D and a stay starting on day D never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "check_in must precede check_out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// The one overlap predicate. Every query and commit path goes through
    /// this; no call site re-derives the boundary comparison.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    #[allow(dead_code)]
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }
}

/// Party maxima for a room type, not minima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub adults: u32,
    pub children: u32,
}

impl Capacity {
    pub fn fits(&self, adults: u32, children: u32) -> bool {
        adults <= self.adults && children <= self.children
    }
}

/// Nightly rate. `total` is the per-night price a stay is billed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub base: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
}

/// A bookable class of rooms backed by one or more physical units.
///
/// `room_numbers` order is meaningful: allocation picks the first free unit
/// in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub name: String,
    pub capacity: Capacity,
    pub amenities: Vec<String>,
    pub min_nights: u32,
    pub max_nights: u32,
    pub pricing: Pricing,
    pub room_numbers: Vec<RoomNo>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub refund_policy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// A reservation of one physical unit. Never physically deleted; cancellation
/// flips `status` and the record stays as history.
///
/// `room_name`, `total_price` and `currency` are denormalized at creation
/// time — later room-type edits do not rewrite existing bookings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: BookingId,
    pub room_type_id: RoomTypeId,
    pub room_name: String,
    pub room_no: RoomNo,
    pub stay: StayRange,
    pub nights: i64,
    pub user_name: String,
    /// Stored lower-cased; lookups normalize the same way.
    pub email: String,
    pub adults: u32,
    pub children: u32,
    pub total_price: f64,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// One confirmed occupation of a unit, as indexed on the unit's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stay {
    pub booking_id: BookingId,
    pub range: StayRange,
}

/// A physical unit's confirmed stays, sorted by check-in date.
///
/// This is the atomicity scope of the allocation engine: conflict check and
/// insert happen under one write lock on the calendar.
#[derive(Debug, Clone)]
pub struct UnitCalendar {
    pub room_no: RoomNo,
    pub stays: Vec<Stay>,
}

impl UnitCalendar {
    pub fn new(room_no: RoomNo) -> Self {
        Self {
            room_no,
            stays: Vec::new(),
        }
    }

    /// Insert keeping sort order by check-in.
    pub fn insert_stay(&mut self, stay: Stay) {
        let pos = self
            .stays
            .binary_search_by_key(&stay.range.check_in, |s| s.range.check_in)
            .unwrap_or_else(|e| e);
        self.stays.insert(pos, stay);
    }

    pub fn remove_stay(&mut self, booking_id: BookingId) -> Option<Stay> {
        self.stays
            .iter()
            .position(|s| s.booking_id == booking_id)
            .map(|pos| self.stays.remove(pos))
    }

    /// Stays overlapping the query window. Binary search skips everything
    /// checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &StayRange) -> impl Iterator<Item = &Stay> {
        let right_bound = self
            .stays
            .partition_point(|s| s.range.check_in < query.check_out);
        self.stays[..right_bound]
            .iter()
            .filter(move |s| s.range.check_out > query.check_in)
    }

    pub fn is_free(&self, query: &StayRange) -> bool {
        self.overlapping(query).next().is_none()
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomTypeCreated { room_type: RoomType },
    RoomTypeUpdated { room_type: RoomType },
    RoomTypeDeleted { id: RoomTypeId },
    /// Carries the full record including status, so compaction can replay
    /// cancelled history from a single event.
    BookingConfirmed { booking: Booking },
    BookingCancelled { booking_id: BookingId },
}

// ── Query result types ───────────────────────────────────────────

/// Room-type view answering an availability query: the catalog profile with
/// `free_units` holding only the units bookable for the requested range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTypeView {
    pub id: RoomTypeId,
    pub name: String,
    pub capacity: Capacity,
    pub amenities: Vec<String>,
    pub min_nights: u32,
    pub max_nights: u32,
    pub pricing: Pricing,
    pub free_units: Vec<RoomNo>,
    pub image_url: Option<String>,
    pub refund_policy: Option<String>,
}

impl RoomTypeView {
    pub fn of(room_type: &RoomType, free_units: Vec<RoomNo>) -> Self {
        Self {
            id: room_type.id,
            name: room_type.name.clone(),
            capacity: room_type.capacity,
            amenities: room_type.amenities.clone(),
            min_nights: room_type.min_nights,
            max_nights: room_type.max_nights,
            pricing: room_type.pricing.clone(),
            free_units,
            image_url: room_type.image_url.clone(),
            refund_policy: room_type.refund_policy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(check_in: &str, check_out: &str) -> StayRange {
        StayRange::new(d(check_in), d(check_out))
    }

    fn stay(id: BookingId, check_in: &str, check_out: &str) -> Stay {
        Stay {
            booking_id: id,
            range: range(check_in, check_out),
        }
    }

    #[test]
    fn stay_range_basics() {
        let r = range("2024-06-01", "2024-06-04");
        assert_eq!(r.nights(), 3);
        assert!(r.contains_day(d("2024-06-01")));
        assert!(r.contains_day(d("2024-06-03")));
        assert!(!r.contains_day(d("2024-06-04"))); // half-open
    }

    #[test]
    fn stay_range_overlap() {
        let a = range("2024-06-01", "2024-06-05");
        let b = range("2024-06-04", "2024-06-08");
        let c = range("2024-06-05", "2024-06-09");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // back-to-back, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn stay_range_identical_overlap() {
        let a = range("2024-06-01", "2024-06-05");
        assert!(a.overlaps(&a));
    }

    #[test]
    fn calendar_keeps_checkin_order() {
        let mut cal = UnitCalendar::new(101);
        cal.insert_stay(stay(3, "2024-06-20", "2024-06-22"));
        cal.insert_stay(stay(1, "2024-06-01", "2024-06-03"));
        cal.insert_stay(stay(2, "2024-06-10", "2024-06-12"));
        let ids: Vec<_> = cal.stays.iter().map(|s| s.booking_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn calendar_remove_stay() {
        let mut cal = UnitCalendar::new(101);
        cal.insert_stay(stay(1, "2024-06-01", "2024-06-03"));
        cal.insert_stay(stay(2, "2024-06-10", "2024-06-12"));
        let removed = cal.remove_stay(1).unwrap();
        assert_eq!(removed.booking_id, 1);
        assert_eq!(cal.stays.len(), 1);
        assert!(cal.remove_stay(99).is_none());
    }

    #[test]
    fn calendar_overlapping_window() {
        let mut cal = UnitCalendar::new(101);
        cal.insert_stay(stay(1, "2024-06-01", "2024-06-03"));
        cal.insert_stay(stay(2, "2024-06-05", "2024-06-09"));
        cal.insert_stay(stay(3, "2024-06-20", "2024-06-25"));

        let hits: Vec<_> = cal
            .overlapping(&range("2024-06-08", "2024-06-21"))
            .map(|s| s.booking_id)
            .collect();
        assert_eq!(hits, vec![2, 3]);
    }

    #[test]
    fn calendar_back_to_back_not_overlapping() {
        let mut cal = UnitCalendar::new(101);
        cal.insert_stay(stay(1, "2024-06-01", "2024-06-03"));
        assert!(cal.is_free(&range("2024-06-03", "2024-06-05")));
        assert!(cal.is_free(&range("2024-05-30", "2024-06-01")));
        assert!(!cal.is_free(&range("2024-06-02", "2024-06-04")));
    }

    #[test]
    fn calendar_spanning_stay_detected() {
        let mut cal = UnitCalendar::new(101);
        cal.insert_stay(stay(1, "2024-06-01", "2024-06-30"));
        assert!(!cal.is_free(&range("2024-06-10", "2024-06-11")));
    }

    #[test]
    fn calendar_empty_is_free() {
        let cal = UnitCalendar::new(101);
        assert!(cal.is_free(&range("2024-06-01", "2024-06-30")));
    }

    #[test]
    fn capacity_fits() {
        let cap = Capacity {
            adults: 2,
            children: 1,
        };
        assert!(cap.fits(2, 1));
        assert!(cap.fits(1, 0));
        assert!(!cap.fits(3, 0));
        assert!(!cap.fits(2, 2));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::RoomTypeCreated {
            room_type: RoomType {
                id: 7,
                name: "Deluxe Suite".into(),
                capacity: Capacity {
                    adults: 2,
                    children: 1,
                },
                amenities: vec!["wifi".into(), "minibar".into()],
                min_nights: 1,
                max_nights: 14,
                pricing: Pricing {
                    base: 100.0,
                    tax: 20.0,
                    total: 120.0,
                    currency: "USD".into(),
                },
                room_numbers: vec![701, 702],
                image_url: None,
                refund_policy: Some("free until 48h before".into()),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn booking_event_roundtrip_keeps_status() {
        let booking = Booking {
            booking_id: 1,
            room_type_id: 7,
            room_name: "Deluxe Suite".into(),
            room_no: 701,
            stay: range("2024-06-01", "2024-06-03"),
            nights: 2,
            user_name: "Alice".into(),
            email: "alice@example.com".into(),
            adults: 2,
            children: 0,
            total_price: 240.0,
            currency: "USD".into(),
            status: BookingStatus::Cancelled,
            created_at: Utc::now(),
        };
        let event = Event::BookingConfirmed { booking };
        let bytes = bincode::serialize(&event).unwrap();
        let Event::BookingConfirmed { booking: decoded } =
            bincode::deserialize(&bytes).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(decoded.status, BookingStatus::Cancelled);
    }
}
