use std::collections::HashSet;

use chrono::{Duration, NaiveDate};

use crate::limits::*;
use crate::model::{RoomType, StayRange};

use super::EngineError;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| EngineError::InvalidDateFormat(s.to_string()))
}

/// The booking policy guard. Pure function of its arguments — `today` is
/// injected by the caller, never read from the wall clock here.
///
/// Rules, in order, short-circuiting:
/// 1. both strings parse as `%Y-%m-%d`;
/// 2. neither date is strictly before `today`;
/// 3. neither date is more than `BOOKING_HORIZON_DAYS` after `today`;
/// 4. check-out is strictly after check-in.
pub(crate) fn parse_stay(
    check_in: &str,
    check_out: &str,
    today: NaiveDate,
) -> Result<StayRange, EngineError> {
    let check_in = parse_date(check_in)?;
    let check_out = parse_date(check_out)?;

    for date in [check_in, check_out] {
        if date < today {
            return Err(EngineError::PastDate(date));
        }
    }
    let horizon = today + Duration::days(BOOKING_HORIZON_DAYS);
    for date in [check_in, check_out] {
        if date > horizon {
            return Err(EngineError::TooFarAhead(date));
        }
    }
    if check_out <= check_in {
        return Err(EngineError::InvalidRange);
    }

    Ok(StayRange::new(check_in, check_out))
}

pub(crate) fn check_stay_length(
    room_type: &RoomType,
    nights: i64,
) -> Result<(), EngineError> {
    if nights < i64::from(room_type.min_nights) || nights > i64::from(room_type.max_nights) {
        return Err(EngineError::StayLengthOutOfBounds {
            nights,
            min_nights: room_type.min_nights,
            max_nights: room_type.max_nights,
        });
    }
    Ok(())
}

/// Whole-type rejection: a party over either maximum never sees a unit of
/// this type, partial matches do not exist.
pub(crate) fn check_party_fits(
    room_type: &RoomType,
    adults: u32,
    children: u32,
) -> Result<(), EngineError> {
    if !room_type.capacity.fits(adults, children) {
        return Err(EngineError::CapacityExceeded { adults, children });
    }
    Ok(())
}

pub(crate) fn check_guest_fields(user_name: &str, email: &str) -> Result<(), EngineError> {
    if user_name.is_empty() || user_name.len() > MAX_GUEST_NAME_LEN {
        return Err(EngineError::LimitExceeded("guest name length"));
    }
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email length"));
    }
    Ok(())
}

/// Admin-path validation of a room type definition.
pub(crate) fn validate_room_type(room_type: &RoomType) -> Result<(), EngineError> {
    if room_type.name.is_empty() || room_type.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room type name length"));
    }
    if room_type.amenities.len() > MAX_AMENITIES {
        return Err(EngineError::LimitExceeded("too many amenities"));
    }
    if room_type.room_numbers.is_empty() {
        return Err(EngineError::LimitExceeded("room type has no units"));
    }
    if room_type.room_numbers.len() > MAX_UNITS_PER_ROOM_TYPE {
        return Err(EngineError::LimitExceeded("too many units"));
    }
    let mut seen = HashSet::new();
    if !room_type.room_numbers.iter().all(|u| seen.insert(u)) {
        return Err(EngineError::LimitExceeded("duplicate room number"));
    }
    if room_type.min_nights == 0 {
        return Err(EngineError::LimitExceeded("min_nights must be at least 1"));
    }
    if room_type.min_nights > room_type.max_nights {
        return Err(EngineError::LimitExceeded("min_nights exceeds max_nights"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capacity, Pricing};

    fn today() -> NaiveDate {
        "2024-06-15".parse().unwrap()
    }

    #[test]
    fn accepts_valid_stay() {
        let stay = parse_stay("2024-06-20", "2024-06-23", today()).unwrap();
        assert_eq!(stay.nights(), 3);
    }

    #[test]
    fn accepts_stay_starting_today() {
        let stay = parse_stay("2024-06-15", "2024-06-16", today()).unwrap();
        assert_eq!(stay.nights(), 1);
    }

    #[test]
    fn rejects_garbage_dates() {
        for bad in ["junk", "2024-13-40", "06/20/2024", "2024-6-2x", ""] {
            let result = parse_stay(bad, "2024-06-23", today());
            assert!(
                matches!(result, Err(EngineError::InvalidDateFormat(_))),
                "{bad:?} should fail to parse"
            );
        }
    }

    #[test]
    fn rejects_past_check_in() {
        let result = parse_stay("2024-06-14", "2024-06-16", today());
        assert!(matches!(result, Err(EngineError::PastDate(_))));
    }

    #[test]
    fn past_date_wins_over_bad_order() {
        // Rule order is fixed: the past date is reported even though the
        // range is also inverted.
        let result = parse_stay("2024-06-10", "2024-06-05", today());
        assert!(matches!(result, Err(EngineError::PastDate(_))));
    }

    #[test]
    fn rejects_beyond_horizon() {
        // 2024-07-15 is exactly today + 30 and allowed; one more day is not.
        assert!(parse_stay("2024-07-14", "2024-07-15", today()).is_ok());
        let result = parse_stay("2024-07-14", "2024-07-16", today());
        assert!(matches!(result, Err(EngineError::TooFarAhead(_))));
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        let result = parse_stay("2024-06-23", "2024-06-20", today());
        assert!(matches!(result, Err(EngineError::InvalidRange)));
        let result = parse_stay("2024-06-20", "2024-06-20", today());
        assert!(matches!(result, Err(EngineError::InvalidRange)));
    }

    fn sample_type() -> RoomType {
        RoomType {
            id: 1,
            name: "Twin".into(),
            capacity: Capacity {
                adults: 2,
                children: 1,
            },
            amenities: vec![],
            min_nights: 2,
            max_nights: 5,
            pricing: Pricing {
                base: 50.0,
                tax: 10.0,
                total: 60.0,
                currency: "EUR".into(),
            },
            room_numbers: vec![1, 2],
            image_url: None,
            refund_policy: None,
        }
    }

    #[test]
    fn stay_length_bounds_inclusive() {
        let rt = sample_type();
        assert!(check_stay_length(&rt, 2).is_ok());
        assert!(check_stay_length(&rt, 5).is_ok());
        assert!(matches!(
            check_stay_length(&rt, 1),
            Err(EngineError::StayLengthOutOfBounds { .. })
        ));
        assert!(matches!(
            check_stay_length(&rt, 6),
            Err(EngineError::StayLengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn party_fit_is_whole_type() {
        let rt = sample_type();
        assert!(check_party_fits(&rt, 2, 1).is_ok());
        assert!(matches!(
            check_party_fits(&rt, 3, 0),
            Err(EngineError::CapacityExceeded { .. })
        ));
        assert!(matches!(
            check_party_fits(&rt, 0, 2),
            Err(EngineError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn room_type_validation() {
        let mut rt = sample_type();
        assert!(validate_room_type(&rt).is_ok());

        rt.room_numbers = vec![];
        assert!(validate_room_type(&rt).is_err());

        rt.room_numbers = vec![1, 2, 1];
        assert!(matches!(
            validate_room_type(&rt),
            Err(EngineError::LimitExceeded("duplicate room number"))
        ));

        rt.room_numbers = vec![1, 2];
        rt.min_nights = 6;
        assert!(matches!(
            validate_room_type(&rt),
            Err(EngineError::LimitExceeded("min_nights exceeds max_nights"))
        ));
    }
}
