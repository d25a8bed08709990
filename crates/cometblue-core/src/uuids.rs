//! GATT service and characteristic UUIDs exposed by Comet Blue valves.
//!
//! All characteristics live in one vendor service and share the
//! `-47e9-11e4-8939-164230d1df67` suffix.

use chrono::Weekday;
use uuid::Uuid;

use crate::types::HolidaySlot;

/// The Comet Blue primary service.
pub const SERVICE: Uuid = Uuid::from_u128(0x47e9_ee00_47e9_11e4_8939_1642_30d1_df67);

/// Device clock (minute, hour, day, month, year).
pub const DATETIME: Uuid = Uuid::from_u128(0x47e9_ee01_47e9_11e4_8939_1642_30d1_df67);

/// Heating periods per weekday, Monday first.
pub const WEEKDAYS: [Uuid; 7] = [
    Uuid::from_u128(0x47e9_ee10_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee11_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee12_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee13_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee14_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee15_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee16_47e9_11e4_8939_1642_30d1_df67),
];

/// Holiday slots 0-7.
pub const HOLIDAYS: [Uuid; 8] = [
    Uuid::from_u128(0x47e9_ee20_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee21_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee22_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee23_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee24_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee25_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee26_47e9_11e4_8939_1642_30d1_df67),
    Uuid::from_u128(0x47e9_ee27_47e9_11e4_8939_1642_30d1_df67),
];

/// Status and mode flags.
pub const SETTINGS: Uuid = Uuid::from_u128(0x47e9_ee2a_47e9_11e4_8939_1642_30d1_df67);

/// Current, manual, target and offset temperatures plus window detection.
pub const TEMPERATURE: Uuid = Uuid::from_u128(0x47e9_ee2b_47e9_11e4_8939_1642_30d1_df67);

/// Battery level in percent.
pub const BATTERY: Uuid = Uuid::from_u128(0x47e9_ee2c_47e9_11e4_8939_1642_30d1_df67);

/// Write-only PIN that unlocks the other characteristics for this connection.
pub const PIN: Uuid = Uuid::from_u128(0x47e9_ee30_47e9_11e4_8939_1642_30d1_df67);

/// Characteristic holding the heating periods of `day`.
#[must_use]
pub fn weekday(day: Weekday) -> Uuid {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

/// Characteristic holding holiday `slot`.
#[must_use]
pub const fn holiday(slot: HolidaySlot) -> Uuid {
    HOLIDAYS[slot.index() as usize]
}

/// Human-readable name of a known characteristic, for log output.
#[must_use]
pub fn name_of(uuid: Uuid) -> &'static str {
    const WEEKDAY_NAMES: [&str; 7] = [
        "weekday-mon",
        "weekday-tue",
        "weekday-wed",
        "weekday-thu",
        "weekday-fri",
        "weekday-sat",
        "weekday-sun",
    ];
    const HOLIDAY_NAMES: [&str; 8] = [
        "holiday-0", "holiday-1", "holiday-2", "holiday-3", "holiday-4", "holiday-5",
        "holiday-6", "holiday-7",
    ];

    if let Some(i) = WEEKDAYS.iter().position(|u| *u == uuid) {
        return WEEKDAY_NAMES[i];
    }
    if let Some(i) = HOLIDAYS.iter().position(|u| *u == uuid) {
        return HOLIDAY_NAMES[i];
    }
    match uuid {
        SERVICE => "service",
        DATETIME => "datetime",
        SETTINGS => "settings",
        TEMPERATURE => "temperature",
        BATTERY => "battery",
        PIN => "pin",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_match_vendor_strings() {
        assert_eq!(
            SERVICE.to_string(),
            "47e9ee00-47e9-11e4-8939-164230d1df67"
        );
        assert_eq!(
            TEMPERATURE.to_string(),
            "47e9ee2b-47e9-11e4-8939-164230d1df67"
        );
        assert_eq!(PIN.to_string(), "47e9ee30-47e9-11e4-8939-164230d1df67");
        assert_eq!(
            WEEKDAYS[6].to_string(),
            "47e9ee16-47e9-11e4-8939-164230d1df67"
        );
        assert_eq!(
            HOLIDAYS[7].to_string(),
            "47e9ee27-47e9-11e4-8939-164230d1df67"
        );
    }

    #[test]
    fn test_weekday_lookup_starts_on_monday() {
        assert_eq!(weekday(Weekday::Mon), WEEKDAYS[0]);
        assert_eq!(weekday(Weekday::Sun), WEEKDAYS[6]);
    }

    #[test]
    fn test_holiday_lookup() {
        let slot = HolidaySlot::new(5).unwrap();
        assert_eq!(holiday(slot), HOLIDAYS[5]);
    }

    #[test]
    fn test_names() {
        assert_eq!(name_of(BATTERY), "battery");
        assert_eq!(name_of(WEEKDAYS[2]), "weekday-wed");
        assert_eq!(name_of(HOLIDAYS[3]), "holiday-3");
        assert_eq!(name_of(Uuid::nil()), "unknown");
    }
}
