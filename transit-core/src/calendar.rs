//! The Calendar Oracle (spec §4.5): decides whether a service runs on a
//! given date.

use std::collections::HashMap;
use std::sync::Once;

use chrono::NaiveDate;

use crate::ids::ServiceId;
use crate::model::{Calendar, CalendarException, Day, ExceptionType};

pub struct CalendarOracle {
    calendars: HashMap<ServiceId, Calendar>,
    exceptions: HashMap<(ServiceId, NaiveDate), ExceptionType>,
    has_calendar_data: bool,
    fail_open_warned: Once,
}

impl CalendarOracle {
    pub fn new(calendars: Vec<Calendar>, exceptions: Vec<CalendarException>) -> CalendarOracle {
        let has_calendar_data = !calendars.is_empty();
        CalendarOracle {
            calendars: calendars.into_iter().map(|c| (c.service_id.clone(), c)).collect(),
            exceptions: exceptions
                .into_iter()
                .map(|e| ((e.service_id.clone(), e.date), e.exception_type))
                .collect(),
            has_calendar_data,
            fail_open_warned: Once::new(),
        }
    }

    /// `is_active(service_id, date) -> bool`, per spec §4.5 steps 1-5.
    pub fn is_active(&self, service_id: &ServiceId, date: NaiveDate) -> bool {
        if !self.has_calendar_data {
            self.fail_open_warned.call_once(|| {
                log::warn!(
                    "no calendar.txt was loaded for this bundle; treating every service as active"
                );
            });
            return true;
        }

        let calendar = match self.calendars.get(service_id) {
            Some(calendar) => calendar,
            None => return false,
        };

        if date < calendar.start_date || date > calendar.end_date {
            return false;
        }

        if let Some(exception_type) = self.exceptions.get(&(service_id.clone(), date)) {
            return matches!(exception_type, ExceptionType::Added);
        }

        calendar.runs_on(Day::of(date))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::ServiceId;

    fn weekday_calendar(service_id: &str, days_active: &[Day]) -> Calendar {
        let mut weekdays = [false; 7];
        for day in days_active {
            weekdays[day.index()] = true;
        }
        Calendar {
            service_id: ServiceId::from(service_id),
            weekdays,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }
    }

    #[test]
    fn saturdays_only() {
        let oracle = CalendarOracle::new(
            vec![weekday_calendar("SAT", &[Day::Saturday])],
            vec![],
        );
        // 2024-07-29 is a Monday, 2024-08-03 is a Saturday.
        let monday = NaiveDate::from_ymd_opt(2024, 7, 29).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 8, 3).unwrap();
        let service = ServiceId::from("SAT");
        assert!(!oracle.is_active(&service, monday));
        assert!(oracle.is_active(&service, saturday));
    }

    #[test]
    fn unknown_service_is_inactive() {
        let oracle = CalendarOracle::new(vec![weekday_calendar("SAT", &[Day::Saturday])], vec![]);
        let date = NaiveDate::from_ymd_opt(2024, 8, 3).unwrap();
        assert!(!oracle.is_active(&ServiceId::from("UNKNOWN"), date));
    }

    #[test]
    fn out_of_range_date_is_inactive() {
        let oracle = CalendarOracle::new(vec![weekday_calendar("SAT", &[Day::Saturday])], vec![]);
        let service = ServiceId::from("SAT");
        assert!(!oracle.is_active(&service, NaiveDate::from_ymd_opt(2025, 8, 2).unwrap()));
    }

    #[test]
    fn exceptions_override_bitmap() {
        let mut weekdays = [false; 7];
        weekdays[Day::Monday.index()] = true;
        let calendar = Calendar {
            service_id: ServiceId::from("WEEKDAY"),
            weekdays,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };
        let holiday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(); // a Monday
        let added_saturday = NaiveDate::from_ymd_opt(2024, 9, 7).unwrap();
        let oracle = CalendarOracle::new(
            vec![calendar],
            vec![
                CalendarException {
                    service_id: ServiceId::from("WEEKDAY"),
                    date: holiday,
                    exception_type: ExceptionType::Removed,
                },
                CalendarException {
                    service_id: ServiceId::from("WEEKDAY"),
                    date: added_saturday,
                    exception_type: ExceptionType::Added,
                },
            ],
        );
        let service = ServiceId::from("WEEKDAY");
        assert!(!oracle.is_active(&service, holiday));
        assert!(oracle.is_active(&service, added_saturday));
    }

    #[test]
    fn added_exception_outside_calendar_range_stays_inactive() {
        let calendar = weekday_calendar("WEEKDAY", &[Day::Monday]);
        let beyond_end = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(); // a Monday, past end_date
        let oracle = CalendarOracle::new(
            vec![calendar],
            vec![CalendarException {
                service_id: ServiceId::from("WEEKDAY"),
                date: beyond_end,
                exception_type: ExceptionType::Added,
            }],
        );
        let service = ServiceId::from("WEEKDAY");
        // spec §4.5 checks the date range (step 3) before calendar_dates (step 4):
        // an Added exception outside [start_date, end_date] does not resurrect the service.
        assert!(!oracle.is_active(&service, beyond_end));
    }

    #[test]
    fn no_calendar_loaded_fails_open() {
        let oracle = CalendarOracle::new(vec![], vec![]);
        assert!(oracle.is_active(&ServiceId::from("ANYTHING"), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
    }
}
