//! Timetable import from a parsed GTFS feed.

use geo::Point;
use gtfs_structures::{Exception, Gtfs};
use tracing::{debug, warn};

use crate::identifiers::*;
use crate::models::{Route, RouteType, ServiceCalendar, Stop, StopTime, Trip, WeekdayFlags};
use crate::timetable::{Timetable, TimetableBuilder};

impl RouteType {
    fn from_feed(route_type: gtfs_structures::RouteType) -> Option<Self> {
        use gtfs_structures::RouteType as Feed;
        match route_type {
            Feed::Tramway => Some(Self::Tram),
            Feed::Subway => Some(Self::Subway),
            Feed::Rail => Some(Self::Rail),
            Feed::Bus | Feed::Coach => Some(Self::Bus),
            Feed::Ferry => Some(Self::Ferry),
            Feed::CableCar => Some(Self::CableTram),
            Feed::Gondola => Some(Self::AerialLift),
            Feed::Funicular => Some(Self::Funicular),
            _ => None,
        }
    }
}

impl Timetable {
    /// Builds a timetable from a parsed feed.
    ///
    /// Stops without coordinates and stop times without any time are skipped
    /// and counted in [`Timetable::stats`].
    pub fn from_gtfs(gtfs: &Gtfs) -> Timetable {
        let mut builder = TimetableBuilder::new();

        for stop in gtfs.stops.values() {
            let (Some(lon), Some(lat)) = (stop.longitude, stop.latitude) else {
                debug!("stop {} has no coordinates, skipped", stop.id);
                builder.note_skipped_stop();
                continue;
            };
            let name: Option<String> = stop.name.clone().into();
            builder.add_stop(Stop {
                id: StopIdentifier::new(&stop.id),
                name: name.unwrap_or_default().into(),
                location: Point::new(lon, lat),
            });
        }

        for route in gtfs.routes.values() {
            let short_name: Option<String> = route.short_name.clone().into();
            let long_name: Option<String> = route.long_name.clone().into();
            builder.add_route(Route {
                id: RouteIdentifier::new(&route.id),
                short_name: short_name.unwrap_or_default().into(),
                long_name: long_name.unwrap_or_default().into(),
                route_type: RouteType::from_feed(route.route_type),
            });
        }

        for calendar in gtfs.calendar.values() {
            let weekdays = WeekdayFlags::from_bools(
                calendar.monday,
                calendar.tuesday,
                calendar.wednesday,
                calendar.thursday,
                calendar.friday,
                calendar.saturday,
                calendar.sunday,
            );
            match ServiceCalendar::new(
                ServiceIdentifier::new(&calendar.id),
                calendar.start_date,
                calendar.end_date,
                weekdays,
            ) {
                Ok(calendar) => {
                    builder.add_calendar(calendar);
                }
                Err(e) => {
                    warn!("calendar {} skipped: {}", calendar.id, e);
                    builder.note_skipped_calendar();
                }
            }
        }

        for (service_id, dates) in &gtfs.calendar_dates {
            for date in dates {
                let added = matches!(date.exception_type, Exception::Added);
                builder.add_exception(ServiceIdentifier::new(service_id), date.date, added);
            }
        }

        for trip in gtfs.trips.values() {
            let trip_id = TripIdentifier::new(&trip.id);
            builder.add_trip(Trip {
                id: trip_id.clone(),
                route_id: RouteIdentifier::new(&trip.route_id),
                service_id: ServiceIdentifier::new(&trip.service_id),
                shape_id: trip.shape_id.as_deref().map(ShapeIdentifier::new),
            });

            for stop_time in &trip.stop_times {
                let (arrival, departure) = match (stop_time.arrival_time, stop_time.departure_time) {
                    (Some(a), Some(d)) => (a, d),
                    (Some(t), None) | (None, Some(t)) => (t, t),
                    (None, None) => {
                        builder.note_skipped_stop_time();
                        continue;
                    }
                };
                builder.add_stop_time(StopTime::new(
                    trip_id.clone(),
                    StopIdentifier::new(&stop_time.stop.id),
                    u32::from(stop_time.stop_sequence),
                    arrival,
                    departure,
                ));
            }
        }

        let timetable = builder.build();
        debug!(
            "imported feed: {} stops, {} trips, {} services",
            timetable.num_stops(),
            timetable.num_trips(),
            timetable.calendars().len()
        );
        timetable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ConnectionScanner;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;

    /// Tram and lift between two stops on weekdays, one stop without
    /// coordinates and a calendar whose dates run backwards
    const FEED: &[(&str, &str)] = &[
        (
            "agency.txt",
            "agency_id,agency_name,agency_url,agency_timezone\n\
             ag,Test Transit,https://example.com,Europe/Zurich\n",
        ),
        (
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\n\
             a,Alpha,47.0,8.0\n\
             b,Beta,47.01,8.0\n\
             ghost,Ghost,,\n",
        ),
        (
            "routes.txt",
            "route_id,agency_id,route_short_name,route_long_name,route_type\n\
             tram,ag,1,Tram One,0\n\
             lift,ag,L,Lift,6\n",
        ),
        (
            "trips.txt",
            "route_id,service_id,trip_id\n\
             tram,wk,t1\n\
             lift,wk,t2\n",
        ),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t1,08:00:00,08:00:00,a,1\n\
             t1,08:10:00,08:10:00,b,2\n\
             t1,,,ghost,3\n\
             t2,09:00:00,09:00:00,a,1\n\
             t2,09:05:00,09:05:00,b,2\n",
        ),
        (
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             wk,1,1,1,1,1,0,0,20240101,20241231\n\
             backwards,1,1,1,1,1,1,1,20241231,20240101\n",
        ),
        (
            "calendar_dates.txt",
            "service_id,date,exception_type\n\
             wk,20240309,1\n\
             wk,20240305,2\n",
        ),
    ];

    fn write_feed(dir: &Path) {
        for (name, contents) in FEED {
            fs::write(dir.join(name), contents).unwrap();
        }
    }

    fn imported() -> Timetable {
        let dir = tempfile::tempdir().unwrap();
        write_feed(dir.path());
        let gtfs = Gtfs::new(dir.path().to_str().unwrap()).unwrap();
        Timetable::from_gtfs(&gtfs)
    }

    fn at(day: u32, hour: u32, minute: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_import_counts_skipped_rows() {
        let timetable = imported();

        assert_eq!(timetable.num_stops(), 2);
        assert_eq!(timetable.num_trips(), 2);
        assert!(timetable.stop_index(&StopIdentifier::new("ghost")).is_none());

        let stats = timetable.stats();
        assert_eq!(stats.skipped_stops, 1);
        assert_eq!(stats.skipped_stop_times, 1);
        assert_eq!(stats.skipped_calendars, 1);
        assert!(timetable.calendar(&ServiceIdentifier::new("backwards")).is_none());
    }

    #[test]
    fn test_route_types_mapped() {
        let timetable = imported();
        let route_type = |id: &str| timetable.route(&RouteIdentifier::new(id)).and_then(|r| r.route_type);

        assert_eq!(route_type("tram"), Some(RouteType::Tram));
        assert_eq!(route_type("lift"), Some(RouteType::AerialLift));
    }

    #[test]
    fn test_calendar_dates_folded() {
        let timetable = imported();
        let calendar = timetable.calendar(&ServiceIdentifier::new("wk")).unwrap();

        // Saturday added, Tuesday removed
        assert!(calendar.contains(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        assert!(!calendar.contains(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        assert!(calendar.contains(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
    }

    #[test]
    fn test_scan_over_imported_feed() {
        let timetable = imported();
        let a = timetable.stop_index(&StopIdentifier::new("a")).unwrap();
        let b = timetable.stop_index(&StopIdentifier::new("b")).unwrap();
        let scanner = ConnectionScanner::new(&timetable);

        // Monday: tram at 08:00
        let monday = at(4, 7, 55);
        let connection = scanner.earliest_connection(a, b, monday).unwrap();
        assert_eq!(connection.cost_from(monday), 15 * 60);
        assert_eq!(
            timetable.trip(connection.trip).map(|t| t.id.as_str()),
            Some("t1")
        );

        // Tuesday is removed, so the next tram is Wednesday morning
        let tuesday = at(5, 7, 55);
        let connection = scanner.earliest_connection(a, b, tuesday).unwrap();
        assert_eq!(connection.departure, at(6, 8, 0));
    }
}
