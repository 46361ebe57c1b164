//! Immutable timetable built once per load.
//!
//! The builder accepts raw rows in any order, drops the ones that cannot be
//! used, and produces per-stop connection lists: for every stop, the
//! neighbouring stops reachable by one hop of some trip together with the
//! scheduled departure/arrival of each hop.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::identifiers::*;
use crate::models::{Route, ServiceCalendar, Stop, StopTime, Trip};

/// One scheduled hop between consecutive stops of a trip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hop {
    pub trip: TripIndex,
    /// Departure from the origin stop, seconds since service-day midnight
    pub departure: u32,
    /// Arrival at the neighbour, seconds since service-day midnight
    pub arrival: u32,
}

/// All hops from one stop to one neighbour, sorted by departure
#[derive(Clone, Debug)]
pub struct StopLinks {
    pub neighbor: StopIndex,
    pub hops: Vec<Hop>,
}

/// Row counts dropped while building
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub skipped_stops: usize,
    pub skipped_trips: usize,
    pub skipped_stop_times: usize,
    pub skipped_calendars: usize,
}

impl LoadStats {
    pub fn total(&self) -> usize {
        self.skipped_stops + self.skipped_trips + self.skipped_stop_times + self.skipped_calendars
    }
}

#[derive(Clone, Debug)]
pub struct Timetable {
    stop_ids: IdTable<StopIdentifier>,
    stops: Vec<Stop>,
    routes: HashMap<RouteIdentifier, Route>,
    trip_ids: IdTable<TripIdentifier>,
    trips: Vec<Trip>,
    trip_services: Vec<ServiceIndex>,
    trip_stop_times: Vec<Vec<StopTime>>,
    service_ids: IdTable<ServiceIdentifier>,
    calendars: Vec<ServiceCalendar>,
    links: Vec<Vec<StopLinks>>,
    stats: LoadStats,
}

impl Timetable {
    pub fn num_stops(&self) -> usize {
        self.stops.len()
    }

    pub fn num_trips(&self) -> usize {
        self.trips.len()
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stop(&self, idx: StopIndex) -> Option<&Stop> {
        self.stops.get(idx as usize)
    }

    pub fn stop_index(&self, id: &StopIdentifier) -> Option<StopIndex> {
        self.stop_ids.get(id)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn route(&self, id: &RouteIdentifier) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn trip(&self, idx: TripIndex) -> Option<&Trip> {
        self.trips.get(idx as usize)
    }

    pub fn trip_index(&self, id: &TripIdentifier) -> Option<TripIndex> {
        self.trip_ids.get(id)
    }

    /// Stop times of a trip, ordered by stop sequence
    pub fn stop_times(&self, idx: TripIndex) -> &[StopTime] {
        self.trip_stop_times
            .get(idx as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn calendars(&self) -> &[ServiceCalendar] {
        &self.calendars
    }

    pub fn calendar(&self, id: &ServiceIdentifier) -> Option<&ServiceCalendar> {
        self.service_ids
            .get(id)
            .and_then(|idx| self.calendars.get(idx as usize))
    }

    /// Service calendar governing a trip
    pub fn trip_calendar(&self, idx: TripIndex) -> Option<&ServiceCalendar> {
        let service = *self.trip_services.get(idx as usize)?;
        self.calendars.get(service as usize)
    }

    /// Neighbour lists of a stop
    pub fn links(&self, stop: StopIndex) -> &[StopLinks] {
        self.links
            .get(stop as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }
}

/// Collects raw rows and assembles a [`Timetable`]
#[derive(Default)]
pub struct TimetableBuilder {
    stops: Vec<Stop>,
    routes: Vec<Route>,
    trips: Vec<Trip>,
    stop_times: Vec<StopTime>,
    calendars: Vec<ServiceCalendar>,
    added: HashMap<ServiceIdentifier, HashSet<NaiveDate>>,
    removed: HashMap<ServiceIdentifier, HashSet<NaiveDate>>,
    stats: LoadStats,
}

impl TimetableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stop(&mut self, stop: Stop) -> &mut Self {
        self.stops.push(stop);
        self
    }

    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    pub fn add_trip(&mut self, trip: Trip) -> &mut Self {
        self.trips.push(trip);
        self
    }

    pub fn add_stop_time(&mut self, stop_time: StopTime) -> &mut Self {
        self.stop_times.push(stop_time);
        self
    }

    pub fn add_calendar(&mut self, calendar: ServiceCalendar) -> &mut Self {
        self.calendars.push(calendar);
        self
    }

    /// Records a calendar_dates row; `added == false` removes the date
    pub fn add_exception(&mut self, service_id: ServiceIdentifier, date: NaiveDate, added: bool) -> &mut Self {
        let target = if added { &mut self.added } else { &mut self.removed };
        target.entry(service_id).or_default().insert(date);
        self
    }

    /// Counts rows the caller dropped before they reached the builder
    pub fn note_skipped_stop_time(&mut self) {
        self.stats.skipped_stop_times += 1;
    }

    pub fn note_skipped_trip(&mut self) {
        self.stats.skipped_trips += 1;
    }

    pub fn note_skipped_stop(&mut self) {
        self.stats.skipped_stops += 1;
    }

    pub fn note_skipped_calendar(&mut self) {
        self.stats.skipped_calendars += 1;
    }

    pub fn build(mut self) -> Timetable {
        let mut stats = self.stats;

        // Stops
        let mut stop_ids = IdTable::with_capacity(self.stops.len());
        let mut stops = Vec::with_capacity(self.stops.len());
        for stop in self.stops {
            if stop_ids.insert_new(stop.id.clone()).is_none() {
                warn!("duplicate stop {} skipped", stop.id);
                stats.skipped_stops += 1;
                continue;
            }
            stops.push(stop);
        }

        // Calendars, with calendar_dates folded in
        let mut service_ids = IdTable::with_capacity(self.calendars.len());
        let mut calendars = Vec::with_capacity(self.calendars.len());
        for calendar in self.calendars {
            let id = calendar.service_id().clone();
            if service_ids.insert_new(id.clone()).is_none() {
                warn!("duplicate calendar for service {} skipped", id);
                stats.skipped_calendars += 1;
                continue;
            }
            // Exceptions already on the calendar are kept alongside the builder's
            let mut added = self.added.remove(&id).unwrap_or_default();
            let mut removed = self.removed.remove(&id).unwrap_or_default();
            added.extend(calendar.added_dates().iter().copied());
            removed.extend(calendar.removed_dates().iter().copied());
            calendars.push(calendar.with_exceptions(added, removed));
        }
        // Services defined only through added dates
        for (id, added) in self.added {
            let removed = self.removed.remove(&id).unwrap_or_default();
            let Some(calendar) = ServiceCalendar::from_added_dates(id.clone(), added) else {
                continue;
            };
            service_ids.intern(id);
            let added = calendar.added_dates().clone();
            calendars.push(calendar.with_exceptions(added, removed));
        }

        // Trips
        let mut trip_ids = IdTable::with_capacity(self.trips.len());
        let mut trips = Vec::with_capacity(self.trips.len());
        let mut trip_services = Vec::with_capacity(self.trips.len());
        for trip in self.trips {
            let Some(service) = service_ids.get(&trip.service_id) else {
                warn!("trip {} references unknown service {}, skipped", trip.id, trip.service_id);
                stats.skipped_trips += 1;
                continue;
            };
            if trip_ids.insert_new(trip.id.clone()).is_none() {
                warn!("duplicate trip {} skipped", trip.id);
                stats.skipped_trips += 1;
                continue;
            }
            trips.push(trip);
            trip_services.push(service);
        }

        // Stop times grouped per trip
        let mut trip_stop_times: Vec<Vec<StopTime>> = vec![Vec::new(); trips.len()];
        for stop_time in self.stop_times {
            let (Some(trip), Some(_)) = (trip_ids.get(&stop_time.trip_id), stop_ids.get(&stop_time.stop_id)) else {
                debug!(
                    "stop time {}@{} references unknown trip or stop, skipped",
                    stop_time.trip_id, stop_time.stop_id
                );
                stats.skipped_stop_times += 1;
                continue;
            };
            trip_stop_times[trip as usize].push(stop_time);
        }

        // Validate sequences; a broken trip is emptied rather than renumbered
        for (idx, times) in trip_stop_times.iter_mut().enumerate() {
            times.sort_by_key(|st| st.stop_sequence);
            if let Err(reason) = validate_stop_times(times) {
                warn!("trip {} has an invalid schedule ({}), skipped", trips[idx].id, reason);
                stats.skipped_trips += 1;
                times.clear();
            }
        }

        let links = build_links(&stop_ids, &trip_stop_times);

        let routes = self
            .routes
            .into_iter()
            .map(|route| (route.id.clone(), route))
            .collect();

        if stats.total() > 0 {
            info!(
                "timetable built with {} skipped stops, {} trips, {} stop times, {} calendars",
                stats.skipped_stops, stats.skipped_trips, stats.skipped_stop_times, stats.skipped_calendars
            );
        }
        debug!(
            "timetable: {} stops, {} trips, {} services",
            stops.len(),
            trips.len(),
            calendars.len()
        );

        Timetable {
            stop_ids,
            stops,
            routes,
            trip_ids,
            trips,
            trip_services,
            trip_stop_times,
            service_ids,
            calendars,
            links,
            stats,
        }
    }
}

/// Checks sequence order and arrival <= departure <= next arrival
fn validate_stop_times(times: &[StopTime]) -> Result<(), String> {
    for st in times {
        if st.arrival > st.departure {
            return Err(format!("arrival after departure at sequence {}", st.stop_sequence));
        }
    }
    for pair in times.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.stop_sequence == b.stop_sequence {
            return Err(format!("repeated stop sequence {}", a.stop_sequence));
        }
        if a.departure > b.arrival {
            return Err(format!(
                "departure at sequence {} after arrival at sequence {}",
                a.stop_sequence, b.stop_sequence
            ));
        }
    }
    Ok(())
}

fn build_links(stop_ids: &IdTable<StopIdentifier>, trip_stop_times: &[Vec<StopTime>]) -> Vec<Vec<StopLinks>> {
    let mut links: Vec<Vec<StopLinks>> = vec![Vec::new(); stop_ids.len()];
    let mut slot: Vec<HashMap<StopIndex, usize>> = vec![HashMap::new(); stop_ids.len()];

    for (trip, times) in trip_stop_times.iter().enumerate() {
        for pair in times.windows(2) {
            let (Some(from), Some(to)) = (stop_ids.get(&pair[0].stop_id), stop_ids.get(&pair[1].stop_id)) else {
                continue;
            };
            if from == to {
                continue;
            }
            let hop = Hop {
                trip: trip as TripIndex,
                departure: pair[0].departure,
                arrival: pair[1].arrival,
            };
            let stop_links = &mut links[from as usize];
            let pos = *slot[from as usize].entry(to).or_insert_with(|| {
                stop_links.push(StopLinks {
                    neighbor: to,
                    hops: Vec::new(),
                });
                stop_links.len() - 1
            });
            stop_links[pos].hops.push(hop);
        }
    }

    for stop_links in &mut links {
        for link in stop_links.iter_mut() {
            link.hops.sort_by_key(|hop| (hop.departure, hop.arrival));
        }
    }

    links
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::WeekdayFlags;
    use geo::Point;

    pub(crate) fn stop(id: &str, lon: f64, lat: f64) -> Stop {
        Stop {
            id: StopIdentifier::new(id),
            name: id.into(),
            location: Point::new(lon, lat),
        }
    }

    pub(crate) fn trip(id: &str, service: &str) -> Trip {
        Trip {
            id: TripIdentifier::new(id),
            route_id: RouteIdentifier::new("r1"),
            service_id: ServiceIdentifier::new(service),
            shape_id: None,
        }
    }

    pub(crate) fn stop_time(trip: &str, stop: &str, seq: u32, arrival: u32, departure: u32) -> StopTime {
        StopTime::new(TripIdentifier::new(trip), StopIdentifier::new(stop), seq, arrival, departure)
    }

    pub(crate) fn daily(service: &str) -> ServiceCalendar {
        ServiceCalendar::new(
            ServiceIdentifier::new(service),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            WeekdayFlags::ALL,
        )
        .unwrap()
    }

    #[test]
    fn test_links_follow_consecutive_stops() {
        let mut builder = TimetableBuilder::new();
        builder
            .add_stop(stop("a", 0.0, 0.0))
            .add_stop(stop("b", 0.0, 0.1))
            .add_stop(stop("c", 0.0, 0.2))
            .add_calendar(daily("all"))
            .add_trip(trip("t1", "all"))
            // Rows out of order on purpose
            .add_stop_time(stop_time("t1", "c", 3, 700, 700))
            .add_stop_time(stop_time("t1", "a", 1, 100, 100))
            .add_stop_time(stop_time("t1", "b", 2, 400, 450));
        let timetable = builder.build();

        let a = timetable.stop_index(&StopIdentifier::new("a")).unwrap();
        let b = timetable.stop_index(&StopIdentifier::new("b")).unwrap();
        let c = timetable.stop_index(&StopIdentifier::new("c")).unwrap();

        let from_a = timetable.links(a);
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].neighbor, b);
        assert_eq!(from_a[0].hops, vec![Hop { trip: 0, departure: 100, arrival: 400 }]);

        let from_b = timetable.links(b);
        assert_eq!(from_b[0].neighbor, c);
        assert_eq!(from_b[0].hops[0].departure, 450);
        assert!(timetable.links(c).is_empty());
    }

    #[test]
    fn test_hops_sorted_by_departure() {
        let mut builder = TimetableBuilder::new();
        builder
            .add_stop(stop("a", 0.0, 0.0))
            .add_stop(stop("b", 0.0, 0.1))
            .add_calendar(daily("all"))
            .add_trip(trip("late", "all"))
            .add_trip(trip("early", "all"))
            .add_stop_time(stop_time("late", "a", 1, 900, 900))
            .add_stop_time(stop_time("late", "b", 2, 1000, 1000))
            .add_stop_time(stop_time("early", "a", 1, 100, 100))
            .add_stop_time(stop_time("early", "b", 2, 200, 200));
        let timetable = builder.build();

        let departures: Vec<u32> = timetable.links(0)[0].hops.iter().map(|h| h.departure).collect();
        assert_eq!(departures, vec![100, 900]);
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let mut builder = TimetableBuilder::new();
        builder
            .add_stop(stop("a", 0.0, 0.0))
            .add_stop(stop("a", 1.0, 1.0))
            .add_stop(stop("b", 0.0, 0.1))
            .add_calendar(daily("all"))
            .add_trip(trip("ok", "all"))
            .add_trip(trip("orphan", "nowhere"))
            .add_trip(trip("backwards", "all"))
            .add_stop_time(stop_time("ok", "a", 1, 0, 0))
            .add_stop_time(stop_time("ok", "b", 2, 60, 60))
            .add_stop_time(stop_time("ok", "zz", 3, 90, 90))
            .add_stop_time(stop_time("backwards", "a", 1, 500, 500))
            .add_stop_time(stop_time("backwards", "b", 2, 400, 400));
        let timetable = builder.build();

        let stats = timetable.stats();
        assert_eq!(stats.skipped_stops, 1);
        // Unknown service plus the time-travelling trip
        assert_eq!(stats.skipped_trips, 2);
        assert_eq!(stats.skipped_stop_times, 1);

        assert_eq!(timetable.num_stops(), 2);
        assert_eq!(timetable.num_trips(), 2);
        assert_eq!(timetable.links(0)[0].hops.len(), 1);
        let backwards = timetable.trip_index(&TripIdentifier::new("backwards")).unwrap();
        assert!(timetable.stop_times(backwards).is_empty());
    }

    #[test]
    fn test_exception_only_service() {
        let holiday = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let mut builder = TimetableBuilder::new();
        builder
            .add_trip(trip("t", "holiday"))
            .add_exception(ServiceIdentifier::new("holiday"), holiday, true);
        let timetable = builder.build();

        let calendar = timetable.trip_calendar(0).unwrap();
        assert!(calendar.contains(holiday));
        assert!(!calendar.contains(holiday.succ_opt().unwrap()));
    }

    #[test]
    fn test_calendar_exceptions_merge_with_builder_dates() {
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let closed = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let extra = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let mut builder = TimetableBuilder::new();
        builder
            .add_calendar(daily("all").with_exceptions(HashSet::from([extra]), HashSet::from([holiday])))
            .add_exception(ServiceIdentifier::new("all"), closed, false);
        let timetable = builder.build();

        let calendar = timetable.calendar(&ServiceIdentifier::new("all")).unwrap();
        assert!(!calendar.contains(holiday));
        assert!(!calendar.contains(closed));
        assert!(calendar.contains(extra));
        assert!(calendar.contains(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()));
    }
}
