//! Time-dependent connections derived from the timetable.
//!
//! For a stop and an arrival instant the scanner finds, per neighbouring
//! stop, the trip hop that reaches the neighbour earliest. A neighbour with
//! no feasible hop has no edge at that instant.

use chrono::{Duration, NaiveDateTime, NaiveTime};

use crate::identifiers::{StopIndex, TripIndex};
use crate::timetable::{StopLinks, Timetable};

/// Earliest feasible hop from one stop to a neighbour
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub neighbor: StopIndex,
    pub trip: TripIndex,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
}

impl Connection {
    /// Seconds between `at` and arrival at the neighbour
    pub fn cost_from(&self, at: NaiveDateTime) -> i64 {
        (self.arrival - at).num_seconds()
    }
}

#[derive(Clone, Copy)]
pub struct ConnectionScanner<'a> {
    timetable: &'a Timetable,
}

impl<'a> ConnectionScanner<'a> {
    pub fn new(timetable: &'a Timetable) -> Self {
        Self { timetable }
    }

    /// Earliest connection from `stop` to `neighbor` for a traveller at `stop` at `at`
    pub fn earliest_connection(
        &self,
        stop: StopIndex,
        neighbor: StopIndex,
        at: NaiveDateTime,
    ) -> Option<Connection> {
        self.timetable
            .links(stop)
            .iter()
            .find(|links| links.neighbor == neighbor)
            .and_then(|links| self.scan(links, at))
    }

    /// Earliest connection to every neighbour of `stop` reachable from `at`
    pub fn earliest_connections(
        &self,
        stop: StopIndex,
        at: NaiveDateTime,
    ) -> impl Iterator<Item = Connection> + 'a {
        let scanner = *self;
        self.timetable
            .links(stop)
            .iter()
            .filter_map(move |links| scanner.scan(links, at))
    }

    fn scan(&self, links: &StopLinks, at: NaiveDateTime) -> Option<Connection> {
        let mut best: Option<Connection> = None;

        for hop in &links.hops {
            let Some(calendar) = self.timetable.trip_calendar(hop.trip) else {
                continue;
            };
            let Some(resolved) = calendar.next_date(at) else {
                continue;
            };

            let midnight = resolved.date().and_time(NaiveTime::MIN);
            let departure = midnight + Duration::seconds(i64::from(hop.departure));
            if departure < resolved {
                continue;
            }

            let arrival = midnight + Duration::seconds(i64::from(hop.arrival));
            if best.map_or(true, |b| arrival < b.arrival) {
                best = Some(Connection {
                    neighbor: links.neighbor,
                    trip: hop.trip,
                    departure,
                    arrival,
                });
            }
        }

        best
    }
}
