//! The GTFS Schedule Loader (spec §4.1): reads one mode-scoped GTFS
//! directory and produces a [`transit_core::catalogue::LoadedBundle`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use transit_core::ids::{RouteId, ServiceId, StopId, TripId};
use transit_core::model::{
    Calendar, CalendarException, ExceptionType, Route, Stop, StopTime, TransferRecord, Trip,
};
use transit_core::time::{Duration, Time};

use crate::error::LoadError;

const MAX_UNRESOLVED_OFFENDERS: usize = 20;

/// Reads the character-separated-value files of one GTFS bundle, applying
/// the BOM-stripping and optional-file tolerance described in spec §4.1.
pub struct GtfsSource {
    dir: PathBuf,
}

impl GtfsSource {
    pub fn new(dir: impl AsRef<Path>) -> GtfsSource {
        GtfsSource {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn open(&self, filename: &str) -> Result<Option<csv::Reader<std::io::Cursor<Vec<u8>>>>, LoadError> {
        let path = self.dir.join(filename);
        if !path.exists() {
            return Ok(None);
        }
        log::debug!("opening {}", path.display());
        let mut bytes = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|err| LoadError::MalformedFeed {
                file: filename.to_string(),
                detail: err.to_string(),
            })?;
        strip_bom(&mut bytes);
        Ok(Some(csv::Reader::from_reader(std::io::Cursor::new(bytes))))
    }

    fn open_mandatory(
        &self,
        filename: &str,
    ) -> Result<csv::Reader<std::io::Cursor<Vec<u8>>>, LoadError> {
        self.open(filename)?
            .ok_or_else(|| LoadError::MissingFile(filename.to_string()))
    }

    /// Open a mandatory file and check its header row carries every column
    /// this loader requires from it, failing fast with `MalformedFeed`
    /// rather than silently producing zero records one skipped-row warning
    /// at a time (spec §4.1: "Fails with `MalformedFeed` on missing
    /// mandatory columns").
    fn open_mandatory_with_columns(
        &self,
        filename: &str,
        required_columns: &[&str],
    ) -> Result<csv::Reader<std::io::Cursor<Vec<u8>>>, LoadError> {
        let mut reader = self.open_mandatory(filename)?;
        let headers = reader.headers().map_err(|err| LoadError::Csv {
            file: filename.to_string(),
            source: err,
        })?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|col| !headers.iter().any(|h| h == *col))
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MalformedFeed {
                file: filename.to_string(),
                detail: format!("missing required column(s): {}", missing.join(", ")),
            });
        }
        Ok(reader)
    }
}

/// Strip a UTF-8 byte-order-mark prefix, if present (spec §4.1).
fn strip_bom(bytes: &mut Vec<u8>) {
    const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
    if bytes.starts_with(&BOM) {
        bytes.drain(0..3);
    }
}

#[derive(Debug, Deserialize)]
struct RawStop {
    stop_id: String,
    stop_name: String,
    stop_lat: f64,
    stop_lon: f64,
    #[serde(default)]
    platform_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    route_id: String,
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
    route_type: u16,
}

#[derive(Debug, Deserialize)]
struct RawTrip {
    route_id: String,
    service_id: String,
    trip_id: String,
    #[serde(default)]
    trip_headsign: Option<String>,
    #[serde(default)]
    direction_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawStopTime {
    trip_id: String,
    arrival_time: String,
    departure_time: String,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct RawCalendar {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
struct RawCalendarDate {
    service_id: String,
    date: String,
    exception_type: u8,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    from_stop_id: String,
    to_stop_id: String,
    transfer_type: u8,
    #[serde(default)]
    min_transfer_time: Option<i32>,
}

fn parse_gtfs_date(s: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// The records one mode's bundle loads into, ready to hand to
/// [`transit_core::catalogue::CatalogueBuilder::add_bundle`].
pub struct LoadedRecords {
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendars: Vec<Calendar>,
    pub calendar_exceptions: Vec<CalendarException>,
    pub transfers: Vec<TransferRecord>,
}

/// Load one GTFS directory, tagging every id with `mode_tag` as it is
/// produced (spec §9's `mode_tag:raw_id` scheme).
pub fn load(dir: impl AsRef<Path>, mode_tag: &str) -> Result<LoadedRecords, LoadError> {
    let source = GtfsSource::new(dir);
    let global_stop = |raw: &str| StopId::global(mode_tag, raw);
    let global_route = |raw: &str| RouteId::global(mode_tag, raw);
    let global_trip = |raw: &str| TripId::global(mode_tag, raw);
    let global_service = |raw: &str| ServiceId::global(mode_tag, raw);

    let mut skipped_rows = 0u32;

    let stops: Vec<Stop> = {
        let mut reader =
            source.open_mandatory_with_columns("stops.txt", &["stop_id", "stop_name", "stop_lat", "stop_lon"])?;
        let mut stops = Vec::new();
        for result in reader.deserialize::<RawStop>() {
            match result {
                Ok(raw) => stops.push(Stop {
                    stop_id: global_stop(&raw.stop_id),
                    name: raw.stop_name,
                    latitude: raw.stop_lat,
                    longitude: raw.stop_lon,
                    platform: raw.platform_code,
                    mode_tag: transit_core::ids::mode_tag(mode_tag),
                }),
                Err(err) => {
                    skipped_rows += 1;
                    log::warn!("skipped malformed row in stops.txt: {}", err);
                }
            }
        }
        stops
    };

    let routes: Vec<Route> = {
        let mut reader = source.open_mandatory_with_columns("routes.txt", &["route_id", "route_type"])?;
        let mut routes = Vec::new();
        for result in reader.deserialize::<RawRoute>() {
            match result {
                Ok(raw) => routes.push(Route {
                    route_id: global_route(&raw.route_id),
                    route_type: raw.route_type,
                    short_name: raw.route_short_name.unwrap_or_default(),
                    long_name: raw.route_long_name.unwrap_or_default(),
                    agency_id: raw.agency_id,
                    mode_tag: transit_core::ids::mode_tag(mode_tag),
                }),
                Err(err) => {
                    skipped_rows += 1;
                    log::warn!("skipped malformed row in routes.txt: {}", err);
                }
            }
        }
        routes
    };

    let trips: Vec<Trip> = {
        let mut reader =
            source.open_mandatory_with_columns("trips.txt", &["route_id", "service_id", "trip_id"])?;
        let mut trips = Vec::new();
        for result in reader.deserialize::<RawTrip>() {
            match result {
                Ok(raw) => trips.push(Trip {
                    trip_id: global_trip(&raw.trip_id),
                    route_id: global_route(&raw.route_id),
                    service_id: global_service(&raw.service_id),
                    direction_id: raw.direction_id,
                    headsign: raw.trip_headsign,
                }),
                Err(err) => {
                    skipped_rows += 1;
                    log::warn!("skipped malformed row in trips.txt: {}", err);
                }
            }
        }
        trips
    };

    let stop_times: Vec<StopTime> = {
        let mut reader = source.open_mandatory_with_columns(
            "stop_times.txt",
            &["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"],
        )?;
        let mut stop_times = Vec::new();
        for result in reader.deserialize::<RawStopTime>() {
            match result {
                Ok(raw) => {
                    let (arrival, departure) = match (
                        raw.arrival_time.parse::<Time>(),
                        raw.departure_time.parse::<Time>(),
                    ) {
                        (Ok(a), Ok(d)) => (a, d),
                        _ => {
                            skipped_rows += 1;
                            log::warn!(
                                "skipped stop_times.txt row for trip {} with unparseable time",
                                raw.trip_id
                            );
                            continue;
                        }
                    };
                    stop_times.push(StopTime {
                        trip_id: global_trip(&raw.trip_id),
                        stop_sequence: raw.stop_sequence,
                        stop_id: global_stop(&raw.stop_id),
                        arrival_time: arrival,
                        departure_time: departure,
                    });
                }
                Err(err) => {
                    skipped_rows += 1;
                    log::warn!("skipped malformed row in stop_times.txt: {}", err);
                }
            }
        }
        stop_times
    };

    let calendars: Vec<Calendar> = match source.open("calendar.txt")? {
        None => {
            log::info!("no calendar.txt for mode {}; planner will fail open", mode_tag);
            Vec::new()
        }
        Some(mut reader) => {
            let mut calendars = Vec::new();
            for result in reader.deserialize::<RawCalendar>() {
                match result {
                    Ok(raw) => {
                        let (Some(start_date), Some(end_date)) =
                            (parse_gtfs_date(&raw.start_date), parse_gtfs_date(&raw.end_date))
                        else {
                            skipped_rows += 1;
                            continue;
                        };
                        calendars.push(Calendar {
                            service_id: global_service(&raw.service_id),
                            weekdays: [
                                raw.monday > 0,
                                raw.tuesday > 0,
                                raw.wednesday > 0,
                                raw.thursday > 0,
                                raw.friday > 0,
                                raw.saturday > 0,
                                raw.sunday > 0,
                            ],
                            start_date,
                            end_date,
                        });
                    }
                    Err(err) => {
                        skipped_rows += 1;
                        log::warn!("skipped malformed row in calendar.txt: {}", err);
                    }
                }
            }
            calendars
        }
    };

    let calendar_exceptions: Vec<CalendarException> = match source.open("calendar_dates.txt")? {
        None => Vec::new(),
        Some(mut reader) => {
            let mut exceptions = Vec::new();
            for result in reader.deserialize::<RawCalendarDate>() {
                match result {
                    Ok(raw) => {
                        let Some(date) = parse_gtfs_date(&raw.date) else {
                            skipped_rows += 1;
                            continue;
                        };
                        let exception_type = match raw.exception_type {
                            1 => ExceptionType::Added,
                            2 => ExceptionType::Removed,
                            _ => {
                                skipped_rows += 1;
                                continue;
                            }
                        };
                        exceptions.push(CalendarException {
                            service_id: global_service(&raw.service_id),
                            date,
                            exception_type,
                        });
                    }
                    Err(err) => {
                        skipped_rows += 1;
                        log::warn!("skipped malformed row in calendar_dates.txt: {}", err);
                    }
                }
            }
            exceptions
        }
    };

    let transfers: Vec<TransferRecord> = match source.open("transfers.txt")? {
        None => Vec::new(),
        Some(mut reader) => {
            let mut transfers = Vec::new();
            for result in reader.deserialize::<RawTransfer>() {
                match result {
                    Ok(raw) => transfers.push(TransferRecord {
                        from_stop_id: global_stop(&raw.from_stop_id),
                        to_stop_id: global_stop(&raw.to_stop_id),
                        transfer_type: raw.transfer_type,
                        min_transfer_time: raw.min_transfer_time.map(Duration::seconds),
                    }),
                    Err(err) => {
                        skipped_rows += 1;
                        log::warn!("skipped malformed row in transfers.txt: {}", err);
                    }
                }
            }
            transfers
        }
    };

    let _ = source.open("agency.txt")?; // presence is optional; agencies are not yet modelled as first-class entities

    if skipped_rows > 0 {
        log::warn!("{} row(s) skipped while loading mode {}", skipped_rows, mode_tag);
    }

    validate_references(&stops, &routes, &trips, &stop_times)?;

    Ok(LoadedRecords {
        stops,
        routes,
        trips,
        stop_times,
        calendars,
        calendar_exceptions,
        transfers,
    })
}

/// Validate that every `stop_times.stop_id` resolves to a loaded Stop and
/// every `trips.route_id` resolves to a loaded Route (spec §4.1); collects
/// up to [`MAX_UNRESOLVED_OFFENDERS`] for the error message.
fn validate_references(
    stops: &[Stop],
    routes: &[Route],
    trips: &[Trip],
    stop_times: &[StopTime],
) -> Result<(), LoadError> {
    let stop_ids: std::collections::HashSet<&StopId> = stops.iter().map(|s| &s.stop_id).collect();
    let route_ids: std::collections::HashSet<&RouteId> =
        routes.iter().map(|r| &r.route_id).collect();

    let mut offenders = Vec::new();
    for trip in trips {
        if !route_ids.contains(&trip.route_id) {
            offenders.push(format!("trip {} references unknown route {}", trip.trip_id, trip.route_id));
        }
    }
    for stop_time in stop_times {
        if !stop_ids.contains(&stop_time.stop_id) {
            offenders.push(format!(
                "stop_time on trip {} references unknown stop {}",
                stop_time.trip_id, stop_time.stop_id
            ));
        }
    }

    if offenders.is_empty() {
        return Ok(());
    }
    let count = offenders.len();
    offenders.truncate(MAX_UNRESOLVED_OFFENDERS);
    Err(LoadError::UnresolvedReference(count, offenders))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// A throwaway GTFS bundle directory under the system temp dir, removed
    /// when dropped. Every test gets its own directory (a process-unique
    /// counter suffix) so tests can run concurrently.
    struct Fixture {
        dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Fixture {
            static COUNTER: AtomicU32 = AtomicU32::new(0);
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!("transit-planner-loader-test-{}-{}", std::process::id(), n));
            std::fs::create_dir_all(&dir).unwrap();
            Fixture { dir }
        }

        fn write(&self, filename: &str, contents: &str) -> &Self {
            let mut file = File::create(self.dir.join(filename)).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
            self
        }

        fn write_bytes(&self, filename: &str, contents: &[u8]) -> &Self {
            let mut file = File::create(self.dir.join(filename)).unwrap();
            file.write_all(contents).unwrap();
            self
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn minimal_bundle(fixture: &Fixture) {
        fixture
            .write("stops.txt", "stop_id,stop_name,stop_lat,stop_lon\nA,Stop A,0.0,0.0\nB,Stop B,0.1,0.1\n")
            .write("routes.txt", "route_id,route_type,route_short_name,route_long_name,agency_id\nR1,3,R1,Route One,AG1\n")
            .write("trips.txt", "route_id,service_id,trip_id,trip_headsign\nR1,WEEKDAY,T1,Somewhere\n")
            .write(
                "stop_times.txt",
                "trip_id,stop_sequence,stop_id,arrival_time,departure_time\n\
                 T1,0,A,08:00:00,08:00:00\n\
                 T1,1,B,08:10:00,08:10:00\n",
            );
    }

    #[test]
    fn loads_a_minimal_bundle_with_globally_tagged_ids() {
        let fixture = Fixture::new();
        minimal_bundle(&fixture);

        let records = load(&fixture.dir, "bus").expect("minimal bundle should load");
        assert_eq!(records.stops.len(), 2);
        assert_eq!(records.routes.len(), 1);
        assert_eq!(records.trips.len(), 1);
        assert_eq!(records.stop_times.len(), 2);
        assert!(records.calendars.is_empty());

        assert_eq!(records.stops[0].stop_id, StopId::global("bus", "A"));
        assert_eq!(records.trips[0].trip_id, TripId::global("bus", "T1"));
        assert_eq!(records.trips[0].route_id, RouteId::global("bus", "R1"));
    }

    #[test]
    fn strips_a_leading_byte_order_mark() {
        let fixture = Fixture::new();
        const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
        let mut stops = BOM.to_vec();
        stops.extend_from_slice(b"stop_id,stop_name,stop_lat,stop_lon\nA,Stop A,0.0,0.0\n");
        fixture.write_bytes("stops.txt", &stops);
        fixture.write("routes.txt", "route_id,route_type,route_short_name,route_long_name,agency_id\n");
        fixture.write("trips.txt", "route_id,service_id,trip_id,trip_headsign\n");
        fixture.write("stop_times.txt", "trip_id,stop_sequence,stop_id,arrival_time,departure_time\n");

        let records = load(&fixture.dir, "rail").expect("BOM-prefixed file should still parse");
        assert_eq!(records.stops.len(), 1);
        assert_eq!(records.stops[0].name, "Stop A");
    }

    #[test]
    fn missing_mandatory_file_is_fatal() {
        let fixture = Fixture::new();
        // stops.txt deliberately absent.
        fixture.write("routes.txt", "route_id,route_type,route_short_name,route_long_name,agency_id\n");
        fixture.write("trips.txt", "route_id,service_id,trip_id,trip_headsign\n");
        fixture.write("stop_times.txt", "trip_id,stop_sequence,stop_id,arrival_time,departure_time\n");

        match load(&fixture.dir, "rail") {
            Err(LoadError::MissingFile(file)) => assert_eq!(file, "stops.txt"),
            other => panic!("expected MissingFile, got {:?}", other),
        }
    }

    #[test]
    fn missing_mandatory_column_is_fatal() {
        let fixture = Fixture::new();
        // stop_lon is missing from the header.
        fixture.write("stops.txt", "stop_id,stop_name,stop_lat\nA,Stop A,0.0\n");
        fixture.write("routes.txt", "route_id,route_type,route_short_name,route_long_name,agency_id\n");
        fixture.write("trips.txt", "route_id,service_id,trip_id,trip_headsign\n");
        fixture.write("stop_times.txt", "trip_id,stop_sequence,stop_id,arrival_time,departure_time\n");

        match load(&fixture.dir, "rail") {
            Err(LoadError::MalformedFeed { file, detail }) => {
                assert_eq!(file, "stops.txt");
                assert!(detail.contains("stop_lon"));
            }
            other => panic!("expected MalformedFeed, got {:?}", other),
        }
    }

    #[test]
    fn unresolved_stop_reference_is_fatal() {
        let fixture = Fixture::new();
        fixture.write("stops.txt", "stop_id,stop_name,stop_lat,stop_lon\nA,Stop A,0.0,0.0\n");
        fixture.write("routes.txt", "route_id,route_type,route_short_name,route_long_name,agency_id\nR1,3,R1,Route One,AG1\n");
        fixture.write("trips.txt", "route_id,service_id,trip_id,trip_headsign\nR1,WEEKDAY,T1,Somewhere\n");
        // references stop "B", which stops.txt never declares.
        fixture.write(
            "stop_times.txt",
            "trip_id,stop_sequence,stop_id,arrival_time,departure_time\n\
             T1,0,A,08:00:00,08:00:00\n\
             T1,1,B,08:10:00,08:10:00\n",
        );

        match load(&fixture.dir, "rail") {
            Err(LoadError::UnresolvedReference(count, offenders)) => {
                assert_eq!(count, 1);
                assert!(offenders[0].contains("unknown stop"));
            }
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn calendar_and_exceptions_round_trip() {
        let fixture = Fixture::new();
        minimal_bundle(&fixture);
        fixture.write(
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WEEKDAY,1,1,1,1,1,0,0,20240101,20241231\n",
        );
        fixture.write(
            "calendar_dates.txt",
            "service_id,date,exception_type\nWEEKDAY,20240906,2\n",
        );

        let records = load(&fixture.dir, "rail").expect("bundle with calendar data should load");
        assert_eq!(records.calendars.len(), 1);
        assert!(records.calendars[0].weekdays[0]); // Monday
        assert!(!records.calendars[0].weekdays[5]); // Saturday
        assert_eq!(records.calendar_exceptions.len(), 1);
        assert_eq!(records.calendar_exceptions[0].exception_type, ExceptionType::Removed);
    }

    #[test]
    fn transfers_parse_minimum_time() {
        let fixture = Fixture::new();
        minimal_bundle(&fixture);
        fixture.write(
            "transfers.txt",
            "from_stop_id,to_stop_id,transfer_type,min_transfer_time\nA,B,2,180\n",
        );

        let records = load(&fixture.dir, "rail").expect("bundle with transfers should load");
        assert_eq!(records.transfers.len(), 1);
        assert_eq!(records.transfers[0].min_transfer_time, Some(Duration::seconds(180)));
    }
}
