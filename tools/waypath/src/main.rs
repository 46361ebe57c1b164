use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use waypath_core::network::static_network::DEFAULT_INDEX_TABLE;
use waypath_core::spatial::{import_staging, StagingWriter};
use waypath_core::transit::store::write_timetable;
use waypath_core::transit::Timetable;
use waypath_core::{
    Metric, NearestPointResult, NetworkModel, Point, RouteQuery, Router, SearchResult, SpatialConfig, StaticNetwork,
    TransitNetwork, VertexId,
};

#[derive(Parser, Debug)]
#[command(
    name = "waypath",
    author,
    version,
    about = "Route, snap and index networks from the command line",
    long_about = "Loads a static or transit network from SQLite and answers shortest path, \
                  local search and nearest vertex queries as JSON.\n\n\
                  Also builds the inputs: vertex spatial index tables for static networks \
                  and transit network files from GTFS feeds."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (show debug messages)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Static,
    Transit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MetricArg {
    Distance,
    Time,
}

impl From<MetricArg> for Metric {
    fn from(metric: MetricArg) -> Self {
        match metric {
            MetricArg::Distance => Metric::Distance,
            MetricArg::Time => Metric::Time,
        }
    }
}

#[derive(clap::Args, Debug)]
struct NetworkArgs {
    /// SQLite network file
    #[arg(short, long)]
    network: PathBuf,

    /// Network kind
    #[arg(long, value_enum, default_value_t = Kind::Static)]
    kind: Kind,

    /// Spatial index table of a static network
    #[arg(long, default_value = DEFAULT_INDEX_TABLE)]
    index_table: String,

    /// Decimal digits of fixed-point index coordinates
    #[arg(long)]
    precision: Option<u32>,

    /// Include payloads from the index payload table
    #[arg(long)]
    payload: bool,
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Cost to minimise
    #[arg(long, value_enum, default_value_t = MetricArg::Distance)]
    metric: MetricArg,

    /// Departure for transit networks, e.g. 2024-03-05T07:50:00
    #[arg(long, value_parser = parse_departure)]
    departure: Option<NaiveDateTime>,
}

impl QueryArgs {
    fn to_query(&self) -> RouteQuery {
        let query = RouteQuery::new(self.metric.into());
        match self.departure {
            Some(departure) => query.departing_at(departure),
            None => query,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shortest path between two coordinates
    Route {
        #[command(flatten)]
        network: NetworkArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Origin as lat,lon
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: Point,

        /// Destination as lat,lon
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: Point,

        /// Give up on paths costlier than this
        #[arg(long)]
        limit: Option<f64>,
    },

    /// Every vertex reachable from a coordinate within a cost limit
    Local {
        #[command(flatten)]
        network: NetworkArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Origin as lat,lon
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: Point,

        /// Cost limit
        #[arg(long)]
        limit: f64,
    },

    /// Vertex nearest to a coordinate
    Nearest {
        #[command(flatten)]
        network: NetworkArgs,

        /// Coordinate as lat,lon
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        at: Point,
    },

    /// Stage the vertices of a static network and import them as its spatial index
    StageIndex {
        /// SQLite network file, written in place
        #[arg(short, long)]
        network: PathBuf,

        /// Index table to create
        #[arg(long, default_value = DEFAULT_INDEX_TABLE)]
        table: String,

        /// Directory for the staging file
        #[arg(long)]
        work_dir: PathBuf,

        /// Store coordinates as fixed-point integers with this many decimal digits
        #[arg(long)]
        precision: Option<u32>,
    },

    /// Convert a GTFS feed into a transit network file
    ImportGtfs {
        /// GTFS zip file or directory
        #[arg(short, long)]
        feed: PathBuf,

        /// SQLite file to create
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lon but got {s:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude {lat:?}"))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("invalid longitude {lon:?}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate {lat},{lon} out of range"));
    }
    Ok(Point::new(lat, lon))
}

fn parse_departure(s: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("invalid departure {s:?}: {e}"))
}

enum Loaded {
    Static(StaticNetwork),
    Transit(TransitNetwork),
}

impl Loaded {
    fn model(&self) -> &dyn NetworkModel {
        match self {
            Loaded::Static(network) => network,
            Loaded::Transit(network) => network,
        }
    }

    /// Source id of a vertex, or stop id for transit networks
    fn label(&self, vertex: VertexId) -> Option<String> {
        match self {
            Loaded::Static(network) => network.source_id(vertex).map(|id| id.to_string()),
            Loaded::Transit(network) => network
                .timetable()
                .and_then(|timetable| timetable.stop(vertex))
                .map(|stop| stop.id.as_str().to_string()),
        }
    }
}

fn network_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "network".to_string())
}

fn load_network(args: &NetworkArgs) -> Result<Loaded> {
    if !args.network.exists() {
        bail!("Network file does not exist: {}", args.network.display());
    }

    let config = SpatialConfig {
        precision: args.precision,
        with_payload: args.payload,
        ..SpatialConfig::default()
    };
    let name = network_name(&args.network);
    log::info!("Loading {:?} network {} from {}", args.kind, name, args.network.display());

    let loaded = match args.kind {
        Kind::Static => {
            let mut network = StaticNetwork::new(name)
                .with_index_table(args.index_table.as_str())
                .with_spatial_config(config);
            network.parse(&args.network).context("Failed to load static network")?;
            Loaded::Static(network)
        }
        Kind::Transit => {
            let mut network = TransitNetwork::new(name).with_spatial_config(config);
            network.parse(&args.network).context("Failed to load transit network")?;
            Loaded::Transit(network)
        }
    };
    log::info!("  {} vertices", loaded.model().num_vertices());
    Ok(loaded)
}

#[derive(Serialize)]
struct RouteOutput<'a> {
    #[serde(flatten)]
    result: &'a SearchResult,
    valid: bool,
    labels: Vec<String>,
}

#[derive(Serialize)]
struct NearestOutput {
    #[serde(flatten)]
    result: NearestPointResult,
    label: Option<String>,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn route_output<'a>(loaded: &Loaded, result: &'a SearchResult) -> RouteOutput<'a> {
    RouteOutput {
        result,
        valid: result.is_valid(),
        labels: result
            .path
            .iter()
            .map(|&v| loaded.label(v).unwrap_or_default())
            .collect(),
    }
}

fn check_departure(loaded: &Loaded, query: &RouteQuery) {
    if matches!(loaded, Loaded::Transit(_)) && query.departure.is_none() {
        log::warn!("Transit networks have no edges without --departure");
    }
}

fn stage_index(network_path: &Path, table: &str, work_dir: &Path, precision: Option<u32>) -> Result<()> {
    let mut conn = rusqlite::Connection::open(network_path)
        .with_context(|| format!("Failed to open {}", network_path.display()))?;
    let existing: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if existing > 0 {
        bail!("Table {} already exists in {}", table, network_path.display());
    }

    let mut network = StaticNetwork::new(network_name(network_path));
    network.parse(network_path).context("Failed to load static network")?;

    std::fs::create_dir_all(work_dir)?;
    let rows_path = work_dir.join(format!("{table}.rows"));
    let mut writer = StagingWriter::create(&rows_path, None, precision)?;
    for vertex in 0..network.num_vertices() as VertexId {
        if let (Some(id), Some(point)) = (network.source_id(vertex), network.point(vertex)) {
            writer.append(id, point, None)?;
        }
    }
    let staged = writer.finish()?;
    network.unload();
    log::info!("Staged {} vertices to {}", staged, rows_path.display());

    let stats = import_staging(&mut conn, table, &rows_path, None, precision).context("Failed to import staged rows")?;
    log::info!("Imported {} rows into {} ({} skipped)", stats.rows, table, stats.skipped);
    Ok(())
}

fn import_gtfs(feed: &Path, output: &Path) -> Result<()> {
    if !feed.exists() {
        bail!("Feed does not exist: {}", feed.display());
    }
    if output.exists() {
        bail!("Output file already exists: {}", output.display());
    }

    log::info!("Reading GTFS feed {}", feed.display());
    let gtfs = gtfs_structures::Gtfs::new(&feed.to_string_lossy()).context("Failed to read GTFS feed")?;
    let timetable = Timetable::from_gtfs(&gtfs);
    log::info!(
        "  {} stops, {} trips, {} rows skipped",
        timetable.num_stops(),
        timetable.num_trips(),
        timetable.stats().total()
    );

    let mut conn = rusqlite::Connection::open(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    write_timetable(&mut conn, &timetable).context("Failed to write timetable")?;
    log::info!("Wrote {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    match args.command {
        Command::Route {
            network,
            query,
            from,
            to,
            limit,
        } => {
            let loaded = load_network(&network)?;
            let mut query = query.to_query();
            if let Some(limit) = limit {
                query = query.with_cost_limit(limit);
            }
            check_departure(&loaded, &query);

            let result = Router::route(loaded.model(), from, to, &query)?;
            if result.is_valid() {
                log::info!("Found path over {} vertices, cost {}", result.path.len(), result.cost);
            } else {
                log::warn!("No path from {} to {}", from, to);
            }
            print_json(&route_output(&loaded, &result))?;
        }
        Command::Local {
            network,
            query,
            from,
            limit,
        } => {
            let loaded = load_network(&network)?;
            let query = query.to_query();
            check_departure(&loaded, &query);

            let result = Router::local(loaded.model(), from, &query, limit)?;
            log::info!("Reached {} vertices within {}", result.reached.len(), limit);
            print_json(&route_output(&loaded, &result))?;
        }
        Command::Nearest { network, at } => {
            let loaded = load_network(&network)?;
            match loaded.model().nearest(at)? {
                Some(result) => {
                    let label = loaded.label(result.target);
                    print_json(&NearestOutput { result, label })?;
                }
                None => bail!("No vertex near {}", at),
            }
        }
        Command::StageIndex {
            network,
            table,
            work_dir,
            precision,
        } => stage_index(&network, &table, &work_dir, precision)?,
        Command::ImportGtfs { feed, output } => import_gtfs(&feed, &output)?,
    }

    Ok(())
}
