#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use gridly::prelude::*;
use gridly_grids::VecGrid;
use joinery::prelude::*;
use lazy_format::lazy_format;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::{self, Regex};
use thiserror::Error;
use tracing::{debug, error, info, trace};
use tracing_subscriber::EnvFilter;

/// Size the regions of a list of chronal coordinates.
///
/// Prints the size of the largest finite nearest-coordinate region, then
/// the size of the region whose total distance to every coordinate is
/// under the threshold.
#[derive(Debug, Parser)]
#[command(name = "day6")]
struct Args {
    /// Puzzle input, one "x, y" coordinate per line. Read from stdin when omitted.
    input: Option<PathBuf>,

    /// Exclusive upper bound on the total distance of a safe cell
    #[arg(short, long, default_value_t = 10000)]
    threshold: isize,
}

#[inline(always)]
fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let result = f();
    let end = Instant::now();
    (result, end - start)
}

trait ReadString: Read {
    fn read_string(&mut self) -> io::Result<String> {
        let mut data = String::new();
        self.read_to_string(&mut data).map(|_| data)
    }
}

impl<T: Read> ReadString for T {}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    let mut input = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Error reading input file {}", path.display()))?,
        None => io::stdin()
            .read_string()
            .context("Error reading input from stdin")?,
    };

    input.truncate(input.trim_end().len());
    Ok(input)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    let args = Args::parse();

    let ((), total_duration) = timed(move || {
        let input = read_input(args.input.as_deref()).unwrap_or_else(|err| {
            error!("{:#}", err);
            exit(1);
        });

        let threshold = args.threshold;
        let (solution, duration) = timed(move || solve(&input, threshold));
        match solution {
            Ok(solution) => println!("{}", solution),
            Err(err) => {
                error!("{}", err);
                exit(1);
            }
        }

        info!(?duration, "algorithm duration");
    });
    info!(?total_duration, "total duration");
}

trait RegexExtractor<'t> {
    fn field(&self, index: usize) -> Option<&'t str>;

    fn parse<T: FromStr>(&self, index: usize) -> Option<T>;
}

impl<'t> RegexExtractor<'t> for regex::Captures<'t> {
    #[inline]
    fn field(&self, index: usize) -> Option<&'t str> {
        self.get(index).map(|group| group.as_str())
    }

    #[inline]
    fn parse<T: FromStr>(&self, index: usize) -> Option<T> {
        self.field(index)?.parse().ok()
    }
}

// CODE GOES HERE

#[derive(Debug, Clone, Error, PartialEq, Eq)]
enum Day6Error {
    #[error("line {line}: expected \"<x>, <y>\", got {text:?}")]
    Parse { line: usize, text: String },

    #[error("no coordinates in input")]
    EmptyInput,

    #[error("every region touches the edge of the grid; none are finite")]
    NoFiniteRegion,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Coordinate {
    x: isize,
    y: isize,
    id: usize,
}

impl Coordinate {
    fn distance(&self, x: isize, y: isize) -> isize {
        (self.x - x).abs() + (self.y - y).abs()
    }

    fn distance_to(&self, loc: Location) -> isize {
        self.distance(loc.column.0, loc.row.0)
    }
}

lazy_static! {
    static ref COORDINATE: Regex = Regex::new(r"^\s*(\d+)\s*,\s*(\d+)\s*$").unwrap();
}

/// Parse one coordinate per line. Ids are handed out in input order;
/// blank lines are skipped without using one up.
fn load_coordinates(input: &str) -> Result<Vec<Coordinate>, Day6Error> {
    let mut coordinates = Vec::new();

    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let point = COORDINATE
            .captures(line)
            .and_then(|caps| Some((caps.parse::<isize>(1)?, caps.parse::<isize>(2)?)));

        match point {
            Some((x, y)) => coordinates.push(Coordinate {
                x,
                y,
                id: coordinates.len(),
            }),
            None => {
                return Err(Day6Error::Parse {
                    line: index + 1,
                    text: line.to_owned(),
                })
            }
        }
    }

    Ok(coordinates)
}

/// Allocate a grid covering (0, 0) through the largest x and y of any
/// coordinate, filled with the cell type's default.
fn build_grid<T: Default + Clone>(coordinates: &[Coordinate]) -> Result<VecGrid<T>, Day6Error> {
    let max_x = coordinates
        .iter()
        .map(|c| c.x)
        .max()
        .ok_or(Day6Error::EmptyInput)?;
    let max_y = coordinates
        .iter()
        .map(|c| c.y)
        .max()
        .ok_or(Day6Error::EmptyInput)?;

    VecGrid::new(Rows(max_y + 1) + Columns(max_x + 1)).ok_or(Day6Error::EmptyInput)
}

fn locations<G: GridBounds>(grid: &G) -> Vec<Location> {
    grid.row_range().cross(grid.column_range()).collect()
}

/// Compute every cell independently on the thread pool, then store the
/// results from this thread.
fn fill_cells<T: Send>(grid: &mut VecGrid<T>, compute: impl Fn(Location) -> T + Sync) {
    let locations = locations(&*grid);
    let values: Vec<T> = locations.par_iter().map(|&loc| compute(loc)).collect();

    for (loc, value) in locations.into_iter().zip(values) {
        grid[loc] = value;
    }
}

fn on_border<G: GridBounds>(grid: &G, loc: Location) -> bool {
    loc.row.0 == 0
        || loc.column.0 == 0
        || loc.row.0 == grid.num_rows().0 - 1
        || loc.column.0 == grid.num_columns().0 - 1
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
enum OwnerCell {
    Unset,
    Owned(usize),
    Contested,
}

impl Default for OwnerCell {
    fn default() -> Self {
        OwnerCell::Unset
    }
}

impl Display for OwnerCell {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            OwnerCell::Owned(id) => ((b'a' + (id % 26) as u8) as char).fmt(f),
            OwnerCell::Contested => '.'.fmt(f),
            OwnerCell::Unset => '?'.fmt(f),
        }
    }
}

fn nearest_owner(coordinates: &[Coordinate], loc: Location) -> OwnerCell {
    let mut nearest: Option<(isize, usize)> = None;
    let mut tied = false;

    for coord in coordinates {
        let distance = coord.distance_to(loc);

        match nearest {
            Some((best, _)) if distance > best => {}
            Some((best, _)) if distance == best => tied = true,
            _ => {
                nearest = Some((distance, coord.id));
                tied = false;
            }
        }
    }

    match nearest {
        Some((_, id)) if !tied => OwnerCell::Owned(id),
        _ => OwnerCell::Contested,
    }
}

/// Give each cell to the single closest coordinate. Cells with more than
/// one coordinate at the minimum distance are contested.
fn partition(grid: &mut VecGrid<OwnerCell>, coordinates: &[Coordinate]) {
    fill_cells(grid, |loc| nearest_owner(coordinates, loc));
}

/// Any owner seen on the edge of the grid has a region that keeps going
/// past it. Wipe those regions out and return their ids.
fn remove_infinite_regions(grid: &mut VecGrid<OwnerCell>) -> BTreeSet<usize> {
    let all = locations(&*grid);

    let infinite: BTreeSet<usize> = all
        .iter()
        .filter(|&&loc| on_border(&*grid, loc))
        .filter_map(|&loc| match grid[loc] {
            OwnerCell::Owned(id) => Some(id),
            OwnerCell::Contested | OwnerCell::Unset => None,
        })
        .collect();

    for loc in all {
        if let OwnerCell::Owned(id) = grid[loc] {
            if infinite.contains(&id) {
                grid[loc] = OwnerCell::Contested;
            }
        }
    }

    infinite
}

fn largest_area(grid: &VecGrid<OwnerCell>) -> Result<usize, Day6Error> {
    let mut areas: HashMap<usize, usize> = HashMap::new();

    for loc in locations(grid) {
        if let OwnerCell::Owned(id) = grid[loc] {
            *areas.entry(id).or_default() += 1;
        }
    }

    areas.values().copied().max().ok_or(Day6Error::NoFiniteRegion)
}

fn render(grid: &VecGrid<OwnerCell>) -> impl Display + '_ {
    lazy_format!("{row}\n" for row in (0..grid.num_rows().0).map(Row).map(move |row|
        lazy_format!("{cell}" for cell in (0..grid.num_columns().0).map(Column).map(move |column|
            grid[(row, column)]
        ))
    ))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DistanceCell {
    Unset,
    Distance(isize),
    Excluded,
}

impl Default for DistanceCell {
    fn default() -> Self {
        DistanceCell::Unset
    }
}

/// Record each cell's total distance to every coordinate, excluding cells
/// at or above the threshold, and count what's left.
fn measure_safe_region(
    grid: &mut VecGrid<DistanceCell>,
    coordinates: &[Coordinate],
    threshold: isize,
) -> usize {
    fill_cells(grid, |loc| {
        let total: isize = coordinates.iter().map(|coord| coord.distance_to(loc)).sum();

        if total < threshold {
            DistanceCell::Distance(total)
        } else {
            DistanceCell::Excluded
        }
    });

    locations(&*grid)
        .into_iter()
        .filter(|&loc| match grid[loc] {
            DistanceCell::Distance(_) => true,
            DistanceCell::Excluded | DistanceCell::Unset => false,
        })
        .count()
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Solution {
    largest_area: usize,
    safe_region: usize,
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "{}", self.largest_area)?;
        write!(f, "{}", self.safe_region)
    }
}

fn solve(input: &str, threshold: isize) -> Result<Solution, Day6Error> {
    let coordinates = load_coordinates(input)?;

    let mut owners: VecGrid<OwnerCell> = build_grid(&coordinates)?;
    debug!(
        coordinates = coordinates.len(),
        rows = owners.num_rows().0,
        columns = owners.num_columns().0,
        "built grid"
    );

    partition(&mut owners, &coordinates);
    trace!("nearest coordinates:\n{}", render(&owners));

    let infinite = remove_infinite_regions(&mut owners);
    debug!(ids = %infinite.iter().join_with(", "), "removed infinite regions");

    let largest_area = largest_area(&owners)?;

    let mut distances: VecGrid<DistanceCell> = build_grid(&coordinates)?;
    let safe_region = measure_safe_region(&mut distances, &coordinates, threshold);
    debug!(threshold, safe_region, "measured safe region");

    Ok(Solution {
        largest_area,
        safe_region,
    })
}
