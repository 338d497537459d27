//! Problem instances for the capacitated VRP with time windows.
//!
//! An [`Instance`] is built once per solve call through [`InstanceBuilder`], which
//! validates every count and time window before anything downstream sees the data.
//! Node index 0 is the depot; customers keep their 1-based ids as node indices.

use crate::error::InputValidationError;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minutes in a day; window bounds live in `[0, MINUTES_PER_DAY)`.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Default depot coordinate.
pub const DEFAULT_DEPOT: Point = Point { x: 4.0, y: 4.0 };

/// Default uniform vehicle capacity.
pub const DEFAULT_CAPACITY: f64 = 10.0;

/// A 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Euclidean distance.
    #[inline]
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Hour and minute of the day, as entered by a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Self {
        ClockTime { hour, minute }
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }

    pub fn to_minutes(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    pub fn from_minutes(minutes: u32) -> Self {
        ClockTime { hour: minutes / 60, minute: minutes % 60 }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Service window `[start, end]` in minutes of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    /// Validated constructor: `start <= end < 1440`.
    pub fn new(customer: usize, start: u32, end: u32) -> Result<Self, InputValidationError> {
        if start > end || end >= MINUTES_PER_DAY {
            return Err(InputValidationError::MalformedTimeWindow { customer, start, end });
        }
        Ok(TimeWindow { start, end })
    }

    pub fn from_clock(
        customer: usize,
        start: ClockTime,
        end: ClockTime,
    ) -> Result<Self, InputValidationError> {
        for t in [start, end] {
            if !t.is_valid() {
                return Err(InputValidationError::InvalidClockTime {
                    customer,
                    hour: t.hour,
                    minute: t.minute,
                });
            }
        }
        Self::new(customer, start.to_minutes(), end.to_minutes())
    }

    /// The whole day, used when no window was supplied for a customer.
    pub fn full_day() -> Self {
        TimeWindow { start: 0, end: MINUTES_PER_DAY - 1 }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn start_clock(&self) -> ClockTime {
        ClockTime::from_minutes(self.start)
    }

    pub fn end_clock(&self) -> ClockTime {
        ClockTime::from_minutes(self.end)
    }

    /// Whether `time` lies in the window, up to `tolerance` on both sides.
    pub fn contains(&self, time: f64, tolerance: f64) -> bool {
        time >= self.start as f64 - tolerance && time <= self.end as f64 + tolerance
    }
}

/// A customer to deliver to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// 1-based identifier, also the node index in the distance table
    pub id: usize,
    /// Display label (`ID_<id>`)
    pub name: String,
    pub location: Point,
    /// Goods weight drawn from the goods pool
    pub demand: u32,
    /// Service window, when the instance is time-windowed
    pub window: Option<TimeWindow>,
}

/// A delivery vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// 0-based identifier
    pub id: usize,
    pub capacity: f64,
}

/// Dense Euclidean distance table over depot (index 0) and customers (1..=N).
#[derive(Debug, Clone)]
pub struct DistanceTable {
    size: usize,
    data: Vec<f64>,
}

impl DistanceTable {
    /// Compute the table for the given node coordinates.
    pub fn from_points(points: &[Point]) -> Self {
        let size = points.len();
        let mut data = vec![0.0; size * size];
        for i in 0..size {
            for j in (i + 1)..size {
                let d = points[i].distance_to(&points[j]);
                data[i * size + j] = d;
                data[j * size + i] = d;
            }
        }
        DistanceTable { size, data }
    }

    /// Number of nodes covered by the table.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Distance between two nodes; `None` for `i == j`, where arcs are undefined.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i == j || i >= self.size || j >= self.size {
            return None;
        }
        Some(self.data[i * self.size + j])
    }

    /// Longest arc leaving `i` towards any node in `nodes`.
    pub fn max_from(&self, i: usize, nodes: impl Iterator<Item = usize>) -> f64 {
        nodes
            .filter_map(|j| self.get(i, j))
            .max_by_key(|&d| OrderedFloat(d))
            .unwrap_or(0.0)
    }
}

/// A complete, validated problem instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub depot: Point,
    pub customers: Vec<Customer>,
    pub vehicles: Vec<Vehicle>,
    /// Size of the goods pool demands were drawn from
    pub num_goods: usize,
    /// Seed used for sampled data
    pub seed: u64,
    distances: DistanceTable,
}

impl Instance {
    pub fn num_customers(&self) -> usize {
        self.customers.len()
    }

    pub fn num_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    /// Depot plus customers.
    pub fn num_nodes(&self) -> usize {
        self.customers.len() + 1
    }

    /// Customer ids, `1..=N`.
    pub fn customer_ids(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.customers.len()
    }

    /// Customer by 1-based id.
    #[inline]
    pub fn customer(&self, id: usize) -> &Customer {
        &self.customers[id - 1]
    }

    #[inline]
    pub fn demand(&self, id: usize) -> u32 {
        self.customer(id).demand
    }

    pub fn window(&self, id: usize) -> Option<&TimeWindow> {
        self.customer(id).window.as_ref()
    }

    pub fn capacity(&self, vehicle: usize) -> f64 {
        self.vehicles[vehicle].capacity
    }

    /// True when every customer carries a time window.
    pub fn is_time_windowed(&self) -> bool {
        !self.customers.is_empty() && self.customers.iter().all(|c| c.window.is_some())
    }

    /// Distance between two node indices (0 = depot).
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> Option<f64> {
        self.distances.get(i, j)
    }

    pub fn distances(&self) -> &DistanceTable {
        &self.distances
    }

    /// Location of a node index (0 = depot).
    pub fn location(&self, node: usize) -> Point {
        if node == 0 {
            self.depot
        } else {
            self.customer(node).location
        }
    }

    pub fn total_demand(&self) -> u32 {
        self.customers.iter().map(|c| c.demand).sum()
    }

    pub fn statistics(&self) -> InstanceStatistics {
        let mut distances = Vec::new();
        for i in self.customer_ids() {
            for j in (i + 1)..=self.num_customers() {
                if let Some(d) = self.distance(i, j) {
                    distances.push(d);
                }
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);
        let capacity = self.vehicles.first().map(|v| v.capacity).unwrap_or(0.0);

        InstanceStatistics {
            num_customers: self.num_customers(),
            num_vehicles: self.num_vehicles(),
            num_goods: self.num_goods,
            capacity,
            total_demand: self.total_demand(),
            max_demand: self.customers.iter().map(|c| c.demand).max().unwrap_or(0),
            time_windowed: self.is_time_windowed(),
            avg_distance,
            max_distance,
        }
    }
}

/// Summary figures about an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub num_customers: usize,
    pub num_vehicles: usize,
    pub num_goods: usize,
    pub capacity: f64,
    pub total_demand: u32,
    pub max_demand: u32,
    pub time_windowed: bool,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {} customers, {} vehicles, {} goods", self.num_customers, self.num_vehicles, self.num_goods)?;
        writeln!(f, "  Capacity per vehicle: {}", self.capacity)?;
        writeln!(f, "  Total demand: {} (max single demand: {})", self.total_demand, self.max_demand)?;
        writeln!(f, "  Fleet capacity: {}", self.capacity * self.num_vehicles as f64)?;
        writeln!(f, "  Time windows: {}", if self.time_windowed { "yes" } else { "no" })?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)
    }
}

#[derive(Debug, Clone, Copy)]
enum WindowSpec {
    Minutes { start: u32, end: u32 },
    Clock { start: ClockTime, end: ClockTime },
}

/// Builder validating the inputs of one solve call.
///
/// Missing data is sampled from a seeded ChaCha RNG: customer locations are uniform
/// over `[0, N] x [0, K]` and demands are a shuffled permutation of `0..G` cycled
/// across customers.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    num_customers: usize,
    num_vehicles: usize,
    num_goods: usize,
    seed: u64,
    capacity: f64,
    depot: Point,
    locations: Option<Vec<Point>>,
    demands: Option<Vec<u32>>,
    windows: BTreeMap<usize, WindowSpec>,
    time_windowed: bool,
}

impl InstanceBuilder {
    pub fn new(num_customers: usize, num_vehicles: usize, num_goods: usize) -> Self {
        InstanceBuilder {
            num_customers,
            num_vehicles,
            num_goods,
            seed: 42,
            capacity: DEFAULT_CAPACITY,
            depot: DEFAULT_DEPOT,
            locations: None,
            demands: None,
            windows: BTreeMap::new(),
            time_windowed: true,
        }
    }

    pub fn num_customers(&self) -> usize {
        self.num_customers
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn num_goods(&self) -> usize {
        self.num_goods
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn depot(mut self, depot: Point) -> Self {
        self.depot = depot;
        self
    }

    /// Externally supplied locations, one per customer in id order.
    pub fn locations(mut self, locations: Vec<Point>) -> Self {
        self.locations = Some(locations);
        self
    }

    /// Externally supplied demands, one per customer in id order.
    pub fn demands(mut self, demands: Vec<u32>) -> Self {
        self.demands = Some(demands);
        self
    }

    /// Window in minutes of the day for one customer.
    pub fn time_window(mut self, customer: usize, start: u32, end: u32) -> Self {
        self.windows.insert(customer, WindowSpec::Minutes { start, end });
        self
    }

    /// Window given as clock times for one customer.
    pub fn clock_window(mut self, customer: usize, start: ClockTime, end: ClockTime) -> Self {
        self.windows.insert(customer, WindowSpec::Clock { start, end });
        self
    }

    /// Drop time windows entirely (capacity-only instance).
    pub fn without_time_windows(mut self) -> Self {
        self.time_windowed = false;
        self
    }

    pub fn build(self) -> Result<Instance, InputValidationError> {
        for (what, value) in [
            ("number of customers", self.num_customers),
            ("number of vehicles", self.num_vehicles),
            ("number of goods", self.num_goods),
        ] {
            if value == 0 {
                return Err(InputValidationError::NonPositiveCount { what, value });
            }
        }
        if !self.capacity.is_finite() || self.capacity < 0.0 {
            return Err(InputValidationError::InvalidCapacity(self.capacity));
        }

        let n = self.num_customers;
        let windows = self.validated_windows()?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let locations = match self.locations {
            Some(locs) => {
                if locs.len() != n {
                    return Err(InputValidationError::LengthMismatch {
                        what: "locations",
                        expected: n,
                        found: locs.len(),
                    });
                }
                locs
            }
            None => {
                let width = n as f64;
                let height = self.num_vehicles as f64;
                (0..n)
                    .map(|_| Point::new(rng.gen::<f64>() * width, rng.gen::<f64>() * height))
                    .collect()
            }
        };
        if let Some(pos) = locations.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(InputValidationError::InvalidLocation { customer: pos + 1 });
        }
        if !self.depot.x.is_finite() || !self.depot.y.is_finite() {
            return Err(InputValidationError::InvalidLocation { customer: 0 });
        }

        let demands = match self.demands {
            Some(demands) => {
                if demands.len() != n {
                    return Err(InputValidationError::LengthMismatch {
                        what: "demands",
                        expected: n,
                        found: demands.len(),
                    });
                }
                if let Some(j) = demands.iter().position(|&d| d as usize >= self.num_goods) {
                    return Err(InputValidationError::DemandOutOfPool {
                        customer: j + 1,
                        demand: demands[j],
                        num_goods: self.num_goods,
                    });
                }
                demands
            }
            None => {
                let mut pool: Vec<u32> = (0..self.num_goods as u32).collect();
                pool.shuffle(&mut rng);
                (0..n).map(|j| pool[j % pool.len()]).collect()
            }
        };

        let customers: Vec<Customer> = (0..n)
            .map(|j| {
                let id = j + 1;
                Customer {
                    id,
                    name: format!("ID_{}", id),
                    location: locations[j],
                    demand: demands[j],
                    window: windows.as_ref().map(|w| w[j]),
                }
            })
            .collect();

        let vehicles = (0..self.num_vehicles)
            .map(|id| Vehicle { id, capacity: self.capacity })
            .collect();

        let mut points = Vec::with_capacity(n + 1);
        points.push(self.depot);
        points.extend(customers.iter().map(|c| c.location));
        let distances = DistanceTable::from_points(&points);

        log::debug!(
            "built instance: {} customers, {} vehicles, {} goods (seed {})",
            n,
            self.num_vehicles,
            self.num_goods,
            self.seed
        );

        Ok(Instance {
            depot: self.depot,
            customers,
            vehicles,
            num_goods: self.num_goods,
            seed: self.seed,
            distances,
        })
    }

    /// One window per customer, or `None` for a capacity-only instance.
    fn validated_windows(&self) -> Result<Option<Vec<TimeWindow>>, InputValidationError> {
        let n = self.num_customers;
        let mut parsed = BTreeMap::new();
        for (&customer, spec) in &self.windows {
            if customer == 0 || customer > n {
                return Err(InputValidationError::UnknownCustomer { customer, num_customers: n });
            }
            let window = match *spec {
                WindowSpec::Minutes { start, end } => TimeWindow::new(customer, start, end)?,
                WindowSpec::Clock { start, end } => TimeWindow::from_clock(customer, start, end)?,
            };
            parsed.insert(customer, window);
        }

        if !self.time_windowed {
            return Ok(None);
        }
        if parsed.is_empty() {
            return Ok(Some(vec![TimeWindow::full_day(); n]));
        }
        (1..=n)
            .map(|id| {
                parsed
                    .get(&id)
                    .copied()
                    .ok_or(InputValidationError::MissingTimeWindow { customer: id })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let table = DistanceTable::from_points(&[Point::new(0.0, 0.0), Point::new(3.0, 4.0)]);

        assert!((table.get(0, 1).unwrap() - 5.0).abs() < 1e-10);
        assert!((table.get(1, 0).unwrap() - 5.0).abs() < 1e-10);
        assert_eq!(table.get(1, 1), None);
    }

    #[test]
    fn test_zero_customers_rejected() {
        let err = InstanceBuilder::new(0, 2, 3).build().unwrap_err();
        assert_eq!(
            err,
            InputValidationError::NonPositiveCount { what: "number of customers", value: 0 }
        );
    }

    #[test]
    fn test_zero_vehicles_and_goods_rejected() {
        assert!(matches!(
            InstanceBuilder::new(3, 0, 3).build(),
            Err(InputValidationError::NonPositiveCount { what: "number of vehicles", .. })
        ));
        assert!(matches!(
            InstanceBuilder::new(3, 1, 0).build(),
            Err(InputValidationError::NonPositiveCount { what: "number of goods", .. })
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = InstanceBuilder::new(3, 1, 3).time_window(2, 600, 500).build().unwrap_err();
        assert_eq!(err, InputValidationError::MalformedTimeWindow { customer: 2, start: 600, end: 500 });
    }

    #[test]
    fn test_window_past_midnight_rejected() {
        assert!(InstanceBuilder::new(1, 1, 1).time_window(1, 0, 1440).build().is_err());
        assert!(InstanceBuilder::new(1, 1, 1)
            .clock_window(1, ClockTime::new(8, 0), ClockTime::new(24, 0))
            .build()
            .is_err());
        assert!(matches!(
            InstanceBuilder::new(1, 1, 1)
                .clock_window(1, ClockTime::new(8, 75), ClockTime::new(9, 0))
                .build(),
            Err(InputValidationError::InvalidClockTime { customer: 1, hour: 8, minute: 75 })
        ));
    }

    #[test]
    fn test_partial_windows_rejected() {
        let err = InstanceBuilder::new(3, 1, 3).time_window(1, 480, 600).build().unwrap_err();
        assert_eq!(err, InputValidationError::MissingTimeWindow { customer: 2 });

        let err = InstanceBuilder::new(2, 1, 2).time_window(3, 480, 600).build().unwrap_err();
        assert_eq!(err, InputValidationError::UnknownCustomer { customer: 3, num_customers: 2 });
    }

    #[test]
    fn test_demands_cycle_goods_permutation() {
        let instance = InstanceBuilder::new(7, 2, 3).seed(7).build().unwrap();
        let demands: Vec<u32> = instance.customers.iter().map(|c| c.demand).collect();

        let mut first: Vec<u32> = demands[..3].to_vec();
        first.sort();
        assert_eq!(first, vec![0, 1, 2]);
        for j in 3..7 {
            assert_eq!(demands[j], demands[j % 3]);
        }
    }

    #[test]
    fn test_sampled_locations_in_bounds_and_reproducible() {
        let a = InstanceBuilder::new(5, 2, 5).seed(11).build().unwrap();
        let b = InstanceBuilder::new(5, 2, 5).seed(11).build().unwrap();
        for (ca, cb) in a.customers.iter().zip(&b.customers) {
            assert_eq!(ca.location, cb.location);
            assert!(ca.location.x >= 0.0 && ca.location.x <= 5.0);
            assert!(ca.location.y >= 0.0 && ca.location.y <= 2.0);
        }
    }

    #[test]
    fn test_supplied_data_and_ids() {
        let instance = InstanceBuilder::new(2, 1, 5)
            .locations(vec![Point::new(0.0, 0.0), Point::new(0.0, 2.0)])
            .demands(vec![4, 1])
            .build()
            .unwrap();

        assert_eq!(instance.customer(1).name, "ID_1");
        assert_eq!(instance.demand(2), 1);
        assert_eq!(instance.distance(1, 2), Some(2.0));
        assert_eq!(instance.distance(0, 1), Some(DEFAULT_DEPOT.distance_to(&Point::new(0.0, 0.0))));
        assert!(instance.is_time_windowed());
        assert_eq!(instance.window(1), Some(&TimeWindow::full_day()));

        let err = InstanceBuilder::new(2, 1, 5).demands(vec![1]).build().unwrap_err();
        assert!(matches!(err, InputValidationError::LengthMismatch { what: "demands", .. }));

        let err = InstanceBuilder::new(2, 1, 5).demands(vec![4, 5]).build().unwrap_err();
        assert_eq!(err, InputValidationError::DemandOutOfPool { customer: 2, demand: 5, num_goods: 5 });
    }

    #[test]
    fn test_without_time_windows() {
        let instance = InstanceBuilder::new(3, 1, 3).without_time_windows().build().unwrap();
        assert!(!instance.is_time_windowed());
        assert!(instance.customers.iter().all(|c| c.window.is_none()));
    }
}
