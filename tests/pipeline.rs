use std::sync::atomic::{AtomicUsize, Ordering};

use vrptw_milp::error::{ConstraintFamily, InputValidationError, SolverFailure};
use vrptw_milp::exact::{MicroLpSolver, MilpSolver, SolveOptions, SolverOutcome, TerminationStatus};
use vrptw_milp::formulation::FormulationConfig;
use vrptw_milp::instance::{InstanceBuilder, Point};
use vrptw_milp::model::MilpModel;
use vrptw_milp::pipeline;

/// Returns a fixed status and counts how often it was asked.
struct ScriptedSolver {
    status: TerminationStatus,
    calls: AtomicUsize,
}

impl ScriptedSolver {
    fn new(status: TerminationStatus) -> Self {
        ScriptedSolver { status, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MilpSolver for ScriptedSolver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn solve(&self, _model: &MilpModel, _options: &SolveOptions) -> SolverOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SolverOutcome::without_solution(self.status, format!("scripted {}", self.status))
    }
}

fn options() -> SolveOptions {
    SolveOptions { time_limit: Some(120.0), verbose: false }
}

fn four_customers() -> InstanceBuilder {
    InstanceBuilder::new(4, 2, 5)
        .locations(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ])
        .demands(vec![2, 3, 4, 1])
        .capacity(10.0)
        .time_window(1, 0, 200)
        .time_window(2, 0, 200)
        .time_window(3, 0, 200)
        .time_window(4, 0, 200)
}

#[test]
fn capacity_respected_on_small_instance() {
    let run = pipeline::run(four_customers(), FormulationConfig::default(), &MicroLpSolver::new(), &options())
        .unwrap();
    assert_eq!(run.status(), TerminationStatus::Optimal);

    let solution = run.decoded.solution.as_ref().unwrap();
    for route in &solution.routes {
        assert!(route.load <= 10.0 + 1e-9, "vehicle {} carries {}", route.vehicle, route.load);
    }

    // every customer is served by exactly one vehicle
    let owners = solution.assignment_by_customer(4);
    assert!(owners[1..].iter().all(|o| o.is_some()));
    let served: usize = solution.routes.iter().map(|r| r.customers.len()).sum();
    assert_eq!(served, 4);

    // route distance is the sum of its arcs
    let instance = run.instance();
    for route in &solution.routes {
        let expected: f64 = route.arcs.iter().map(|&(i, j)| instance.distance(i, j).unwrap()).sum();
        assert!((route.distance - expected).abs() < 1e-6);
    }

    assert!(solution.is_consistent(), "{:?}", solution.inconsistencies);
    assert!((solution.objective_value - solution.total_distance).abs() < 1e-4);
}

#[test]
fn zero_customers_rejected_before_solving() {
    let solver = ScriptedSolver::new(TerminationStatus::Optimal);
    let err = pipeline::run(InstanceBuilder::new(0, 2, 5), FormulationConfig::default(), &solver, &options())
        .unwrap_err();
    assert_eq!(err, InputValidationError::NonPositiveCount { what: "number of customers", value: 0 });
    assert_eq!(solver.calls(), 0);
}

#[test]
fn inverted_window_rejected() {
    let solver = ScriptedSolver::new(TerminationStatus::Optimal);
    let err = pipeline::run(
        InstanceBuilder::new(3, 2, 5).time_window(2, 600, 500),
        FormulationConfig::default(),
        &solver,
        &options(),
    )
    .unwrap_err();
    assert_eq!(err, InputValidationError::MalformedTimeWindow { customer: 2, start: 600, end: 500 });
    assert_eq!(solver.calls(), 0);
}

#[test]
fn infeasible_status_yields_no_routes() {
    let solver = ScriptedSolver::new(TerminationStatus::Infeasible);
    let run = pipeline::run(four_customers(), FormulationConfig::default(), &solver, &options()).unwrap();
    assert_eq!(solver.calls(), 1);
    assert!(!run.is_optimal());
    assert!(run.routes().is_empty());
    assert_eq!(run.decoded.failure, Some(SolverFailure::Infeasible));
}

#[test]
fn single_vehicle_cycle_is_infeasible() {
    // Without a depot node two customers and one vehicle can only form a cycle,
    // which the time propagation forbids.
    let builder = InstanceBuilder::new(2, 1, 3)
        .locations(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)])
        .time_window(1, 0, 100)
        .time_window(2, 0, 100);
    let run = pipeline::run(builder, FormulationConfig::default(), &MicroLpSolver::new(), &options()).unwrap();
    assert_eq!(run.status(), TerminationStatus::Infeasible);
    assert!(run.routes().is_empty());
    assert_eq!(run.summary().failure, Some(SolverFailure::Infeasible));
}

#[test]
fn depot_mode_produces_closed_tours() {
    let builder = InstanceBuilder::new(3, 2, 5)
        .locations(vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(8.0, 0.0)])
        .demands(vec![1, 2, 3])
        .depot(Point::new(4.0, 4.0))
        .time_window(1, 0, 300)
        .time_window(2, 0, 300)
        .time_window(3, 0, 300);
    let config = FormulationConfig { enable_depot_return: true, ..Default::default() };
    let run = pipeline::run(builder, config, &MicroLpSolver::new(), &options()).unwrap();
    assert_eq!(run.status(), TerminationStatus::Optimal);

    let mut visited = Vec::new();
    for route in run.routes() {
        let tour = route.tour.as_ref().unwrap();
        assert!(tour.len() >= 3, "vehicle {} tour {:?}", route.vehicle, tour);
        assert_eq!(tour.first(), Some(&0));
        assert_eq!(tour.last(), Some(&0));
        visited.extend(tour[1..tour.len() - 1].iter().copied());
    }
    visited.sort_unstable();
    assert_eq!(visited, vec![1, 2, 3]);
    assert!(run.decoded.inconsistencies().is_empty(), "{:?}", run.decoded.inconsistencies());
}

#[test]
fn linked_loads_enforce_capacity() {
    let builder = InstanceBuilder::new(3, 2, 7)
        .locations(vec![Point::new(1.0, 0.0), Point::new(2.0, 0.0), Point::new(3.0, 0.0)])
        .demands(vec![6, 5, 5])
        .capacity(10.0)
        .depot(Point::new(0.0, 0.0))
        .time_window(1, 0, 300)
        .time_window(2, 0, 300)
        .time_window(3, 0, 300);
    let config = FormulationConfig {
        enable_depot_return: true,
        link_load_to_visits: true,
        ..Default::default()
    };
    let run = pipeline::run(builder, config, &MicroLpSolver::new(), &options()).unwrap();
    assert_eq!(run.status(), TerminationStatus::Optimal);

    for route in run.routes() {
        assert!(route.load <= 10.0 + 1e-9);
        if route.customers.contains(&1) {
            assert_eq!(route.customers, vec![1]);
        }
    }
    assert!(!run
        .decoded
        .inconsistencies()
        .iter()
        .any(|p| p.family == ConstraintFamily::Capacity));
}

#[test]
fn unbounded_time_limit_solves_to_optimality() {
    let options = SolveOptions { time_limit: Some(f64::INFINITY), verbose: false };
    let run = pipeline::run(four_customers(), FormulationConfig::default(), &MicroLpSolver::new(), &options).unwrap();
    assert_eq!(run.status(), TerminationStatus::Optimal);

    let response = serde_json::to_value(run.response()).unwrap();
    assert_eq!(response["status"], "Optimal");
    let objective = response["objectiveValue"].as_f64().unwrap();
    assert!((objective - run.outcome.objective_value.unwrap()).abs() < 1e-9);

    // one outgoing arc per customer
    let assignment = response["assignment"].as_object().unwrap();
    let arcs: f64 = assignment
        .iter()
        .filter(|(name, _)| name.starts_with("x_"))
        .map(|(_, v)| v.as_f64().unwrap())
        .sum();
    assert!((arcs - 4.0).abs() < 1e-6);
}

#[test]
fn zero_time_limit_times_out_on_real_engine() {
    let options = SolveOptions { time_limit: Some(0.0), verbose: false };
    let run = pipeline::run(
        InstanceBuilder::new(8, 3, 5).seed(7),
        FormulationConfig::default(),
        &MicroLpSolver::new(),
        &options,
    )
    .unwrap();
    assert_eq!(run.status(), TerminationStatus::TimedOut);
    assert!(run.routes().is_empty());
    assert_eq!(run.decoded.failure, Some(SolverFailure::TimedOut));
    assert!(run.outcome.message.as_deref().unwrap_or("").contains("no result within"));
}
