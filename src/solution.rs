//! Decoding raw solver assignments into per-vehicle routes.
//!
//! Decoding only happens for an `Optimal` status. Any other status produces a
//! [`DecodeResult`] without routes that carries the [`SolverFailure`]. Decoded
//! routes are re-validated against the constraint families of the formulation;
//! every violation becomes a [`PostSolveInconsistency`].

use crate::error::{ConstraintFamily, PostSolveInconsistency, SolverFailure};
use crate::exact::{SolverOutcome, TerminationStatus};
use crate::formulation::Formulation;
use crate::instance::Instance;
use serde::{Deserialize, Serialize};

/// Binary values within this distance of 1 count as selected.
pub const ROUNDING_TOLERANCE: f64 = 1e-6;

/// Slack allowed on continuous checks (loads, arrival times).
pub const CHECK_TOLERANCE: f64 = 1e-4;

/// Route of one vehicle as decoded from the arc variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRoute {
    pub vehicle: usize,
    /// Selected arcs `(i, j)`, node 0 being the depot
    pub arcs: Vec<(usize, usize)>,
    /// Ordered depot-to-depot node sequence, when the depot is a model node
    pub tour: Option<Vec<usize>>,
    /// Customers served, i.e. origins of the selected arcs
    pub customers: Vec<usize>,
    /// Realized travel distance over the selected arcs
    pub distance: f64,
    /// Realized demand of the served customers
    pub load: f64,
    /// `Σ demand(i) * load[i][k]` as assigned by the engine
    pub modeled_load: f64,
    pub capacity: f64,
    /// Arrival time at each served customer
    pub arrivals: Vec<(usize, f64)>,
}

impl VehicleRoute {
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}

/// Routes decoded from an optimal assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSolution {
    pub routes: Vec<VehicleRoute>,
    pub objective_value: f64,
    pub total_distance: f64,
    pub inconsistencies: Vec<PostSolveInconsistency>,
}

impl RouteSolution {
    pub fn total_load(&self) -> f64 {
        self.routes.iter().map(|r| r.load).fold(0.0, |acc, l| acc + l)
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }

    /// Vehicle serving each customer, indexed by customer id (slot 0 unused).
    pub fn assignment_by_customer(&self, num_customers: usize) -> Vec<Option<usize>> {
        let mut owner = vec![None; num_customers + 1];
        for route in &self.routes {
            for &c in &route.customers {
                if c <= num_customers {
                    owner[c] = Some(route.vehicle);
                }
            }
        }
        owner
    }
}

/// Outcome of the decoding step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResult {
    pub status: TerminationStatus,
    pub solution: Option<RouteSolution>,
    pub failure: Option<SolverFailure>,
}

impl DecodeResult {
    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// Decoded routes; empty when the solve failed.
    pub fn routes(&self) -> &[VehicleRoute] {
        self.solution.as_ref().map(|s| s.routes.as_slice()).unwrap_or(&[])
    }

    pub fn inconsistencies(&self) -> &[PostSolveInconsistency] {
        self.solution.as_ref().map(|s| s.inconsistencies.as_slice()).unwrap_or(&[])
    }
}

/// Turns solver outcomes into routes.
#[derive(Debug, Clone)]
pub struct Decoder {
    pub rounding_tolerance: f64,
    pub check_tolerance: f64,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder {
            rounding_tolerance: ROUNDING_TOLERANCE,
            check_tolerance: CHECK_TOLERANCE,
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, instance: &Instance, formulation: &Formulation, outcome: &SolverOutcome) -> DecodeResult {
        if let Some(failure) = outcome.failure() {
            log::warn!(
                "no solution for {} customers / {} vehicles: {}",
                instance.num_customers(),
                instance.num_vehicles(),
                failure
            );
            return DecodeResult { status: outcome.status, solution: None, failure: Some(failure) };
        }

        let index = &formulation.index;
        let values = &outcome.assignment;
        if values.len() < formulation.model.num_variables() {
            let failure = SolverFailure::Engine(format!(
                "assignment has {} values for {} variables",
                values.len(),
                formulation.model.num_variables()
            ));
            log::error!("{}", failure);
            return DecodeResult { status: TerminationStatus::Error, solution: None, failure: Some(failure) };
        }

        let mut inconsistencies = Vec::new();
        let num_vehicles = instance.num_vehicles();
        let mut selected: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_vehicles];

        for (i, j, k, var) in index.arcs() {
            let v = values.value(var);
            if v >= 1.0 - self.rounding_tolerance {
                selected[k].push((i, j));
            } else if v > self.rounding_tolerance {
                inconsistencies.push(PostSolveInconsistency {
                    family: ConstraintFamily::VisitOnce,
                    vehicle: Some(k),
                    customer: if i > 0 { Some(i) } else { None },
                    detail: format!("arc ({}, {}) has fractional value {:.6}", i, j, v),
                });
            }
        }

        // Visit-once law: one outgoing arc per customer over all vehicles
        let mut outgoing = vec![0usize; instance.num_nodes()];
        for arcs in &selected {
            for &(i, _) in arcs {
                outgoing[i] += 1;
            }
        }
        for i in instance.customer_ids() {
            if outgoing[i] != 1 {
                inconsistencies.push(PostSolveInconsistency {
                    family: ConstraintFamily::VisitOnce,
                    vehicle: None,
                    customer: Some(i),
                    detail: format!("{} outgoing arcs selected, expected 1", outgoing[i]),
                });
            }
        }

        let mut routes = Vec::with_capacity(num_vehicles);
        for (k, arcs) in selected.into_iter().enumerate() {
            let mut customers: Vec<usize> = arcs.iter().map(|&(i, _)| i).filter(|&i| i > 0).collect();
            customers.sort_unstable();
            customers.dedup();

            // fold from +0.0 so an idle vehicle reports 0, not -0
            let distance = arcs
                .iter()
                .filter_map(|&(i, j)| instance.distance(i, j))
                .fold(0.0, |acc, d| acc + d);
            let load = customers
                .iter()
                .map(|&i| instance.demand(i) as f64)
                .fold(0.0, |acc, d| acc + d);
            let modeled_load = instance
                .customer_ids()
                .map(|i| instance.demand(i) as f64 * values.value(index.load(i, k)))
                .fold(0.0, |acc, d| acc + d);
            let arrivals: Vec<(usize, f64)> =
                customers.iter().map(|&i| (i, values.value(index.arrival(i, k)))).collect();

            let tour = if index.includes_depot() {
                let (tour, covered) = follow_tour(&arcs);
                if !arcs.is_empty() && covered < arcs.len() {
                    inconsistencies.push(PostSolveInconsistency {
                        family: ConstraintFamily::FlowConservation,
                        vehicle: Some(k),
                        customer: None,
                        detail: format!(
                            "{} of {} arcs are not reachable from the depot (sub-tour)",
                            arcs.len() - covered,
                            arcs.len()
                        ),
                    });
                }
                Some(tour)
            } else {
                None
            };

            routes.push(VehicleRoute {
                vehicle: k,
                arcs,
                tour,
                customers,
                distance,
                load,
                modeled_load,
                capacity: instance.capacity(k),
                arrivals,
            });
        }

        for route in &routes {
            self.check_route(instance, formulation, route, values.values(), &mut inconsistencies);
        }

        for issue in &inconsistencies {
            log::warn!(
                "post-solve inconsistency ({} customers / {} vehicles): {}",
                instance.num_customers(),
                num_vehicles,
                issue
            );
        }

        let total_distance = routes.iter().map(|r| r.distance).fold(0.0, |acc, d| acc + d);
        let objective_value = outcome
            .objective_value
            .unwrap_or_else(|| formulation.model.evaluate_objective(values.values()));

        DecodeResult {
            status: outcome.status,
            solution: Some(RouteSolution { routes, objective_value, total_distance, inconsistencies }),
            failure: None,
        }
    }

    /// Re-validate capacity, time windows and sequencing of one route.
    fn check_route(
        &self,
        instance: &Instance,
        formulation: &Formulation,
        route: &VehicleRoute,
        values: &[f64],
        out: &mut Vec<PostSolveInconsistency>,
    ) {
        let k = route.vehicle;
        let tol = self.check_tolerance;

        if formulation.config.enable_capacity && route.load > route.capacity + tol {
            out.push(PostSolveInconsistency {
                family: ConstraintFamily::Capacity,
                vehicle: Some(k),
                customer: None,
                detail: format!(
                    "served demand {} exceeds capacity {} (modeled load {:.3})",
                    route.load, route.capacity, route.modeled_load
                ),
            });
        }

        if formulation.time_windows_active {
            for &(i, t) in &route.arrivals {
                if let Some(window) = instance.window(i) {
                    if !window.contains(t, tol) {
                        out.push(PostSolveInconsistency {
                            family: ConstraintFamily::TimeWindow,
                            vehicle: Some(k),
                            customer: Some(i),
                            detail: format!(
                                "arrival {:.2} outside [{}, {}]",
                                t,
                                window.start(),
                                window.end()
                            ),
                        });
                    }
                }
            }
        }

        let propagates = formulation.time_windows_active || formulation.index.includes_depot();
        // An arc at 1 - eps relaxes its big-M row by M * eps
        let slack = tol + formulation.big_m * self.rounding_tolerance;
        if propagates {
            for &(i, j) in &route.arcs {
                if i == 0 || j == 0 {
                    continue;
                }
                let Some(dist) = instance.distance(i, j) else { continue };
                let ai = values[formulation.index.arrival(i, k).0];
                let aj = values[formulation.index.arrival(j, k).0];
                if ai + dist > aj + slack {
                    out.push(PostSolveInconsistency {
                        family: ConstraintFamily::ArcTimePropagation,
                        vehicle: Some(k),
                        customer: Some(i),
                        detail: format!(
                            "arc ({}, {}): arrival {:.3} + distance {:.3} > arrival {:.3}",
                            i, j, ai, dist, aj
                        ),
                    });
                }
            }
        }
    }
}

/// Follow arcs from the depot until the route closes. Returns the node sequence
/// and how many arcs it used.
fn follow_tour(arcs: &[(usize, usize)]) -> (Vec<usize>, usize) {
    let mut tour = vec![0];
    let mut used = vec![false; arcs.len()];
    let mut current = 0;
    let mut covered = 0;
    while let Some(pos) = arcs.iter().enumerate().position(|(p, &(i, _))| !used[p] && i == current) {
        used[pos] = true;
        covered += 1;
        current = arcs[pos].1;
        tour.push(current);
        if current == 0 {
            break;
        }
    }
    (tour, covered)
}

impl std::fmt::Display for RouteSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Objective: {:.2}", self.objective_value)?;
        writeln!(f, "Total distance: {:.2}", self.total_distance)?;
        writeln!(f, "Total load: {}", self.total_load())?;
        for route in &self.routes {
            let names: Vec<String> = route.customers.iter().map(|c| format!("ID_{}", c)).collect();
            write!(
                f,
                "  Vehicle {} route: {:?} (distance {:.2}, load {}/{})",
                route.vehicle + 1,
                names,
                route.distance,
                route.load,
                route.capacity
            )?;
            if let Some(tour) = &route.tour {
                write!(f, " tour {:?}", tour)?;
            }
            writeln!(f)?;
        }
        if !self.inconsistencies.is_empty() {
            writeln!(f, "Post-solve inconsistencies:")?;
            for issue in &self.inconsistencies {
                writeln!(f, "  {}", issue)?;
            }
        }
        Ok(())
    }
}
