//! MILP formulation of the CVRPTW.
//!
//! Variables:
//! - `x[i][j][k]` binary, vehicle `k` travels directly from node `i` to node `j`
//! - `load[i][k]` continuous, goods weight of customer `i` carried by `k`
//! - `arrival[i][k]` continuous, arrival time (minutes) of `k` at customer `i`
//!
//! The default configuration is the plain time-windowed model, where
//! arcs only connect customers and the depot flow constraint collapses into a single
//! aggregate equality. `enable_depot_return` switches to an explicit depot node 0
//! with one departure per vehicle and per-vehicle flow conservation.

use crate::error::ConstraintFamily;
use crate::instance::Instance;
use crate::model::{Domain, MilpModel, Relation, Sense, Term, VarId};
use serde::{Deserialize, Serialize};

/// Feature flags of the formulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulationConfig {
    /// Emit `TimeWindow` bounds on every arrival variable
    pub enable_time_windows: bool,
    /// Model the depot as node 0 with per-vehicle departure and flow conservation
    pub enable_depot_return: bool,
    /// Emit the per-vehicle `Capacity` constraint
    pub enable_capacity: bool,
    /// Every vehicle must use at least one arc
    pub require_vehicle_use: bool,
    /// Tie `load[i][k]` to the arcs leaving `i` with vehicle `k`
    pub link_load_to_visits: bool,
    /// Big-M override; raised to the validity bound if smaller
    pub big_m: Option<f64>,
}

impl Default for FormulationConfig {
    fn default() -> Self {
        FormulationConfig {
            enable_time_windows: true,
            enable_depot_return: false,
            enable_capacity: true,
            require_vehicle_use: false,
            link_load_to_visits: false,
            big_m: None,
        }
    }
}

/// Dense lookup from `(i, j, k)` / `(i, k)` to model variables.
///
/// Node indices follow the instance: 0 is the depot, customers are `1..=N`.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    num_nodes: usize,
    num_vehicles: usize,
    includes_depot: bool,
    arcs: Vec<Option<VarId>>,
    load: Vec<VarId>,
    arrival: Vec<VarId>,
}

impl VariableIndex {
    #[inline]
    fn arc_slot(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.num_nodes + j) * self.num_vehicles + k
    }

    #[inline]
    fn customer_slot(&self, i: usize, k: usize) -> usize {
        (i - 1) * self.num_vehicles + k
    }

    /// `x[i][j][k]`, or `None` when the arc is not part of the model.
    #[inline]
    pub fn x(&self, i: usize, j: usize, k: usize) -> Option<VarId> {
        if i >= self.num_nodes || j >= self.num_nodes || k >= self.num_vehicles {
            return None;
        }
        self.arcs[self.arc_slot(i, j, k)]
    }

    /// `load[i][k]` for customer `i >= 1`.
    #[inline]
    pub fn load(&self, i: usize, k: usize) -> VarId {
        self.load[self.customer_slot(i, k)]
    }

    /// `arrival[i][k]` for customer `i >= 1`.
    #[inline]
    pub fn arrival(&self, i: usize, k: usize) -> VarId {
        self.arrival[self.customer_slot(i, k)]
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn num_customers(&self) -> usize {
        self.num_nodes - 1
    }

    /// Whether arcs touch the depot node.
    pub fn includes_depot(&self) -> bool {
        self.includes_depot
    }

    /// Nodes arcs are defined over.
    pub fn nodes(&self) -> std::ops::Range<usize> {
        let first = if self.includes_depot { 0 } else { 1 };
        first..self.num_nodes
    }

    /// Every arc variable as `(i, j, k, var)`.
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize, usize, VarId)> + '_ {
        let n = self.num_nodes;
        let kk = self.num_vehicles;
        self.arcs.iter().enumerate().filter_map(move |(slot, var)| {
            var.map(|v| {
                let k = slot % kk;
                let ij = slot / kk;
                (ij / n, ij % n, k, v)
            })
        })
    }
}

/// Result of formulating one instance.
#[derive(Debug, Clone)]
pub struct Formulation {
    pub model: MilpModel,
    pub index: VariableIndex,
    pub config: FormulationConfig,
    /// Big-M actually used by `ArcTimePropagation`
    pub big_m: f64,
    /// Upper bound on any arrival time
    pub horizon: f64,
    /// Whether `TimeWindow` constraints were emitted
    pub time_windows_active: bool,
}

/// Turns instances into MILP models.
#[derive(Debug, Clone, Default)]
pub struct Formulator {
    pub config: FormulationConfig,
}

impl Formulator {
    pub fn new(config: FormulationConfig) -> Self {
        Formulator { config }
    }

    pub fn formulate(&self, instance: &Instance) -> Formulation {
        let cfg = &self.config;
        let n = instance.num_customers();
        let num_vehicles = instance.num_vehicles();
        let num_nodes = instance.num_nodes();
        let first_node = if cfg.enable_depot_return { 0 } else { 1 };
        let nodes = first_node..num_nodes;

        let time_windows_active = cfg.enable_time_windows && instance.is_time_windowed();
        if cfg.enable_time_windows && !time_windows_active {
            log::warn!(
                "time windows requested but the instance ({} customers) carries none; skipping {}",
                n,
                ConstraintFamily::TimeWindow
            );
        }
        let propagate = time_windows_active || cfg.enable_depot_return;

        let max_distance = nodes
            .clone()
            .map(|i| instance.distances().max_from(i, nodes.clone()))
            .fold(0.0, f64::max);
        let horizon = if time_windows_active {
            instance
                .customers
                .iter()
                .filter_map(|c| c.window.map(|w| w.end() as f64))
                .fold(0.0, f64::max)
        } else {
            nodes
                .clone()
                .map(|i| instance.distances().max_from(i, nodes.clone()))
                .sum()
        };
        let required_m = horizon + max_distance;
        let big_m = match cfg.big_m {
            Some(m) if m >= required_m => m,
            Some(m) => {
                log::warn!(
                    "big-M {} is below the validity bound {:.3} (horizon {:.3} + max distance {:.3}); using the bound",
                    m,
                    required_m,
                    horizon,
                    max_distance
                );
                required_m
            }
            None => required_m,
        };

        let mut model = MilpModel::new("CVRPTW", Sense::Minimize);

        let mut arcs = vec![None; num_nodes * num_nodes * num_vehicles];
        for i in nodes.clone() {
            for j in nodes.clone() {
                let Some(dist) = instance.distance(i, j) else { continue };
                for k in 0..num_vehicles {
                    let var = model.add_variable(format!("x_{}_{}_{}", i, j, k), Domain::Binary);
                    model.add_objective_term(var, dist);
                    arcs[(i * num_nodes + j) * num_vehicles + k] = Some(var);
                }
            }
        }

        let mut load = Vec::with_capacity(n * num_vehicles);
        let mut arrival = Vec::with_capacity(n * num_vehicles);
        let arrival_domain = if propagate && !time_windows_active {
            Domain::bounded(horizon)
        } else {
            Domain::non_negative()
        };
        for i in instance.customer_ids() {
            for k in 0..num_vehicles {
                let var = model.add_variable(format!("load_{}_{}", i, k), Domain::non_negative());
                model.add_objective_term(var, instance.demand(i) as f64);
                load.push(var);
            }
        }
        for i in instance.customer_ids() {
            for k in 0..num_vehicles {
                arrival.push(model.add_variable(format!("arrival_{}_{}", i, k), arrival_domain));
            }
        }

        let index = VariableIndex {
            num_nodes,
            num_vehicles,
            includes_depot: cfg.enable_depot_return,
            arcs,
            load,
            arrival,
        };

        let outgoing = |i: usize, k: usize| -> Vec<Term> {
            nodes
                .clone()
                .filter_map(|j| index.x(i, j, k))
                .map(|v| Term::new(v, 1.0))
                .collect()
        };

        // Each customer is the origin of exactly one chosen arc
        for i in instance.customer_ids() {
            let terms: Vec<Term> = (0..num_vehicles).flat_map(|k| outgoing(i, k)).collect();
            model.add_constraint(format!("visit_{}", i), ConstraintFamily::VisitOnce, terms, Relation::Eq, 1.0);
        }

        if cfg.enable_depot_return {
            for k in 0..num_vehicles {
                model.add_constraint(
                    format!("depot_flow_{}", k),
                    ConstraintFamily::DepotFlow,
                    outgoing(0, k),
                    Relation::Eq,
                    1.0,
                );
            }
            for h in nodes.clone() {
                for k in 0..num_vehicles {
                    let mut terms: Vec<Term> = nodes
                        .clone()
                        .filter_map(|i| index.x(i, h, k))
                        .map(|v| Term::new(v, 1.0))
                        .collect();
                    terms.extend(outgoing(h, k).into_iter().map(|t| Term::new(t.var, -1.0)));
                    model.add_constraint(
                        format!("flow_{}_{}", h, k),
                        ConstraintFamily::FlowConservation,
                        terms,
                        Relation::Eq,
                        0.0,
                    );
                }
            }
        } else {
            // Without a depot node the per-vehicle departure collapses onto the last
            // customer's outgoing arcs summed over every vehicle.
            let terms: Vec<Term> = (0..num_vehicles).flat_map(|k| outgoing(n, k)).collect();
            model.add_constraint("depot_flow".to_string(), ConstraintFamily::DepotFlow, terms, Relation::Eq, 1.0);
        }

        if cfg.enable_capacity {
            for k in 0..num_vehicles {
                let terms = instance
                    .customer_ids()
                    .map(|i| Term::new(index.load(i, k), instance.demand(i) as f64))
                    .collect();
                model.add_constraint(
                    format!("capacity_{}", k),
                    ConstraintFamily::Capacity,
                    terms,
                    Relation::Le,
                    instance.capacity(k),
                );
            }
        }

        if cfg.link_load_to_visits {
            for i in instance.customer_ids() {
                for k in 0..num_vehicles {
                    let mut terms = vec![Term::new(index.load(i, k), 1.0)];
                    terms.extend(outgoing(i, k).into_iter().map(|t| Term::new(t.var, -1.0)));
                    model.add_constraint(
                        format!("load_link_{}_{}", i, k),
                        ConstraintFamily::LoadLink,
                        terms,
                        Relation::Eq,
                        0.0,
                    );
                }
            }
        }

        if cfg.require_vehicle_use {
            for k in 0..num_vehicles {
                let terms: Vec<Term> = nodes.clone().flat_map(|i| outgoing(i, k)).collect();
                model.add_constraint(
                    format!("vehicle_use_{}", k),
                    ConstraintFamily::VehicleUse,
                    terms,
                    Relation::Ge,
                    1.0,
                );
            }
        }

        if time_windows_active {
            for i in instance.customer_ids() {
                let Some(window) = instance.window(i) else { continue };
                for k in 0..num_vehicles {
                    let a = index.arrival(i, k);
                    model.add_constraint(
                        format!("tw_start_{}_{}", i, k),
                        ConstraintFamily::TimeWindow,
                        vec![Term::new(a, 1.0)],
                        Relation::Ge,
                        window.start() as f64,
                    );
                    model.add_constraint(
                        format!("tw_end_{}_{}", i, k),
                        ConstraintFamily::TimeWindow,
                        vec![Term::new(a, 1.0)],
                        Relation::Le,
                        window.end() as f64,
                    );
                }
            }
        }

        if propagate {
            // arrival[i] + d(i,j) <= arrival[j] + M (1 - x[i][j])
            for i in instance.customer_ids() {
                for j in instance.customer_ids() {
                    let Some(dist) = instance.distance(i, j) else { continue };
                    for k in 0..num_vehicles {
                        let Some(x) = index.x(i, j, k) else { continue };
                        model.add_constraint(
                            format!("time_{}_{}_{}", i, j, k),
                            ConstraintFamily::ArcTimePropagation,
                            vec![
                                Term::new(index.arrival(i, k), 1.0),
                                Term::new(index.arrival(j, k), -1.0),
                                Term::new(x, big_m),
                            ],
                            Relation::Le,
                            big_m - dist,
                        );
                    }
                }
            }
            if cfg.enable_depot_return {
                // Vehicles leave the depot at time 0
                for j in instance.customer_ids() {
                    let Some(dist) = instance.distance(0, j) else { continue };
                    for k in 0..num_vehicles {
                        let Some(x) = index.x(0, j, k) else { continue };
                        model.add_constraint(
                            format!("time_0_{}_{}", j, k),
                            ConstraintFamily::ArcTimePropagation,
                            vec![Term::new(index.arrival(j, k), -1.0), Term::new(x, big_m)],
                            Relation::Le,
                            big_m - dist,
                        );
                    }
                }
            }
        }

        log::info!(
            "formulated model for {} customers / {} vehicles: {} variables ({} binary), {} constraints, M = {:.3}",
            n,
            num_vehicles,
            model.num_variables(),
            model.num_binaries(),
            model.constraints.len(),
            big_m
        );
        for (family, count) in model.family_counts() {
            log::debug!("  {}: {}", family, count);
        }

        Formulation {
            model,
            index,
            config: cfg.clone(),
            big_m,
            horizon,
            time_windows_active,
        }
    }
}
