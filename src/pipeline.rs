//! One formulate → solve → decode run.
//!
//! A [`RoutingContext`] is created per call and owns the instance and its model,
//! so independent runs never share state and can execute concurrently.

use crate::error::{InputValidationError, PostSolveInconsistency, SolverFailure};
use crate::exact::{MilpSolver, SolveOptions, SolverOutcome, SolverResponse, TerminationStatus};
use crate::formulation::{Formulation, FormulationConfig, Formulator};
use crate::instance::{Instance, InstanceBuilder};
use crate::solution::{DecodeResult, Decoder, VehicleRoute};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instance plus the model built from it.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub instance: Instance,
    pub formulation: Formulation,
}

impl RoutingContext {
    pub fn new(instance: Instance, config: FormulationConfig) -> Self {
        let formulation = Formulator::new(config).formulate(&instance);
        RoutingContext { instance, formulation }
    }

    /// Hand the model to `solver` and decode whatever comes back.
    pub fn solve(self, solver: &dyn MilpSolver, options: &SolveOptions) -> RoutingRun {
        log::info!(
            "solving {} customers / {} vehicles with {} ({} variables, {} constraints)",
            self.instance.num_customers(),
            self.instance.num_vehicles(),
            solver.name(),
            self.formulation.model.num_variables(),
            self.formulation.model.constraints.len()
        );
        let outcome = solver.solve(&self.formulation.model, options);
        log::info!("{} finished: {} in {:.3}s", solver.name(), outcome.status, outcome.solve_time);

        let decoded = Decoder::new().decode(&self.instance, &self.formulation, &outcome);
        RoutingRun { context: self, solver: solver.name().to_string(), outcome, decoded }
    }
}

/// Everything produced by one run.
#[derive(Debug, Clone)]
pub struct RoutingRun {
    pub context: RoutingContext,
    pub solver: String,
    pub outcome: SolverOutcome,
    pub decoded: DecodeResult,
}

impl RoutingRun {
    pub fn instance(&self) -> &Instance {
        &self.context.instance
    }

    pub fn status(&self) -> TerminationStatus {
        self.outcome.status
    }

    pub fn is_optimal(&self) -> bool {
        self.decoded.is_solved()
    }

    pub fn routes(&self) -> &[VehicleRoute] {
        self.decoded.routes()
    }

    /// The raw engine answer with variables keyed by name.
    pub fn response(&self) -> SolverResponse {
        self.outcome.to_response(&self.context.formulation.model)
    }

    pub fn summary(&self) -> RunSummary {
        let instance = &self.context.instance;
        let solution = self.decoded.solution.as_ref();
        RunSummary {
            num_customers: instance.num_customers(),
            num_vehicles: instance.num_vehicles(),
            num_goods: instance.num_goods,
            seed: instance.seed,
            solver: self.solver.clone(),
            status: self.outcome.status,
            objective_value: self.outcome.objective_value,
            total_distance: solution.map(|s| s.total_distance),
            solve_time: self.outcome.solve_time,
            big_m: self.context.formulation.big_m,
            constraint_counts: self
                .context
                .formulation
                .model
                .family_counts()
                .into_iter()
                .map(|(family, count)| (family.to_string(), count))
                .collect(),
            routes: self.decoded.routes().to_vec(),
            failure: self.decoded.failure.clone(),
            inconsistencies: self.decoded.inconsistencies().to_vec(),
        }
    }
}

/// Serializable report of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_customers: usize,
    pub num_vehicles: usize,
    pub num_goods: usize,
    pub seed: u64,
    pub solver: String,
    pub status: TerminationStatus,
    pub objective_value: Option<f64>,
    pub total_distance: Option<f64>,
    pub solve_time: f64,
    pub big_m: f64,
    pub constraint_counts: BTreeMap<String, usize>,
    pub routes: Vec<VehicleRoute>,
    pub failure: Option<SolverFailure>,
    pub inconsistencies: Vec<PostSolveInconsistency>,
}

/// Validate, formulate, solve and decode.
///
/// Validation errors abort the run before any model is built or any solver is
/// called. Solver failures are not errors: they come back inside the run.
pub fn run(
    builder: InstanceBuilder,
    config: FormulationConfig,
    solver: &dyn MilpSolver,
    options: &SolveOptions,
) -> Result<RoutingRun, InputValidationError> {
    let (customers, vehicles, goods) = (builder.num_customers(), builder.num_vehicles(), builder.num_goods());
    let instance = builder.build().map_err(|e| {
        log::error!(
            "rejected instance ({} customers / {} vehicles / {} goods): {}",
            customers,
            vehicles,
            goods,
            e
        );
        e
    })?;
    Ok(RoutingContext::new(instance, config).solve(solver, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::SolverOutcome;
    use crate::model::MilpModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        status: TerminationStatus,
        calls: AtomicUsize,
    }

    impl MilpSolver for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(&self, _model: &MilpModel, _options: &SolveOptions) -> SolverOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            SolverOutcome::without_solution(self.status, "scripted".to_string())
        }
    }

    #[test]
    fn test_validation_happens_before_solver() {
        let solver = Scripted { status: TerminationStatus::Error, calls: AtomicUsize::new(0) };
        let err = run(
            InstanceBuilder::new(3, 0, 5),
            FormulationConfig::default(),
            &solver,
            &SolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InputValidationError::NonPositiveCount { value: 0, .. }));
        assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timeout_is_reported_not_raised() {
        let solver = Scripted { status: TerminationStatus::TimedOut, calls: AtomicUsize::new(0) };
        let run = run(
            InstanceBuilder::new(3, 2, 5).without_time_windows(),
            FormulationConfig::default(),
            &solver,
            &SolveOptions { time_limit: Some(1.0), verbose: false },
        )
        .unwrap();
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        assert!(!run.is_optimal());
        assert!(run.routes().is_empty());

        let summary = run.summary();
        assert_eq!(summary.status, TerminationStatus::TimedOut);
        assert_eq!(summary.failure, Some(SolverFailure::TimedOut));
        assert_eq!(summary.constraint_counts.get("visit_once"), Some(&3));
        assert!(summary.total_distance.is_none());
    }
}
