//! Solver boundary.
//!
//! A [`MilpSolver`] takes an assembled [`MilpModel`] and returns a
//! [`SolverOutcome`]: termination status, objective value and the raw variable
//! assignment. Engines never interpret the assignment; that is the decoder's job.

mod microlp;
pub use microlp::MicroLpSolver;

// When built with the `gurobi` feature, expose the real implementation
#[cfg(feature = "gurobi")]
mod gurobi;
#[cfg(feature = "gurobi")]
pub use gurobi::*;

// Otherwise provide a lightweight stub so the rest of the codebase can compile
#[cfg(not(feature = "gurobi"))]
mod gurobi_stub {
	use super::{MilpSolver, SolveOptions, SolverOutcome, TerminationStatus};
	use crate::model::MilpModel;

	#[derive(Debug, Clone)]
	pub struct GurobiConfig {
		pub mip_gap: f64,
		pub threads: i32,
	}

	impl Default for GurobiConfig {
		fn default() -> Self {
			GurobiConfig { mip_gap: 1e-6, threads: 0 }
		}
	}

	pub struct GurobiSolver { pub config: GurobiConfig }

	impl GurobiSolver {
		pub fn new(config: GurobiConfig) -> Self { GurobiSolver { config } }
	}

	impl MilpSolver for GurobiSolver {
		fn name(&self) -> &str { "gurobi" }

		fn solve(&self, _model: &MilpModel, _options: &SolveOptions) -> SolverOutcome {
			SolverOutcome::without_solution(
				TerminationStatus::Error,
				"Gurobi feature not enabled in this build".to_string(),
			)
		}
	}
}

#[cfg(not(feature = "gurobi"))]
pub use gurobi_stub::*;

use crate::error::SolverFailure;
use crate::model::{Assignment, MilpModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine verdict on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimedOut,
    Error,
}

impl std::fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationStatus::Optimal => "Optimal",
            TerminationStatus::Infeasible => "Infeasible",
            TerminationStatus::Unbounded => "Unbounded",
            TerminationStatus::TimedOut => "TimedOut",
            TerminationStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Per-solve options forwarded to the engine.
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Wall-clock limit in seconds
    pub time_limit: Option<f64>,
    /// Let the engine print its own log
    pub verbose: bool,
}

/// What came back from the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub status: TerminationStatus,
    pub objective_value: Option<f64>,
    pub assignment: Assignment,
    /// Engine message when the solve did not succeed
    pub message: Option<String>,
    /// Wall-clock seconds spent in the engine
    pub solve_time: f64,
}

impl SolverOutcome {
    pub fn optimal(objective_value: f64, assignment: Assignment) -> Self {
        SolverOutcome {
            status: TerminationStatus::Optimal,
            objective_value: Some(objective_value),
            assignment,
            message: None,
            solve_time: 0.0,
        }
    }

    pub fn without_solution(status: TerminationStatus, message: String) -> Self {
        SolverOutcome {
            status,
            objective_value: None,
            assignment: Assignment::empty(),
            message: Some(message),
            solve_time: 0.0,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == TerminationStatus::Optimal
    }

    /// The failure behind a non-optimal status.
    pub fn failure(&self) -> Option<SolverFailure> {
        match self.status {
            TerminationStatus::Optimal => None,
            TerminationStatus::Infeasible => Some(SolverFailure::Infeasible),
            TerminationStatus::Unbounded => Some(SolverFailure::Unbounded),
            TerminationStatus::TimedOut => Some(SolverFailure::TimedOut),
            TerminationStatus::Error => Some(SolverFailure::Engine(
                self.message.clone().unwrap_or_else(|| "unknown engine error".to_string()),
            )),
        }
    }

    /// Wire form with the assignment keyed by variable name.
    pub fn to_response(&self, model: &MilpModel) -> SolverResponse {
        SolverResponse {
            status: self.status,
            objective_value: self.objective_value,
            assignment: self.assignment.named(model),
        }
    }
}

/// `{status, objectiveValue, assignment: name -> value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResponse {
    pub status: TerminationStatus,
    #[serde(rename = "objectiveValue")]
    pub objective_value: Option<f64>,
    pub assignment: BTreeMap<String, f64>,
}

/// A MILP engine behind the solver boundary.
pub trait MilpSolver: Send + Sync {
    fn name(&self) -> &str;

    /// Solve `model`. Failures are reported through the status, never by panicking.
    fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverOutcome;
}

/// Engines selectable at run time.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SolverKind {
    MicroLp,
    Gurobi,
}

pub fn create_solver(kind: SolverKind) -> Box<dyn MilpSolver> {
    match kind {
        SolverKind::MicroLp => Box::new(MicroLpSolver::new()),
        SolverKind::Gurobi => Box::new(GurobiSolver::new(GurobiConfig::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        let infeasible = SolverOutcome::without_solution(TerminationStatus::Infeasible, "no".into());
        assert_eq!(infeasible.failure(), Some(SolverFailure::Infeasible));
        assert!(infeasible.assignment.is_empty());

        let error = SolverOutcome::without_solution(TerminationStatus::Error, "boom".into());
        assert_eq!(error.failure(), Some(SolverFailure::Engine("boom".into())));

        let ok = SolverOutcome::optimal(1.0, Assignment::new(vec![1.0]));
        assert!(ok.is_optimal());
        assert_eq!(ok.failure(), None);
    }

    #[test]
    fn test_response_wire_format() {
        use crate::formulation::Formulator;
        use crate::instance::InstanceBuilder;

        let instance = InstanceBuilder::new(2, 1, 3).build().unwrap();
        let f = Formulator::default().formulate(&instance);
        let mut values = vec![0.0; f.model.num_variables()];
        values[f.index.x(1, 2, 0).unwrap().0] = 1.0;
        let outcome = SolverOutcome::optimal(4.5, Assignment::new(values));

        let json = serde_json::to_value(outcome.to_response(&f.model)).unwrap();
        assert_eq!(json["status"], "Optimal");
        assert_eq!(json["objectiveValue"], 4.5);
        assert_eq!(json["assignment"]["x_1_2_0"], 1.0);
        assert_eq!(json["assignment"]["x_2_1_0"], 0.0);
        assert_eq!(json["assignment"].as_object().unwrap().len(), f.model.num_variables());

        let failed = SolverOutcome::without_solution(TerminationStatus::TimedOut, "late".into());
        let json = serde_json::to_value(failed.to_response(&f.model)).unwrap();
        assert_eq!(json["status"], "TimedOut");
        assert!(json["objectiveValue"].is_null());
        assert!(json["assignment"].as_object().unwrap().is_empty());
    }

    #[cfg(not(feature = "gurobi"))]
    #[test]
    fn test_gurobi_stub_reports_error() {
        let solver = create_solver(SolverKind::Gurobi);
        let model = MilpModel::new("empty", crate::model::Sense::Minimize);
        let outcome = solver.solve(&model, &SolveOptions::default());
        assert_eq!(outcome.status, TerminationStatus::Error);
        assert!(outcome.message.unwrap().contains("not enabled"));
    }
}
