//! VRPTW MILP Library
//!
//! Formulates the Capacitated Vehicle Routing Problem with Time Windows (CVRPTW)
//! as a mixed-integer linear program, hands it to a MILP engine and decodes the
//! assignment into per-vehicle routes.
//!
//! # Features
//!
//! - Validated instance construction with seeded sampling of locations and demands
//! - One configurable formulator (time windows, depot return, capacity, vehicle use)
//! - Pure-Rust engine (`good_lp` + microlp) and Gurobi behind the `gurobi` feature
//! - Post-solve re-validation of every decoded route
//! - Run log, batch runs and SVG route plots
//!
//! # Example
//!
//! ```no_run
//! use vrptw_milp::exact::{MicroLpSolver, SolveOptions};
//! use vrptw_milp::formulation::FormulationConfig;
//! use vrptw_milp::instance::InstanceBuilder;
//! use vrptw_milp::pipeline;
//!
//! let builder = InstanceBuilder::new(4, 2, 5).seed(7);
//! let run = pipeline::run(
//!     builder,
//!     FormulationConfig::default(),
//!     &MicroLpSolver::new(),
//!     &SolveOptions::default(),
//! )
//! .unwrap();
//!
//! if let Some(solution) = &run.decoded.solution {
//!     println!("{}", solution);
//! }
//! ```

pub mod error;
pub mod instance;
pub mod model;
pub mod formulation;
pub mod exact;
pub mod solution;
pub mod pipeline;
pub mod record;
pub mod batch;
pub mod visualization;

pub use error::{ConstraintFamily, InputValidationError, PostSolveInconsistency, SolverFailure};
pub use instance::{Instance, InstanceBuilder};
pub use formulation::{Formulation, FormulationConfig, Formulator};
pub use pipeline::{RoutingContext, RoutingRun};
pub use solution::{DecodeResult, RouteSolution};
