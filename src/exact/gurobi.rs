//! Gurobi engine for the generic MILP model.
//!
//! Every model variable becomes a Gurobi variable with the same name and bounds,
//! every constraint keeps its name, so IIS files written on infeasibility can be
//! read against the formulation directly.

use super::{MilpSolver, SolveOptions, SolverOutcome, TerminationStatus};
use crate::model::{Assignment, Domain, MilpModel, Sense, Relation, Term};
use grb::prelude::*;

/// Gurobi solver configuration
#[derive(Debug, Clone)]
pub struct GurobiConfig {
    /// MIP gap tolerance
    pub mip_gap: f64,
    /// Number of threads (0 = automatic)
    pub threads: i32,
}

impl Default for GurobiConfig {
    fn default() -> Self {
        GurobiConfig {
            mip_gap: 1e-6,
            threads: 0,
        }
    }
}

/// Gurobi-backed [`MilpSolver`]
pub struct GurobiSolver {
    config: GurobiConfig,
}

fn to_expr(terms: &[Term], vars: &[Var]) -> Expr {
    terms.iter().map(|t| t.coef * vars[t.var.0]).grb_sum()
}

impl GurobiSolver {
    pub fn new(config: GurobiConfig) -> Self {
        GurobiSolver { config }
    }

    fn run(&self, model: &MilpModel, options: &SolveOptions) -> Result<SolverOutcome, String> {
        let env = Env::new("")
            .map_err(|e| format!("Failed to create Gurobi environment: {}", e))?;

        let mut grb_model = Model::with_env(&model.name, env)
            .map_err(|e| format!("Failed to create model: {}", e))?;

        if let Some(limit) = options.time_limit {
            grb_model.set_param(param::TimeLimit, limit)
                .map_err(|e| format!("Failed to set time limit: {}", e))?;
        }
        grb_model.set_param(param::MIPGap, self.config.mip_gap)
            .map_err(|e| format!("Failed to set MIP gap: {}", e))?;
        grb_model.set_param(param::Threads, self.config.threads)
            .map_err(|e| format!("Failed to set threads: {}", e))?;

        if !options.verbose {
            grb_model.set_param(param::OutputFlag, 0)
                .map_err(|e| format!("Failed to set output flag: {}", e))?;
        }

        let mut vars: Vec<Var> = Vec::with_capacity(model.variables.len());
        for def in &model.variables {
            let var = match def.domain {
                Domain::Binary => add_binvar!(grb_model, name: &def.name),
                Domain::Continuous { lower, upper } => {
                    let upper = upper.unwrap_or(grb::INFINITY);
                    add_ctsvar!(grb_model, name: &def.name, bounds: lower..upper)
                }
            }
            .map_err(|e| format!("Failed to add variable {}: {}", def.name, e))?;
            vars.push(var);
        }

        grb_model.update()
            .map_err(|e| format!("Failed to update model: {}", e))?;

        let sense = match model.objective.sense {
            Sense::Minimize => ModelSense::Minimize,
            Sense::Maximize => ModelSense::Maximize,
        };
        grb_model.set_objective(to_expr(&model.objective.terms, &vars), sense)
            .map_err(|e| format!("Failed to set objective: {}", e))?;

        for con in &model.constraints {
            let lhs = to_expr(&con.terms, &vars);
            let rhs = con.rhs;
            let added = match con.relation {
                Relation::Le => grb_model.add_constr(&con.name, c!(lhs <= rhs)),
                Relation::Ge => grb_model.add_constr(&con.name, c!(lhs >= rhs)),
                Relation::Eq => grb_model.add_constr(&con.name, c!(lhs == rhs)),
            };
            added.map_err(|e| format!("Failed to add constraint {}: {}", con.name, e))?;
        }

        grb_model.update()
            .map_err(|e| format!("Failed to update model before optimization: {}", e))?;

        grb_model.optimize()
            .map_err(|e| format!("Optimization failed: {}", e))?;

        let status = grb_model.status()
            .map_err(|e| format!("Failed to get status: {}", e))?;

        let outcome = match status {
            Status::Optimal => {
                let mut values = Vec::with_capacity(vars.len());
                for var in &vars {
                    values.push(grb_model.get_obj_attr(attr::X, var)
                        .map_err(|e| format!("Failed to read variable value: {}", e))?);
                }
                let obj_val = grb_model.get_attr(attr::ObjVal)
                    .map_err(|e| format!("Failed to read objective: {}", e))?;
                SolverOutcome::optimal(obj_val, Assignment::new(values))
            }
            Status::Infeasible => {
                if grb_model.compute_iis().is_ok() && grb_model.write("gurobi_iis.ilp").is_ok() {
                    log::warn!("Gurobi reported infeasible model; IIS written to gurobi_iis.ilp");
                }
                SolverOutcome::without_solution(TerminationStatus::Infeasible, "Infeasible".to_string())
            }
            Status::InfOrUnbd => SolverOutcome::without_solution(
                TerminationStatus::Infeasible,
                "InfeasibleOrUnbounded".to_string(),
            ),
            Status::Unbounded => {
                SolverOutcome::without_solution(TerminationStatus::Unbounded, "Unbounded".to_string())
            }
            Status::TimeLimit => {
                SolverOutcome::without_solution(TerminationStatus::TimedOut, "TimeLimit".to_string())
            }
            other => SolverOutcome::without_solution(TerminationStatus::Error, format!("{:?}", other)),
        };
        Ok(outcome)
    }
}

impl MilpSolver for GurobiSolver {
    fn name(&self) -> &str {
        "gurobi"
    }

    fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverOutcome {
        let start = std::time::Instant::now();
        let mut outcome = match self.run(model, options) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Gurobi solver failed: {}", e);
                SolverOutcome::without_solution(TerminationStatus::Error, e)
            }
        };
        outcome.solve_time = start.elapsed().as_secs_f64();
        outcome
    }
}
