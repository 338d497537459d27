//! Pure-Rust engine backed by `good_lp` and its `microlp` branch-and-bound solver.
//!
//! microlp has no native time limit, so a limited solve runs on a worker thread and
//! the adapter stops waiting once the deadline passes. The worker cannot be
//! interrupted and finishes in the background.

use super::{MilpSolver, SolveOptions, SolverOutcome, TerminationStatus};
use crate::model::{Domain, MilpModel, Relation, Sense, Term};
use crate::model::Assignment;
use good_lp::{constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Default engine: no native dependencies.
#[derive(Debug, Clone, Default)]
pub struct MicroLpSolver;

impl MicroLpSolver {
    pub fn new() -> Self {
        MicroLpSolver
    }
}

fn to_expression(terms: &[Term], handles: &[Variable]) -> Expression {
    let mut expr = Expression::from(0.0);
    for t in terms {
        expr += t.coef * handles[t.var.0];
    }
    expr
}

/// Run the engine to completion on the calling thread.
fn solve_blocking(model: &MilpModel) -> SolverOutcome {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = model
        .variables
        .iter()
        .map(|def| {
            let definition = match def.domain {
                Domain::Binary => variable().binary(),
                Domain::Continuous { lower, upper } => {
                    let d = variable().min(lower);
                    match upper {
                        Some(u) => d.max(u),
                        None => d,
                    }
                }
            };
            vars.add(definition.name(def.name.clone()))
        })
        .collect();

    let objective = to_expression(&model.objective.terms, &handles);
    let unsolved = match model.objective.sense {
        Sense::Minimize => vars.minimise(objective),
        Sense::Maximize => vars.maximise(objective),
    };
    let mut problem = unsolved.using(microlp);

    for c in &model.constraints {
        let lhs = to_expression(&c.terms, &handles);
        let built = match c.relation {
            Relation::Le => constraint::leq(lhs, c.rhs),
            Relation::Ge => constraint::geq(lhs, c.rhs),
            Relation::Eq => constraint::eq(lhs, c.rhs),
        };
        problem.add_constraint(built);
    }

    match problem.solve() {
        Ok(solution) => {
            let values: Vec<f64> = handles.iter().map(|&v| solution.value(v)).collect();
            let objective = model.evaluate_objective(&values);
            SolverOutcome::optimal(objective, Assignment::new(values))
        }
        Err(ResolutionError::Infeasible) => {
            SolverOutcome::without_solution(TerminationStatus::Infeasible, "microlp: infeasible".to_string())
        }
        Err(ResolutionError::Unbounded) => {
            SolverOutcome::without_solution(TerminationStatus::Unbounded, "microlp: unbounded".to_string())
        }
        Err(e) => SolverOutcome::without_solution(TerminationStatus::Error, format!("microlp: {}", e)),
    }
}

impl MilpSolver for MicroLpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, model: &MilpModel, options: &SolveOptions) -> SolverOutcome {
        let start = Instant::now();
        if options.verbose {
            log::info!(
                "microlp: solving '{}' with {} variables ({} binary) and {} constraints",
                model.name,
                model.num_variables(),
                model.num_binaries(),
                model.constraints.len()
            );
        }

        // A limit that is not finite or does not fit in a Duration is no limit at all
        let deadline = options
            .time_limit
            .filter(|limit| limit.is_finite())
            .and_then(|limit| Duration::try_from_secs_f64(limit.max(0.0)).ok().map(|d| (limit, d)));

        let mut outcome = match deadline {
            None => solve_blocking(model),
            Some((limit, wait)) => {
                let (tx, rx) = mpsc::channel();
                let owned = model.clone();
                let spawned = std::thread::Builder::new()
                    .name("microlp-solve".to_string())
                    .spawn(move || {
                        // The receiver is gone if the deadline already passed
                        let _ = tx.send(solve_blocking(&owned));
                    });
                match spawned {
                    Err(e) => SolverOutcome::without_solution(
                        TerminationStatus::Error,
                        format!("microlp: cannot spawn solver thread: {}", e),
                    ),
                    Ok(_) => match rx.recv_timeout(wait) {
                        Ok(outcome) => outcome,
                        Err(mpsc::RecvTimeoutError::Timeout) => SolverOutcome::without_solution(
                            TerminationStatus::TimedOut,
                            format!("microlp: no result within {:.1}s", limit),
                        ),
                        Err(mpsc::RecvTimeoutError::Disconnected) => SolverOutcome::without_solution(
                            TerminationStatus::Error,
                            "microlp: solver thread terminated without a result".to_string(),
                        ),
                    },
                }
            }
        };
        outcome.solve_time = start.elapsed().as_secs_f64();

        if options.verbose {
            log::info!("microlp: {} in {:.3}s", outcome.status, outcome.solve_time);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintFamily;
    use crate::model::{Domain, Relation, Sense, Term};

    #[test]
    fn test_small_knapsack() {
        // max 3a + 2b + 4c  s.t.  a + b + c <= 2, binaries
        let mut model = MilpModel::new("knapsack", Sense::Maximize);
        let a = model.add_variable("a".into(), Domain::Binary);
        let b = model.add_variable("b".into(), Domain::Binary);
        let c = model.add_variable("c".into(), Domain::Binary);
        model.add_objective_term(a, 3.0);
        model.add_objective_term(b, 2.0);
        model.add_objective_term(c, 4.0);
        model.add_constraint(
            "pick_two".into(),
            ConstraintFamily::Capacity,
            vec![Term::new(a, 1.0), Term::new(b, 1.0), Term::new(c, 1.0)],
            Relation::Le,
            2.0,
        );

        let outcome = MicroLpSolver::new().solve(&model, &SolveOptions::default());
        assert_eq!(outcome.status, TerminationStatus::Optimal);
        assert!((outcome.objective_value.unwrap() - 7.0).abs() < 1e-6);
        assert!((outcome.assignment.value(b)).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_model() {
        let mut model = MilpModel::new("bad", Sense::Minimize);
        let x = model.add_variable("x".into(), Domain::bounded(1.0));
        model.add_constraint("low".into(), ConstraintFamily::TimeWindow, vec![Term::new(x, 1.0)], Relation::Ge, 2.0);

        let options = SolveOptions { time_limit: Some(30.0), verbose: false };
        let outcome = MicroLpSolver::new().solve(&model, &options);
        assert_eq!(outcome.status, TerminationStatus::Infeasible);
        assert!(outcome.assignment.is_empty());
    }

    #[test]
    fn test_unrepresentable_time_limit_means_no_limit() {
        let mut model = MilpModel::new("one", Sense::Minimize);
        let x = model.add_variable("x".into(), Domain::Binary);
        model.add_objective_term(x, 1.0);
        model.add_constraint("pick".into(), ConstraintFamily::VisitOnce, vec![Term::new(x, 1.0)], Relation::Eq, 1.0);

        for limit in [f64::INFINITY, 1e30, f64::NAN] {
            let options = SolveOptions { time_limit: Some(limit), verbose: false };
            let outcome = MicroLpSolver::new().solve(&model, &options);
            assert_eq!(outcome.status, TerminationStatus::Optimal, "limit {}", limit);
            assert!((outcome.assignment.value(x) - 1.0).abs() < 1e-6);
        }
    }
}
