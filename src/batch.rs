//! Batch runs over many seeded instances.
//!
//! Every seed gets its own [`RoutingContext`](crate::pipeline::RoutingContext),
//! so runs are independent and are spread over the rayon pool.

use crate::error::InputValidationError;
use crate::exact::{MilpSolver, SolveOptions, TerminationStatus};
use crate::formulation::FormulationConfig;
use crate::instance::InstanceBuilder;
use crate::pipeline::RoutingContext;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;

/// Batch configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of instances to solve
    pub runs: usize,
    /// Seed of the first instance; run `r` uses `first_seed + r`
    pub first_seed: u64,
    /// Show a progress bar on stderr
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            runs: 10,
            first_seed: 42,
            show_progress: true,
        }
    }
}

/// Result of one seeded run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunResult {
    pub seed: u64,
    pub num_customers: usize,
    pub num_vehicles: usize,
    pub status: TerminationStatus,
    pub objective_value: Option<f64>,
    pub total_distance: Option<f64>,
    /// Vehicles with at least one selected arc
    pub vehicles_used: usize,
    pub inconsistencies: usize,
    pub solve_time: f64,
}

/// Aggregated figures over a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub runs: usize,
    pub optimal: usize,
    pub infeasible: usize,
    pub timed_out: usize,
    pub other: usize,
    pub with_inconsistencies: usize,
    pub avg_objective: Option<f64>,
    pub std_objective: Option<f64>,
    pub best_objective: Option<f64>,
    pub worst_objective: Option<f64>,
    pub avg_time: f64,
    pub total_time: f64,
}

pub struct BatchRunner {
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        BatchRunner { config }
    }

    /// Solve `config.runs` instances that differ only by seed.
    ///
    /// The template is validated once up front; an invalid template aborts the
    /// batch before any solver call.
    pub fn run(
        &self,
        template: &InstanceBuilder,
        formulation: &FormulationConfig,
        solver: &dyn MilpSolver,
        options: &SolveOptions,
    ) -> Result<Vec<BatchRunResult>, InputValidationError> {
        template.clone().build()?;

        let pb = if self.config.show_progress {
            let pb = ProgressBar::new(self.config.runs as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}") {
                pb.set_style(style);
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        log::info!(
            "batch of {} runs: {} customers / {} vehicles with {}",
            self.config.runs,
            template.num_customers(),
            template.num_vehicles(),
            solver.name()
        );

        let seeds: Vec<u64> = (0..self.config.runs as u64).map(|r| self.config.first_seed + r).collect();
        let results: Result<Vec<BatchRunResult>, InputValidationError> = seeds
            .par_iter()
            .map(|&seed| -> Result<BatchRunResult, InputValidationError> {
                let instance = template.clone().seed(seed).build()?;
                let run = RoutingContext::new(instance, formulation.clone()).solve(solver, options);
                let solution = run.decoded.solution.as_ref();
                let result = BatchRunResult {
                    seed,
                    num_customers: run.instance().num_customers(),
                    num_vehicles: run.instance().num_vehicles(),
                    status: run.status(),
                    objective_value: run.outcome.objective_value,
                    total_distance: solution.map(|s| s.total_distance),
                    vehicles_used: run.routes().iter().filter(|r| !r.is_empty()).count(),
                    inconsistencies: run.decoded.inconsistencies().len(),
                    solve_time: run.outcome.solve_time,
                };
                pb.inc(1);
                Ok(result)
            })
            .collect();

        pb.finish_with_message("done");
        let mut results = results?;
        results.sort_by_key(|r| r.seed);
        Ok(results)
    }
}

/// Summarize a batch.
pub fn compute_statistics(results: &[BatchRunResult]) -> BatchStatistics {
    let count = |status: TerminationStatus| results.iter().filter(|r| r.status == status).count();
    let objectives: Vec<f64> = results
        .iter()
        .filter(|r| r.status == TerminationStatus::Optimal)
        .filter_map(|r| r.objective_value)
        .collect();
    let times: Vec<f64> = results.iter().map(|r| r.solve_time).collect();

    let (avg_objective, std_objective, best_objective, worst_objective) = if objectives.is_empty() {
        (None, None, None, None)
    } else {
        let std = if objectives.len() > 1 { Some(objectives.iter().std_dev()) } else { Some(0.0) };
        (
            Some(objectives.iter().mean()),
            std,
            Some(objectives.iter().cloned().fold(f64::INFINITY, f64::min)),
            Some(objectives.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        )
    };

    let optimal = count(TerminationStatus::Optimal);
    let infeasible = count(TerminationStatus::Infeasible);
    let timed_out = count(TerminationStatus::TimedOut);

    BatchStatistics {
        runs: results.len(),
        optimal,
        infeasible,
        timed_out,
        other: results.len() - optimal - infeasible - timed_out,
        with_inconsistencies: results.iter().filter(|r| r.inconsistencies > 0).count(),
        avg_objective,
        std_objective,
        best_objective,
        worst_objective,
        avg_time: if times.is_empty() { 0.0 } else { times.iter().mean() },
        total_time: times.iter().sum(),
    }
}

/// Export per-run results to CSV
pub fn export_to_csv<P: AsRef<Path>>(results: &[BatchRunResult], path: P) -> crate::error::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    Ok(())
}

/// Generate summary report
pub fn generate_report(stats: &BatchStatistics) -> String {
    let fmt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string());
    let mut report = String::new();
    report.push_str("========================================\n");
    report.push_str("          CVRPTW Batch Report\n");
    report.push_str("========================================\n\n");
    report.push_str(&format!("Runs:          {}\n", stats.runs));
    report.push_str(&format!("Optimal:       {}\n", stats.optimal));
    report.push_str(&format!("Infeasible:    {}\n", stats.infeasible));
    report.push_str(&format!("Timed out:     {}\n", stats.timed_out));
    report.push_str(&format!("Other:         {}\n", stats.other));
    report.push_str(&format!("Inconsistent:  {}\n", stats.with_inconsistencies));
    report.push_str("-".repeat(40).as_str());
    report.push('\n');
    report.push_str(&format!("Objective avg: {} (std {})\n", fmt(stats.avg_objective), fmt(stats.std_objective)));
    report.push_str(&format!("Objective best/worst: {} / {}\n", fmt(stats.best_objective), fmt(stats.worst_objective)));
    report.push_str(&format!("Time avg/total: {:.4}s / {:.4}s\n", stats.avg_time, stats.total_time));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::SolverOutcome;
    use crate::model::MilpModel;

    struct AlwaysInfeasible;

    impl MilpSolver for AlwaysInfeasible {
        fn name(&self) -> &str {
            "infeasible"
        }

        fn solve(&self, _model: &MilpModel, _options: &SolveOptions) -> SolverOutcome {
            SolverOutcome::without_solution(TerminationStatus::Infeasible, "scripted".to_string())
        }
    }

    fn result(seed: u64, status: TerminationStatus, objective: Option<f64>, time: f64) -> BatchRunResult {
        BatchRunResult {
            seed,
            num_customers: 3,
            num_vehicles: 2,
            status,
            objective_value: objective,
            total_distance: objective,
            vehicles_used: 2,
            inconsistencies: 0,
            solve_time: time,
        }
    }

    #[test]
    fn test_statistics() {
        let results = vec![
            result(1, TerminationStatus::Optimal, Some(10.0), 1.0),
            result(2, TerminationStatus::Optimal, Some(14.0), 2.0),
            result(3, TerminationStatus::Infeasible, None, 3.0),
        ];
        let stats = compute_statistics(&results);
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.optimal, 2);
        assert_eq!(stats.infeasible, 1);
        assert_eq!(stats.other, 0);
        assert!((stats.avg_objective.unwrap() - 12.0).abs() < 1e-9);
        assert!((stats.std_objective.unwrap() - 8.0f64.sqrt()).abs() < 1e-9);
        assert_eq!(stats.best_objective, Some(10.0));
        assert_eq!(stats.worst_objective, Some(14.0));
        assert!((stats.total_time - 6.0).abs() < 1e-9);
        assert!(generate_report(&stats).contains("Optimal:       2"));
    }

    #[test]
    fn test_empty_statistics() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.runs, 0);
        assert!(stats.avg_objective.is_none());
        assert_eq!(stats.avg_time, 0.0);
    }

    #[test]
    fn test_batch_runs_every_seed() {
        let runner = BatchRunner::new(BatchConfig { runs: 4, first_seed: 7, show_progress: false });
        let results = runner
            .run(
                &InstanceBuilder::new(3, 2, 4),
                &FormulationConfig::default(),
                &AlwaysInfeasible,
                &SolveOptions::default(),
            )
            .unwrap();
        let seeds: Vec<u64> = results.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![7, 8, 9, 10]);
        assert!(results.iter().all(|r| r.status == TerminationStatus::Infeasible));
    }

    #[test]
    fn test_invalid_template_aborts() {
        let runner = BatchRunner::new(BatchConfig { runs: 2, first_seed: 0, show_progress: false });
        let err = runner.run(
            &InstanceBuilder::new(3, 2, 4).time_window(1, 600, 500),
            &FormulationConfig::default(),
            &AlwaysInfeasible,
            &SolveOptions::default(),
        );
        assert!(matches!(err, Err(InputValidationError::MalformedTimeWindow { .. })));
    }

    #[test]
    fn test_csv_export() {
        let path = std::env::temp_dir().join(format!("vrptw_milp_batch_{}.csv", std::process::id()));
        export_to_csv(&[result(1, TerminationStatus::Optimal, Some(3.5), 0.1)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("seed,num_customers"));
        assert!(text.contains("Optimal"));
        let _ = std::fs::remove_file(&path);
    }
}
