//! VRPTW MILP Solver - Command Line Interface
//!
//! Builds a CVRPTW instance from three counts, solves its MILP and prints the routes.

use clap::{Parser, ValueEnum};
use vrptw_milp::batch::{self, BatchConfig, BatchRunner};
use vrptw_milp::exact::{create_solver, SolveOptions, SolverKind};
use vrptw_milp::formulation::FormulationConfig;
use vrptw_milp::instance::InstanceBuilder;
use vrptw_milp::pipeline::{RoutingContext, RoutingRun};
use vrptw_milp::record::{self, InstanceRecord, RunLog};
use vrptw_milp::visualization::Visualizer;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vrptw-milp")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Solve the capacitated VRP with time windows as a MILP")]
struct Cli {
    /// Number of customers
    num_customers: usize,

    /// Number of vehicles
    num_vehicles: usize,

    /// Number of goods in the demand pool
    num_goods: usize,

    /// Random seed for locations and demands
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Capacity of every vehicle
    #[arg(long, default_value = "10")]
    capacity: f64,

    /// Time limit in seconds
    #[arg(short, long)]
    time_limit: Option<f64>,

    /// Capacity-only model, no time windows
    #[arg(long)]
    no_time_windows: bool,

    /// JSON file of time windows keyed by customer id
    #[arg(long)]
    windows: Option<PathBuf>,

    /// Ask for every customer's time window on stdin
    #[arg(long)]
    prompt_windows: bool,

    /// Model the depot as a node: one departure per vehicle, flow conservation
    #[arg(long)]
    depot_return: bool,

    /// Tie load variables to the arcs actually used
    #[arg(long)]
    link_load: bool,

    /// Every vehicle must use at least one arc
    #[arg(long)]
    require_vehicle_use: bool,

    /// Drop the capacity constraint
    #[arg(long)]
    no_capacity: bool,

    /// Big-M override for time propagation
    #[arg(long)]
    big_m: Option<f64>,

    /// MILP engine
    #[arg(long, value_enum, default_value = "microlp")]
    solver: Solver,

    /// Run log the instance record is appended to after an optimal solve
    #[arg(long, default_value = record::DEFAULT_LOG_PATH)]
    record: PathBuf,

    /// Write the run summary as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the MILP model as JSON
    #[arg(long)]
    model_out: Option<PathBuf>,

    /// Write the raw solver response (status, objective, named assignment) as JSON
    #[arg(long)]
    response_out: Option<PathBuf>,

    /// Route plot output (.svg, or .png when a converter is available)
    #[arg(long)]
    visualize: Option<PathBuf>,

    /// Solve this many seeded instances instead of one
    #[arg(long)]
    batch: Option<usize>,

    /// Per-run CSV for batch mode
    #[arg(long)]
    batch_output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Solver {
    /// Pure-Rust branch and bound (good_lp + microlp)
    Microlp,
    /// Gurobi (requires the `gurobi` feature)
    Gurobi,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let builder = match instance_builder(&cli) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = FormulationConfig {
        enable_time_windows: !cli.no_time_windows,
        enable_depot_return: cli.depot_return,
        enable_capacity: !cli.no_capacity,
        require_vehicle_use: cli.require_vehicle_use,
        link_load_to_visits: cli.link_load,
        big_m: cli.big_m,
    };
    let options = SolveOptions { time_limit: cli.time_limit, verbose: cli.verbose };

    match cli.batch {
        Some(runs) => run_batch(&cli, &builder, &config, &options, runs),
        None => solve_instance(&cli, builder, config, &options),
    }
}

fn solver_kind(solver: Solver) -> SolverKind {
    match solver {
        Solver::Microlp => SolverKind::MicroLp,
        Solver::Gurobi => SolverKind::Gurobi,
    }
}

fn instance_builder(cli: &Cli) -> vrptw_milp::error::Result<InstanceBuilder> {
    let mut builder = InstanceBuilder::new(cli.num_customers, cli.num_vehicles, cli.num_goods)
        .seed(cli.seed)
        .capacity(cli.capacity);

    if cli.no_time_windows {
        return Ok(builder.without_time_windows());
    }
    if let Some(path) = &cli.windows {
        let windows = record::load_windows(path)?;
        builder = record::apply_windows(builder, &windows);
    }
    if cli.prompt_windows {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        let windows =
            record::prompt_windows(cli.num_customers, &mut input, &mut output, record::current_clock_time())?;
        builder = record::apply_windows(builder, &windows);
    }
    Ok(builder)
}

fn solve_instance(cli: &Cli, builder: InstanceBuilder, config: FormulationConfig, options: &SolveOptions) {
    let instance = match builder.build() {
        Ok(inst) => inst,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.verbose {
        println!("{}", instance.statistics());
    }

    let context = RoutingContext::new(instance, config);

    if cli.verbose {
        println!("Model: {} variables ({} binary), {} constraints, big-M {:.2}",
            context.formulation.model.num_variables(),
            context.formulation.model.num_binaries(),
            context.formulation.model.constraints.len(),
            context.formulation.big_m);
        for (family, count) in context.formulation.model.family_counts() {
            println!("  {:<22} {}", family.to_string(), count);
        }
    }

    if let Some(path) = &cli.model_out {
        match serde_json::to_string_pretty(&context.formulation.model) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => println!("Model saved to {:?}", path),
                Err(e) => eprintln!("Failed to write model: {}", e),
            },
            Err(e) => eprintln!("Failed to serialize model: {}", e),
        }
    }

    let solver = create_solver(solver_kind(cli.solver));
    println!("Solving with {}...", solver.name());
    let run = context.solve(solver.as_ref(), options);

    print_results(&run, cli.verbose);

    if run.is_optimal() {
        let log = RunLog::new(cli.record.clone());
        match log.append(&InstanceRecord::from_instance(run.instance())) {
            Ok(()) => println!("Instance recorded in {:?}", log.path()),
            Err(e) => eprintln!("Failed to record instance: {}", e),
        }
    }

    if let Some(out_path) = &cli.output {
        match serde_json::to_string_pretty(&run.summary()) {
            Ok(json) => match std::fs::write(out_path, json) {
                Ok(()) => println!("\nSummary saved to {:?}", out_path),
                Err(e) => eprintln!("Failed to write output: {}", e),
            },
            Err(e) => eprintln!("Failed to serialize summary: {}", e),
        }
    }

    if let Some(path) = &cli.response_out {
        match serde_json::to_string_pretty(&run.response()) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => println!("Solver response saved to {:?}", path),
                Err(e) => eprintln!("Failed to write solver response: {}", e),
            },
            Err(e) => eprintln!("Failed to serialize solver response: {}", e),
        }
    }

    if let (Some(path), Some(solution)) = (&cli.visualize, &run.decoded.solution) {
        let viz = Visualizer::new();
        let svg = viz.generate_svg(run.instance(), solution);
        save_plot(&viz, &svg, path);

        let load_svg = viz.generate_load_svg(solution);
        let load_path = path.with_extension("load.svg");
        match viz.save_svg(&load_svg, &load_path) {
            Ok(()) => println!("Load chart saved to {:?}", load_path),
            Err(e) => eprintln!("Failed to save load chart: {}", e),
        }

        let data_path = path.with_extension("dat");
        match std::fs::write(&data_path, viz.export_plot_data(run.instance(), solution)) {
            Ok(()) => println!("Plot data saved to {:?}", data_path),
            Err(e) => eprintln!("Failed to save plot data: {}", e),
        }
    }
}

fn save_plot(viz: &Visualizer, svg: &str, path: &PathBuf) {
    let wants_png = path.extension().map(|e| e == "png").unwrap_or(false);
    if wants_png {
        match viz.save_png(svg, path) {
            Ok(()) => {
                println!("Visualization saved to {:?}", path);
                return;
            }
            Err(e) => println!("PNG conversion failed ({}), falling back to SVG", e),
        }
    }
    let svg_path = path.with_extension("svg");
    match viz.save_svg(svg, &svg_path) {
        Ok(()) => println!("Visualization saved to {:?}", svg_path),
        Err(e) => eprintln!("Failed to save SVG: {}", e),
    }
}

fn print_results(run: &RoutingRun, verbose: bool) {
    println!("\n========== Results ==========");
    println!("Solver: {}", run.solver);
    println!("Status: {}", run.status());
    println!("Time: {:.4}s", run.outcome.solve_time);

    match (&run.decoded.solution, &run.decoded.failure) {
        (Some(solution), _) => {
            print!("{}", solution);
            if verbose {
                for route in &solution.routes {
                    for &(i, t) in &route.arrivals {
                        println!("  Vehicle {} arrives at ID_{} at {:.1}", route.vehicle + 1, i, t);
                    }
                }
            }
        }
        (None, Some(failure)) => {
            println!("No solution: {}", failure);
            if let Some(msg) = &run.outcome.message {
                println!("Engine message: {}", msg);
            }
        }
        (None, None) => println!("No solution"),
    }
}

fn run_batch(
    cli: &Cli,
    builder: &InstanceBuilder,
    config: &FormulationConfig,
    options: &SolveOptions,
    runs: usize,
) {
    let solver = create_solver(solver_kind(cli.solver));
    let runner = BatchRunner::new(BatchConfig {
        runs,
        first_seed: cli.seed,
        show_progress: true,
    });

    let results = match runner.run(builder, config, solver.as_ref(), options) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let stats = batch::compute_statistics(&results);
    println!("\n{}", batch::generate_report(&stats));

    if let Some(path) = &cli.batch_output {
        match batch::export_to_csv(&results, path) {
            Ok(()) => println!("Results exported to {:?}", path),
            Err(e) => eprintln!("Failed to export results: {}", e),
        }
    }
}
