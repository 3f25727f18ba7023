use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sampling_planners::euclidean::{
    check_edge_by_interpolation, connect_toward, euclidean_distance,
};
use sampling_planners::prm::{
    grow_roadmap, query_path_with_strategy, save_roadmap, EdgeValidation, QueryConfig,
    QueryStrategy, RoadmapConfig, RoadmapGraph,
};
use sampling_planners::rrt::{
    BiRRT, GoalBiasedSampler, KdTreeNearestNeighbors, MaxIterationsTermination,
    RandomSampleTypeSelection, UniformSampler, RRT,
};
use sampling_planners::PlanningResult;
use std::path::PathBuf;
use tracing::{info, warn};

type Point = [f64; 2];

const SIZE: f64 = 20.0;
const EDGE_RESOLUTION: f64 = 0.05;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Planner {
    /// Eagerly validated roadmap, A* query
    Prm,
    /// Deferred-validation roadmap, lazy A* query
    LazyPrm,
    Rrt,
    Birrt,
}

#[derive(Parser, Debug)]
#[command(version, about = "Plan across a 20x20 grid world with a blocked region", long_about = None)]
struct CliArgs {
    #[arg(short, long, value_enum, default_value = "prm")]
    planner: Planner,

    /// Roadmap size
    #[arg(short, long, default_value_t = 100)]
    nodes: usize,

    /// Neighbors per roadmap node
    #[arg(short, long, default_value_t = 5)]
    k: usize,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Use rayon for neighbor search and edge validation
    #[arg(long)]
    parallel: bool,

    /// Iteration budget for the tree planners
    #[arg(long, default_value_t = 20_000)]
    max_iterations: usize,

    /// Write the roadmap to this file
    #[arg(long)]
    save: Option<PathBuf>,
}

/// Cells of rows 2-11 and columns 5-9 are blocked.
fn is_state_valid(state: &Point) -> bool {
    let in_bounds = state.iter().all(|&v| (0.0..=SIZE).contains(&v));
    let blocked = (5.0..=10.0).contains(&state[0]) && (2.0..=12.0).contains(&state[1]);
    in_bounds && !blocked
}

fn is_edge_valid(a: &Point, b: &Point) -> bool {
    check_edge_by_interpolation(a, b, EDGE_RESOLUTION, is_state_valid)
}

fn path_length(path: &[Point]) -> f64 {
    path.windows(2)
        .map(|pair| euclidean_distance(&pair[0], &pair[1]))
        .sum()
}

fn run_roadmap(args: &CliArgs, start: Point, goal: Point, lazy: bool) -> PlanningResult<()> {
    let validation = if lazy {
        EdgeValidation::Deferred
    } else {
        EdgeValidation::Eager
    };
    let config = RoadmapConfig::new(args.k)
        .with_parallel(args.parallel)
        .with_edge_validation(validation);
    let sampler = UniformSampler::new(StdRng::seed_from_u64(args.seed), [(0.0, SIZE); 2])?;

    let mut roadmap = RoadmapGraph::new();
    let nodes = args.nodes;
    let grow = grow_roadmap(
        &mut roadmap,
        sampler.into_sampling_fn(),
        euclidean_distance::<2>,
        is_state_valid,
        is_edge_valid,
        |size| size >= nodes,
        &config,
    )?;
    info!(
        "Roadmap: {} nodes, {} edges ({} samples, {} rejected)",
        roadmap.len(),
        roadmap.edge_count(),
        grow.samples_drawn,
        grow.invalid_samples + grow.duplicate_samples
    );

    let strategy = if lazy {
        QueryStrategy::Lazy
    } else {
        QueryStrategy::Eager
    };
    let query_config = QueryConfig::new(RoadmapConfig::new(args.k).with_parallel(args.parallel));
    let result = query_path_with_strategy(
        strategy,
        &[start],
        &[goal],
        &roadmap,
        euclidean_distance::<2>,
        is_edge_valid,
        &query_config,
    )?;
    if result.is_success() {
        info!(
            "{:?} query: cost {:.3} over {} states ({} expansions, {} edge checks, {} rounds)",
            strategy,
            result.path_cost,
            result.path.len(),
            result.statistics.expansions,
            result.statistics.edge_checks,
            result.statistics.search_rounds
        );
    } else {
        warn!("{:?} query found no path", strategy);
    }

    if let Some(path) = &args.save {
        save_roadmap(&roadmap, path)?;
        info!("Saved roadmap to {}", path.display());
    }
    Ok(())
}

fn run_rrt(args: &CliArgs, start: Point, goal: Point) -> PlanningResult<()> {
    let sampler = GoalBiasedSampler::new(
        StdRng::seed_from_u64(args.seed),
        [(0.0, SIZE); 2],
        goal,
        0.05,
    )?;
    let mut rrt = RRT::new(
        start,
        KdTreeNearestNeighbors::<2>::new(),
        sampler.into_sampling_fn(),
        |from: &Point, to: &Point| Ok(connect_toward(from, to, 0.5, is_edge_valid)),
        |state: &Point| euclidean_distance(state, &goal) <= 0.1,
    )?;
    let result = rrt.plan_single_path(&mut MaxIterationsTermination::new(args.max_iterations))?;
    info!(
        "RRT: {} after {} iterations, {} nodes, path length {:.3}",
        result.status,
        result.statistics.iterations,
        rrt.get_tree().len(),
        path_length(&result.path)
    );
    Ok(())
}

fn run_birrt(args: &CliArgs, start: Point, goal: Point) -> PlanningResult<()> {
    let sampler = UniformSampler::new(StdRng::seed_from_u64(args.seed), [(0.0, SIZE); 2])?;
    let sample_types =
        RandomSampleTypeSelection::new(StdRng::seed_from_u64(args.seed.wrapping_add(1)), 0.5)?;
    let mut birrt = BiRRT::new(
        start,
        goal,
        KdTreeNearestNeighbors::<2>::new(),
        KdTreeNearestNeighbors::<2>::new(),
        sampler.into_sampling_fn(),
        |from: &Point, to: &Point, _| Ok(connect_toward(from, to, 0.5, is_edge_valid)),
        |a: &Point, b: &Point, _| euclidean_distance(a, b) <= 0.5 && is_edge_valid(a, b),
    )?
    .with_select_sample_type_fn(sample_types.into_select_fn());
    let result = birrt.plan_single_path(&mut MaxIterationsTermination::new(args.max_iterations))?;
    info!(
        "BiRRT: {} after {} iterations, trees {:?}, path length {:.3}",
        result.status,
        result.statistics.iterations,
        result.statistics.tree_sizes,
        path_length(&result.path)
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let start = [1.0, 1.0];
    let goal = [18.0, 18.0];
    info!("Planning {:?} -> {:?} with {:?}", start, goal, args.planner);

    let outcome = match args.planner {
        Planner::Prm => run_roadmap(&args, start, goal, false),
        Planner::LazyPrm => run_roadmap(&args, start, goal, true),
        Planner::Rrt => run_rrt(&args, start, goal),
        Planner::Birrt => run_birrt(&args, start, goal),
    };
    if let Err(error) = outcome {
        eprintln!("Planning failed: {}", error);
        std::process::exit(1);
    }
}
