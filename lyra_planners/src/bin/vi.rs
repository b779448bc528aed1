use anyhow::{ensure, Context, Result};
use lyra_planning::ground::{ground_problem, instantiate};
use lyra_planning::mdp::{value_iteration, Cfg};
use lyra_planning::parsing::{find_domain_of, parse_domain, parse_problem};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::path::PathBuf;
use structopt::StructOpt;

/// Value iteration over the reachable states of a (probabilistic) problem.
#[derive(Debug, StructOpt)]
#[structopt(name = "vi", rename_all = "kebab-case")]
struct Opt {
    /// If not set, a `domain.pddl` (or `<problem>-domain.pddl`) file is
    /// looked up in the directory of the problem file or in its parent.
    #[structopt(long, short)]
    domain: Option<PathBuf>,
    problem: PathBuf,

    /// Discount factor applied to future value in the Bellman backup.
    #[structopt(long, default_value = "0.5")]
    discount: f64,

    /// Convergence threshold on the largest sweep-to-sweep value change.
    #[structopt(long, default_value = "0.05")]
    epsilon: f64,

    /// Cap on the number of sweeps; reaching it returns the best-effort values.
    #[structopt(long, default_value = "1000")]
    max_sweeps: u32,

    /// Seed of the random source used to settle imprecise probabilities.
    #[structopt(long)]
    seed: Option<u64>,

    /// Only print the summary line, not the per-state values.
    #[structopt(short, long)]
    quiet: bool,

    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[structopt(short, long, default_value = "warn")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let opt: Opt = Opt::from_args();
    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(std::time::Instant::now()))
        .with_max_level(opt.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    let start_time = std::time::Instant::now();

    let problem_file = &opt.problem;
    ensure!(
        problem_file.exists(),
        "Problem file {} does not exist",
        problem_file.display()
    );
    let domain_file = match opt.domain {
        Some(path) => path,
        None => find_domain_of(problem_file)
            .context("Consider specifying the domain with the option -d/--domain")?,
    };

    let dom = std::fs::read_to_string(&domain_file)
        .with_context(|| format!("Could not read domain file {}", domain_file.display()))?;
    let prob = std::fs::read_to_string(problem_file)
        .with_context(|| format!("Could not read problem file {}", problem_file.display()))?;

    let dom = parse_domain(&dom)?;
    let prob = parse_problem(&prob)?;
    let lifted = instantiate(&dom, &prob)?;

    let mut rng = match opt.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::seed_from_u64(rand::random()),
    };
    let grounded = ground_problem(&lifted, &mut rng)?;

    let cfg = Cfg {
        discount: opt.discount,
        epsilon: opt.epsilon,
        max_sweeps: opt.max_sweeps,
    };
    let values = value_iteration(&grounded.initial_state, &grounded.operators, &grounded.goals, &cfg);
    let runtime = start_time.elapsed();

    if !opt.quiet {
        for (state, value) in values.iter() {
            println!("{:.6}  {}", value, lifted.world.format_state(state));
        }
    }
    println!(
        "[summary] states:{} sweeps:{} converged:{} runtime:{}ms",
        values.len(),
        values.sweeps,
        values.converged,
        runtime.as_millis()
    );
    Ok(())
}
