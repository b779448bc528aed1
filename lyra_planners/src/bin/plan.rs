use anyhow::{ensure, Context, Result};
use lyra_planning::ground::{ground_problem, instantiate};
use lyra_planning::parsing::{find_domain_of, parse_domain, parse_problem};
use lyra_planning::search::plan_search;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::fmt::Formatter;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use structopt::StructOpt;

/// Breadth-first planner for deterministic problems.
#[derive(Debug, StructOpt)]
#[structopt(name = "plan", rename_all = "kebab-case")]
struct Opt {
    /// If not set, a `domain.pddl` (or `<problem>-domain.pddl`) file is
    /// looked up in the directory of the problem file or in its parent.
    #[structopt(long, short)]
    domain: Option<PathBuf>,
    problem: PathBuf,

    /// Seed of the random source used to settle probabilities.
    #[structopt(long)]
    seed: Option<u64>,

    /// If a plan is found, it will be written to the indicated file.
    #[structopt(short = "p", long = "plan")]
    plan_file: Option<String>,

    /// Return failure with code 1 if the problem is not solved.
    #[structopt(long)]
    expect_sat: bool,

    /// Return failure with code 1 if the problem is not proved unsolvable.
    #[structopt(long)]
    expect_unsat: bool,

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
    for op in grounded.operators.iter() {
        ensure!(
            grounded.operators[op].is_deterministic(),
            "Action {} has probabilistic effects; use the vi binary instead",
            lifted.world.table.format(grounded.operators.name(op))
        );
    }

    let symbols = &lifted.world.table;
    let search_result = plan_search(&grounded.initial_state, &grounded.operators, &grounded.goals);
    let runtime = start_time.elapsed();

    let result = match search_result {
        Some(plan) => {
            println!("Got plan: {} actions", plan.len());
            println!("=============");
            for &op in &plan {
                println!("{}", symbols.format(grounded.operators.name(op)));
            }
            if let Some(plan_file) = opt.plan_file {
                let mut output = File::create(&plan_file)
                    .with_context(|| format!("Option -p failed to create file {}", &plan_file))?;
                for &op in &plan {
                    writeln!(output, "{}", symbols.format(grounded.operators.name(op)))
                        .context("Error while writing plan.")?;
                }
            }
            SolverResult {
                solution: Solution::Sat,
                cost: Some(plan.len() as f64),
                runtime,
            }
        }
        None => SolverResult {
            solution: Solution::Unsat,
            cost: None,
            runtime,
        },
    };

    println!("{result}");
    if opt.expect_sat && result.solution != Solution::Sat {
        std::process::exit(1);
    }
    if opt.expect_unsat && result.solution != Solution::Unsat {
        std::process::exit(1);
    }
    Ok(())
}

struct SolverResult {
    solution: Solution,
    cost: Option<f64>,
    runtime: std::time::Duration,
}

impl std::fmt::Display for SolverResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[summary] solution:{} cost:{} runtime:{}ms",
            match self.solution {
                Solution::Sat => "SAT",
                Solution::Unsat => "UNSAT",
            },
            self.cost.map_or_else(|| "_".to_string(), |cost| format!("{cost}")),
            self.runtime.as_millis()
        )
    }
}

#[derive(Eq, PartialEq)]
enum Solution {
    Unsat,
    Sat,
}
