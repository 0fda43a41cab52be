/// Run one (instance, configuration) pair of a benchmark suite, selected by
/// the batch array task id.
/// Usage: mzn-dispatch [OPTIONS] <SUITE>
/// # Examples:
/// - mzn-dispatch suite.yml                # task id from SLURM_ARRAY_TASK_ID
/// - mzn-dispatch -t 4 suite.yml           # run array task 4 locally
/// - mzn-dispatch -c suite.yml             # print the array size and exit
use {
    clap::Parser,
    futures::{TryStreamExt, pin_mut},
    mzn_bench::{
        NO_LABEL,
        config::Suite,
        error::{BenchError, Result},
        instance::{self, InstanceTable},
        report::{self, SolutionRecord, SolutionWriter, Statistics},
        solver::SolveRequest,
    },
    std::{env, fs, path::PathBuf, process::exit},
};

const TASK_ID_VAR: &str = "SLURM_ARRAY_TASK_ID";

#[derive(Clone, Debug, Parser)]
#[command(name = "mzn-dispatch", about = "Run one suite instance per batch array task")]
struct Config {
    /// the suite definition file
    suite: PathBuf,
    /// override the task id taken from SLURM_ARRAY_TASK_ID
    #[arg(long = "task-id", short = 't')]
    task_id: Option<usize>,
    /// print the number of array tasks the suite needs and exit
    #[arg(long = "count", short = 'c')]
    count: bool,
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    let suite = match Suite::load(&config.suite) {
        Ok(suite) => suite,
        Err(e) => {
            eprintln!("cannot load {}: {}", config.suite.to_string_lossy(), e);
            exit(1);
        }
    };
    if config.count {
        match InstanceTable::open(&suite.instances).and_then(InstanceTable::count) {
            Ok(rows) => println!("{}", rows * suite.configurations.len()),
            Err(e) => {
                eprintln!("cannot count {}: {}", suite.instances.to_string_lossy(), e);
                exit(1);
            }
        }
        return;
    }
    // Whatever fails below, a trace must land on disk under the best label
    // known so far.
    let mut label = NO_LABEL.to_string();
    if let Err(err) = run(&config, &suite, &mut label).await {
        if let Err(io) = report::report_failure(&suite.output_dir, &label, &err) {
            eprintln!("cannot record \"{}\" for {}: {}", err, label, io);
        }
        exit(1);
    }
}

fn task_id(config: &Config) -> Result<usize> {
    if let Some(id) = config.task_id {
        return Ok(id);
    }
    let raw = env::var(TASK_ID_VAR)
        .map_err(|_| BenchError::MissingTaskId(TASK_ID_VAR.to_string()))?;
    match raw.parse::<usize>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(BenchError::BadTaskId(raw)),
    }
}

async fn run(config: &Config, suite: &Suite, label: &mut String) -> Result<()> {
    let task_id = task_id(config)?;
    let mut table = InstanceTable::open(&suite.instances)?;
    let assignment = instance::resolve(&mut table, task_id, suite.configurations.len())?;
    let solver_config = &suite.configurations[assignment.config_index];
    *label = instance::label(assignment.row, &solver_config.name);

    fs::create_dir_all(&suite.output_dir)?;
    let request = SolveRequest::new(
        &assignment.instance,
        suite.base_dir(),
        solver_config,
        suite.timeout(),
    );
    let is_satisfaction = request.method().await?.is_satisfaction();

    let mut writer = SolutionWriter::create(&suite.output_dir, label)?;
    let mut stats = Statistics::new(&assignment.instance, solver_config);
    let solutions = request.solutions()?;
    pin_mut!(solutions);
    while let Some(event) = solutions.try_next().await? {
        writer.append(&SolutionRecord::new(
            &assignment.instance,
            solver_config,
            &event,
        ))?;
        stats.absorb(&event, is_satisfaction);
    }
    report::write_statistics(&suite.output_dir, label, stats)?;
    Ok(())
}
