//! Drives the external `minizinc` executable and exposes its machine-readable
//! output (`--json-stream`, one JSON object per line) as a lazy stream of
//! solve events. All search, parallelism and time-limit enforcement belong to
//! the solver process; this side only shapes the event sequence.
use {
    crate::config::SolverConfig,
    crate::error::{BenchError, Result},
    crate::instance::InstanceRow,
    futures::stream::{self, Stream},
    serde::Deserialize,
    serde_json::{Map, Value},
    std::{fmt, path::Path, process::Stdio, time::Duration},
    tokio::io::{AsyncBufReadExt, BufReader},
    tokio::process::Command,
};

/// Solver statuses, in minizinc's own vocabulary. `Display` yields the exact
/// token that ends up in the persisted YAML documents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Status {
    #[default]
    Unknown,
    Satisfied,
    AllSolutions,
    OptimalSolution,
    Unsatisfiable,
    Unbounded,
    UnsatOrUnbounded,
    Error,
}

impl Status {
    fn parse(token: &str) -> Option<Status> {
        match token {
            "UNKNOWN" => Some(Status::Unknown),
            "SATISFIED" => Some(Status::Satisfied),
            "ALL_SOLUTIONS" => Some(Status::AllSolutions),
            "OPTIMAL_SOLUTION" => Some(Status::OptimalSolution),
            "UNSATISFIABLE" => Some(Status::Unsatisfiable),
            "UNBOUNDED" => Some(Status::Unbounded),
            "UNSAT_OR_UNBOUNDED" => Some(Status::UnsatOrUnbounded),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Status::Unknown => "UNKNOWN",
            Status::Satisfied => "SATISFIED",
            Status::AllSolutions => "ALL_SOLUTIONS",
            Status::OptimalSolution => "OPTIMAL_SOLUTION",
            Status::Unsatisfiable => "UNSATISFIABLE",
            Status::Unbounded => "UNBOUNDED",
            Status::UnsatOrUnbounded => "UNSAT_OR_UNBOUNDED",
            Status::Error => "ERROR",
        };
        write!(f, "{}", token)
    }
}

/// Solving method declared by the model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Satisfy,
    Minimize,
    Maximize,
}

impl Method {
    pub fn is_satisfaction(self) -> bool {
        matches!(self, Method::Satisfy)
    }
}

/// One event on the result stream: an intermediate solution or a final
/// status, together with the statistics lines seen since the last event.
#[derive(Clone, Debug, Default)]
pub struct SolveEvent {
    pub status: Status,
    /// solver-side elapsed time, when the solver reports one
    pub time: Option<Duration>,
    pub solution: Option<Map<String, Value>>,
    pub statistics: Map<String, Value>,
}

// The line shapes minizinc emits under `--json-stream`. Anything not listed
// (warnings, comments, checker output) is skipped.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawEvent {
    Solution {
        #[serde(default)]
        time: Option<u64>,
        output: Map<String, Value>,
    },
    Statistics {
        statistics: Map<String, Value>,
    },
    Status {
        status: String,
        #[serde(default)]
        time: Option<u64>,
    },
    Error {
        #[serde(default)]
        what: Option<String>,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

// Shape one stream line into an event, folding statistics lines into
// `pending` until a solution or status line flushes them.
fn parse_line(line: &str, pending: &mut Map<String, Value>) -> Result<Option<SolveEvent>> {
    let raw: RawEvent =
        serde_json::from_str(line).map_err(|_| BenchError::BadEvent(line.to_string()))?;
    match raw {
        RawEvent::Solution { time, output } => {
            let payload = match output.get("json") {
                Some(Value::Object(map)) => map.clone(),
                _ => return Err(BenchError::BadEvent(line.to_string())),
            };
            Ok(Some(SolveEvent {
                status: Status::Satisfied,
                time: time.map(Duration::from_millis),
                solution: Some(payload),
                statistics: std::mem::take(pending),
            }))
        }
        RawEvent::Statistics { statistics } => {
            for (key, value) in statistics {
                pending.insert(key, value);
            }
            Ok(None)
        }
        RawEvent::Status { status, time } => {
            let status = Status::parse(&status)
                .ok_or_else(|| BenchError::BadEvent(line.to_string()))?;
            Ok(Some(SolveEvent {
                status,
                time: time.map(Duration::from_millis),
                solution: None,
                statistics: std::mem::take(pending),
            }))
        }
        RawEvent::Error { what, message } => Err(BenchError::Solver(match what {
            Some(what) => format!("{}: {}", what, message),
            None => message,
        })),
        RawEvent::Other => Ok(None),
    }
}

/// One fully resolved solver invocation: instance paths made absolute, the
/// configuration's tuning options, and the run's time budget.
#[derive(Clone, Debug)]
pub struct SolveRequest {
    pub instance: InstanceRow,
    pub config: SolverConfig,
    pub timeout: Duration,
}

impl SolveRequest {
    pub fn new(
        instance: &InstanceRow,
        base: &Path,
        config: &SolverConfig,
        timeout: Duration,
    ) -> SolveRequest {
        SolveRequest {
            instance: instance.resolved(base),
            config: config.clone(),
            timeout,
        }
    }

    fn executable(&self) -> Command {
        match &self.config.minizinc {
            Some(path) => Command::new(path),
            None => Command::new("minizinc"),
        }
    }

    /// Ask the model (with its data) which solving method it declares.
    pub async fn method(&self) -> Result<Method> {
        let mut command = self.executable();
        command.arg("--model-interface-only").arg(&self.instance.model);
        if let Some(data) = &self.instance.data_file {
            command.arg(data);
        }
        let out = command.output().await?;
        if !out.status.success() {
            return Err(BenchError::Solver(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ));
        }
        #[derive(Deserialize)]
        struct Interface {
            method: String,
        }
        let interface: Interface = serde_json::from_slice(&out.stdout)?;
        match interface.method.as_str() {
            "sat" => Ok(Method::Satisfy),
            "min" => Ok(Method::Minimize),
            "max" => Ok(Method::Maximize),
            m => Err(BenchError::Solver(format!("unknown solving method {:?}", m))),
        }
    }

    fn command(&self) -> Command {
        let mut command = self.executable();
        command.args([
            "--json-stream",
            "--output-mode",
            "json",
            "--output-time",
            "--output-objective",
            "--intermediate-solutions",
            "--statistics",
        ]);
        command.args(["--solver", &self.config.solver]);
        command
            .arg("--time-limit")
            .arg(self.timeout.as_millis().to_string());
        command.arg("-p").arg(self.config.processes.to_string());
        if let Some(seed) = self.config.random_seed {
            command.arg("-r").arg(seed.to_string());
        }
        if self.config.free_search {
            command.arg("-f");
        }
        if let Some(level) = self.config.optimisation_level {
            command.arg(format!("-O{}", level));
        }
        for (flag, value) in &self.config.other_flags {
            command.arg(flag);
            if !value.is_empty() {
                command.arg(value);
            }
        }
        command.arg(&self.instance.model);
        if let Some(data) = &self.instance.data_file {
            command.arg(data);
        }
        command
    }

    /// Spawn the solver and expose its output as a finite stream of events,
    /// one suspension point per line. The stream ends when the solver exits,
    /// on its own or by running out of its time limit.
    pub fn solutions(&self) -> Result<impl Stream<Item = Result<SolveEvent>>> {
        let mut command = self.command();
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BenchError::Solver("no stdout handle".to_string()))?;
        let lines = BufReader::new(stdout).lines();
        let pending = Map::new();
        Ok(stream::try_unfold(
            (child, lines, pending),
            |(mut child, mut lines, mut pending)| async move {
                loop {
                    match lines.next_line().await? {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) => {
                            if let Some(event) = parse_line(&line, &mut pending)? {
                                return Ok(Some((event, (child, lines, pending))));
                            }
                        }
                        None => {
                            let status = child.wait().await?;
                            if !status.success() {
                                return Err(BenchError::Solver(format!("exited with {}", status)));
                            }
                            return Ok(None);
                        }
                    }
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> SolveRequest {
        let instance = InstanceRow {
            problem: "amaze".to_string(),
            model: PathBuf::from("mzn/amaze.mzn"),
            data_file: Some(PathBuf::from("dzn/amaze-01.dzn")),
        };
        let config = SolverConfig {
            name: "chuffed-free".to_string(),
            solver: "chuffed".to_string(),
            minizinc: None,
            processes: 4,
            random_seed: Some(42),
            free_search: true,
            optimisation_level: Some(1),
            other_flags: [("--restart".to_string(), "luby".to_string())].into(),
        };
        SolveRequest::new(
            &instance,
            Path::new("/bench"),
            &config,
            Duration::from_secs(600),
        )
    }

    #[test]
    fn request_resolves_relative_paths() {
        let request = request();
        assert_eq!(request.instance.model, PathBuf::from("/bench/mzn/amaze.mzn"));
        assert_eq!(
            request.instance.data_file,
            Some(PathBuf::from("/bench/dzn/amaze-01.dzn"))
        );
    }

    #[test]
    fn command_carries_every_tuning_option() {
        let request = request();
        let command = request.command();
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        for expected in [
            "--json-stream",
            "--intermediate-solutions",
            "--time-limit",
            "600000",
            "-p",
            "4",
            "-r",
            "42",
            "-f",
            "-O1",
            "--restart",
            "luby",
        ] {
            assert!(args.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(args.last().unwrap(), "/bench/dzn/amaze-01.dzn");
    }

    #[test]
    fn solution_lines_flush_pending_statistics() {
        let mut pending = Map::new();
        assert!(
            parse_line(
                r#"{"type": "statistics", "statistics": {"flatTime": 0.47}}"#,
                &mut pending,
            )
            .unwrap()
            .is_none()
        );
        let event = parse_line(
            r#"{"type": "solution", "time": 1500, "output": {"json": {"x": 7, "_objective": 42}}}"#,
            &mut pending,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.status, Status::Satisfied);
        assert_eq!(event.time, Some(Duration::from_millis(1500)));
        let solution = event.solution.unwrap();
        assert_eq!(solution.get("x").unwrap(), &Value::from(7));
        assert_eq!(solution.get("_objective").unwrap(), &Value::from(42));
        assert_eq!(event.statistics.get("flatTime").unwrap(), &Value::from(0.47));
        assert!(pending.is_empty());
    }

    #[test]
    fn status_lines_end_the_run() {
        let mut pending = Map::new();
        let event = parse_line(
            r#"{"type": "status", "status": "OPTIMAL_SOLUTION", "time": 2000}"#,
            &mut pending,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.status, Status::OptimalSolution);
        assert!(event.solution.is_none());
        assert_eq!(event.status.to_string(), "OPTIMAL_SOLUTION");
    }

    #[test]
    fn error_lines_become_solver_errors() {
        let mut pending = Map::new();
        let err = parse_line(
            r#"{"type": "error", "what": "type error", "message": "no such parameter"}"#,
            &mut pending,
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Solver(_)));
        assert!(err.to_string().contains("type error"));
    }

    #[test]
    fn unknown_line_kinds_are_skipped() {
        let mut pending = Map::new();
        assert!(
            parse_line(
                r#"{"type": "warning", "message": "model inconsistency detected"}"#,
                &mut pending,
            )
            .unwrap()
            .is_none()
        );
    }
}
