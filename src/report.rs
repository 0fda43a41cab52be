//! Per-task artifacts: the append-only solutions file, the final statistics
//! document, and the error trace the dispatcher leaves behind on failure.
use {
    crate::config::SolverConfig,
    crate::error::{BenchError, Result},
    crate::instance::InstanceRow,
    crate::solver::SolveEvent,
    serde::Serialize,
    serde_json::{Map, Value},
    std::{
        fs::File,
        io::Write,
        path::Path,
        time::Duration,
    },
};

/// One persisted intermediate solution. Paths are the raw table strings, not
/// the resolved absolute ones, so documents stay comparable across hosts.
#[derive(Debug, Serialize)]
pub struct SolutionRecord {
    pub problem: String,
    pub model: String,
    pub data_file: String,
    pub configuration: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<Map<String, Value>>,
}

impl SolutionRecord {
    pub fn new(instance: &InstanceRow, config: &SolverConfig, event: &SolveEvent) -> SolutionRecord {
        SolutionRecord {
            problem: instance.problem.clone(),
            model: instance.model.to_string_lossy().to_string(),
            data_file: instance
                .data_file
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            configuration: config.name.clone(),
            status: event.status.to_string(),
            time: event.time.map(|t| t.as_secs_f64()),
            solution: event.solution.as_ref().map(public_payload),
        }
    }
}

// Underscore-prefixed keys are solver bookkeeping (objective, output item,
// checker artifacts) and never reach the persisted payload.
fn public_payload(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Append-only writer for the `<label>_sol.yml` artifact. Every record hits
/// the file before the next event is awaited, so everything streamed so far
/// survives a later kill.
pub struct SolutionWriter {
    file: File,
}

impl SolutionWriter {
    pub fn create(output_dir: &Path, label: &str) -> Result<SolutionWriter> {
        let file = File::create(output_dir.join(format!("{}_sol.yml", label)))?;
        Ok(SolutionWriter { file })
    }

    pub fn append(&mut self, record: &SolutionRecord) -> Result<()> {
        let doc = serde_yaml::to_string(std::slice::from_ref(record))?;
        self.file.write_all(doc.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// A statistics value; durations stay typed until `finalize` turns them into
/// plain seconds.
#[derive(Clone, Debug, PartialEq)]
pub enum StatValue {
    Duration(Duration),
    Value(Value),
}

/// Cumulative run statistics. Events overwrite existing keys and append new
/// ones; `status` always tracks the most recent event.
#[derive(Debug)]
pub struct Statistics {
    fields: Vec<(String, StatValue)>,
}

impl Statistics {
    pub fn new(instance: &InstanceRow, config: &SolverConfig) -> Statistics {
        let mut stats = Statistics { fields: Vec::new() };
        stats.set("problem", Value::from(instance.problem.as_str()));
        stats.set("model", Value::from(instance.model.to_string_lossy()));
        stats.set(
            "data_file",
            Value::from(
                instance
                    .data_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ),
        );
        stats.set("configuration", Value::from(config.name.as_str()));
        stats.set("status", Value::from("UNKNOWN"));
        stats
    }

    fn set<V: Into<StatValue>>(&mut self, key: &str, value: V) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    /// Fold one solve event in.
    pub fn absorb(&mut self, event: &SolveEvent, is_satisfaction: bool) {
        for (key, value) in &event.statistics {
            self.set(key, value.clone());
        }
        if let Some(time) = event.time {
            self.set("time", StatValue::Duration(time));
        }
        self.set("status", Value::from(event.status.to_string()));
        if let Some(solution) = &event.solution {
            if !is_satisfaction {
                if let Some(objective) = solution.get("_objective") {
                    self.set("objective", objective.clone());
                }
            }
        }
    }

    /// The document to persist: every duration becomes numeric seconds.
    pub fn finalize(self) -> Map<String, Value> {
        self.fields
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    StatValue::Duration(d) => Value::from(d.as_secs_f64()),
                    StatValue::Value(v) => v,
                };
                (key, value)
            })
            .collect()
    }
}

impl From<Value> for StatValue {
    fn from(value: Value) -> StatValue {
        StatValue::Value(value)
    }
}

/// Write the `<label>_stats.yml` artifact, once, after the stream ended.
pub fn write_statistics(output_dir: &Path, label: &str, stats: Statistics) -> Result<()> {
    let doc = serde_yaml::to_string(&stats.finalize())?;
    let mut file = File::create(output_dir.join(format!("{}_stats.yml", label)))?;
    file.write_all(doc.as_bytes())?;
    Ok(())
}

/// Read a statistics document back; the collector's side of `write_statistics`.
pub fn read_statistics(path: &Path) -> Result<Map<String, Value>> {
    let file = File::open(path)?;
    let doc: Map<String, Value> = serde_yaml::from_reader(file)?;
    Ok(doc)
}

/// Leave the error trace beside the other artifacts. This is the only failure
/// handling a task gets; solutions already streamed stay on disk untouched.
/// A task can fail before anything created the output directory, so it is
/// created here if need be.
pub fn report_failure(output_dir: &Path, label: &str, error: &BenchError) -> std::io::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    let mut text = format!("ERROR: {}\n", error);
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        text.push_str(&format!("caused by: {}\n", cause));
        source = cause.source();
    }
    std::fs::write(output_dir.join(format!("{}_err.txt", label)), text)
}
