//! Suite definition: which instance table to read, where artifacts go, and
//! the ordered list of solver configurations. Loaded once at process start
//! and passed around by reference; there is no other run-wide state.
use {
    crate::error::{BenchError, Result},
    serde::Deserialize,
    std::{
        collections::BTreeMap,
        fs::File,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// One registered solver configuration. The position in the suite's
/// `configurations` list is part of the task-id arithmetic, so the list
/// must stay identical for every task of a batch array.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    pub name: String,
    /// solver identifier passed to `minizinc --solver`
    pub solver: String,
    /// a specific minizinc executable; the one on PATH when absent
    #[serde(default)]
    pub minizinc: Option<PathBuf>,
    #[serde(default = "one")]
    pub processes: usize,
    #[serde(default)]
    pub random_seed: Option<i64>,
    #[serde(default)]
    pub free_search: bool,
    #[serde(default)]
    pub optimisation_level: Option<u8>,
    /// extra solver-specific flags, passed through verbatim
    #[serde(default)]
    pub other_flags: BTreeMap<String, String>,
}

fn one() -> usize {
    1
}

fn default_timeout() -> u64 {
    1200
}

/// A whole benchmark session.
#[derive(Clone, Debug, Deserialize)]
pub struct Suite {
    /// the instance table file
    pub instances: PathBuf,
    /// directory receiving the per-task artifacts
    pub output_dir: PathBuf,
    /// per-task solver time budget in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    pub configurations: Vec<SolverConfig>,
}

impl Suite {
    /// Read a suite file; relative table and output paths are anchored at
    /// the suite file's own directory.
    pub fn load(path: &Path) -> Result<Suite> {
        let file = File::open(path)?;
        let mut suite: Suite = serde_yaml::from_reader(file)?;
        if suite.configurations.is_empty() {
            return Err(BenchError::NoConfigurations);
        }
        if let Some(dir) = path.parent() {
            if !suite.instances.is_absolute() {
                suite.instances = dir.join(&suite.instances);
            }
            if !suite.output_dir.is_absolute() {
                suite.output_dir = dir.join(&suite.output_dir);
            }
        }
        Ok(suite)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Directory against which relative model and data paths resolve.
    pub fn base_dir(&self) -> &Path {
        self.instances.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SUITE: &str = r#"
instances: instances.csv
output_dir: results
timeout: 600
configurations:
  - name: gecode-default
    solver: gecode
  - name: chuffed-free
    solver: chuffed
    processes: 4
    random_seed: 42
    free_search: true
    optimisation_level: 1
    other_flags:
      "--restart": luby
"#;

    #[test]
    fn load_anchors_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yml");
        let mut file = File::create(&path).unwrap();
        file.write_all(SUITE.as_bytes()).unwrap();
        let suite = Suite::load(&path).unwrap();
        assert_eq!(suite.instances, dir.path().join("instances.csv"));
        assert_eq!(suite.output_dir, dir.path().join("results"));
        assert_eq!(suite.base_dir(), dir.path());
        assert_eq!(suite.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn configuration_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yml");
        let mut file = File::create(&path).unwrap();
        file.write_all(SUITE.as_bytes()).unwrap();
        let suite = Suite::load(&path).unwrap();
        let first = &suite.configurations[0];
        assert_eq!(first.processes, 1);
        assert_eq!(first.random_seed, None);
        assert!(!first.free_search);
        assert!(first.other_flags.is_empty());
        let second = &suite.configurations[1];
        assert_eq!(second.processes, 4);
        assert_eq!(second.random_seed, Some(42));
        assert_eq!(second.optimisation_level, Some(1));
        assert_eq!(second.other_flags.get("--restart").unwrap(), "luby");
    }

    #[test]
    fn empty_configuration_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yml");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"instances: i.csv\noutput_dir: out\nconfigurations: []\n")
            .unwrap();
        assert!(matches!(
            Suite::load(&path),
            Err(BenchError::NoConfigurations)
        ));
    }
}
