//! Instance table reading and task-index resolution.
//!
//! The table is comma-separated with one header line; each data row is a
//! (problem, model path, data path) triple, the data path possibly empty.
//! A batch array of `rows * configurations` tasks covers the whole table:
//! task `t` (1-based) owns row `(t-1) / C + 1` and configuration
//! `(t-1) % C`. The reader advances lazily, so resolution never touches
//! rows behind the owning one.
use {
    crate::error::{BenchError, Result},
    crate::regex,
    std::{
        fs::File,
        io::{BufRead, BufReader, Lines},
        path::{Path, PathBuf},
    },
};

/// One data row of the instance table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRow {
    pub problem: String,
    pub model: PathBuf,
    pub data_file: Option<PathBuf>,
}

impl InstanceRow {
    fn parse(line: &str, lineno: usize) -> Result<InstanceRow> {
        let fields = split_row(line);
        if fields.len() != 3 {
            return Err(BenchError::BadRow {
                line: lineno,
                text: line.to_string(),
            });
        }
        Ok(InstanceRow {
            problem: fields[0].clone(),
            model: PathBuf::from(&fields[1]),
            data_file: if fields[2].is_empty() {
                None
            } else {
                Some(PathBuf::from(&fields[2]))
            },
        })
    }

    /// A copy with relative model and data paths resolved against `base`.
    pub fn resolved(&self, base: &Path) -> InstanceRow {
        let anchor = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        InstanceRow {
            problem: self.problem.clone(),
            model: anchor(&self.model),
            data_file: self.data_file.as_ref().map(anchor),
        }
    }
}

// Fields may carry the quoting the table writer produced; `""` inside a
// quoted field is a literal quote.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if !quoted && field.is_empty() => quoted = true,
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Lazy reader over the instance table; the header line is skipped on open.
pub struct InstanceTable {
    lines: Lines<BufReader<File>>,
    lineno: usize,
}

impl InstanceTable {
    pub fn open(path: &Path) -> Result<InstanceTable> {
        let mut lines = BufReader::new(File::open(path)?).lines();
        lines.next().transpose()?;
        Ok(InstanceTable { lines, lineno: 1 })
    }

    /// The next data row, `None` once the table is exhausted.
    pub fn next_row(&mut self) -> Result<Option<InstanceRow>> {
        loop {
            self.lineno += 1;
            match self.lines.next().transpose()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return InstanceRow::parse(&line, self.lineno).map(Some),
            }
        }
    }

    /// Number of data rows; consumes the reader.
    pub fn count(mut self) -> Result<usize> {
        let mut n = 0;
        while self.next_row()?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}

/// The (row, configuration) pair a task owns.
#[derive(Clone, Debug)]
pub struct Assignment {
    /// 1-based data row number
    pub row: usize,
    pub instance: InstanceRow,
    /// index into the suite's configuration list
    pub config_index: usize,
}

/// Map a 1-based array task id onto its owning (row, configuration) pair,
/// advancing the table row by row. Ids past `rows * num_configs` run the
/// table out and fail.
pub fn resolve(
    table: &mut InstanceTable,
    task_id: usize,
    num_configs: usize,
) -> Result<Assignment> {
    if num_configs == 0 {
        return Err(BenchError::NoConfigurations);
    }
    if task_id == 0 {
        return Err(BenchError::BadTaskId("0".to_string()));
    }
    let mut t = task_id - 1;
    let mut row = 1;
    while t >= num_configs {
        if table.next_row()?.is_none() {
            return Err(BenchError::Exhausted { task_id, row });
        }
        t -= num_configs;
        row += 1;
    }
    match table.next_row()? {
        Some(instance) => Ok(Assignment {
            row,
            instance,
            config_index: t,
        }),
        None => Err(BenchError::Exhausted { task_id, row }),
    }
}

/// Per-task artifact label; characters a filename should not carry collapse
/// to '-'.
pub fn label(row: usize, config_name: &str) -> String {
    let name = regex!(r"[^0-9A-Za-z._-]+").replace_all(config_name, "-");
    format!("{}_{}", row, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
problem,model,data_file
amaze,mzn/amaze.mzn,dzn/amaze-01.dzn
grid-color,mzn/grid-color.mzn,
\"queens\",\"mzn/queens.mzn\",\"dzn/n=8.dzn\"
";

    fn table(dir: &tempfile::TempDir) -> InstanceTable {
        let path = dir.path().join("instances.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        InstanceTable::open(&path).unwrap()
    }

    #[test]
    fn rows_parse_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table(&dir);
        let first = t.next_row().unwrap().unwrap();
        assert_eq!(first.problem, "amaze");
        assert_eq!(first.model, PathBuf::from("mzn/amaze.mzn"));
        assert_eq!(first.data_file, Some(PathBuf::from("dzn/amaze-01.dzn")));
        let second = t.next_row().unwrap().unwrap();
        assert_eq!(second.data_file, None);
        let third = t.next_row().unwrap().unwrap();
        assert_eq!(third.problem, "queens");
        assert_eq!(third.data_file, Some(PathBuf::from("dzn/n=8.dzn")));
        assert!(t.next_row().unwrap().is_none());
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let fields = split_row("\"a,b\",\"say \"\"hi\"\"\",c");
        assert_eq!(fields, vec!["a,b", "say \"hi\"", "c"]);
    }

    #[test]
    fn count_skips_the_header() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(table(&dir).count().unwrap(), 3);
    }

    #[test]
    fn resolution_matches_the_div_mod_formula() {
        let dir = tempfile::tempdir().unwrap();
        let configs = 2;
        for task_id in 1..=6 {
            let a = resolve(&mut table(&dir), task_id, configs).unwrap();
            assert_eq!(a.row, (task_id - 1) / configs + 1, "task {task_id}");
            assert_eq!(a.config_index, (task_id - 1) % configs, "task {task_id}");
        }
    }

    #[test]
    fn task_four_of_three_by_two_owns_row_two() {
        let dir = tempfile::tempdir().unwrap();
        let a = resolve(&mut table(&dir), 4, 2).unwrap();
        assert_eq!(a.row, 2);
        assert_eq!(a.config_index, 1);
        assert_eq!(a.instance.problem, "grid-color");
    }

    #[test]
    fn task_past_the_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve(&mut table(&dir), 7, 2),
            Err(BenchError::Exhausted { task_id: 7, .. })
        ));
    }

    #[test]
    fn task_zero_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve(&mut table(&dir), 0, 2),
            Err(BenchError::BadTaskId(_))
        ));
    }

    #[test]
    fn labels_are_filename_safe() {
        assert_eq!(label(2, "chuffed-free"), "2_chuffed-free");
        assert_eq!(label(11, "gecode 6.3 / free"), "11_gecode-6.3-free");
    }
}
