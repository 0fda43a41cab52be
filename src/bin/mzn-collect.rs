/// Collect the per-task statistics artifacts of a finished batch array into
/// one CSV table on stdout.
/// Usage: mzn-collect [--from DIR] [-M message]
use {
    chrono::Local,
    clap::Parser,
    mzn_bench::{regex, report},
    serde_json::Value,
    std::{fs, path::PathBuf},
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "mzn-collect", about = "Convert per-task statistics files to a CSV table")]
struct Config {
    /// directory to scan
    #[arg(long = "from", default_value = ".")]
    from: PathBuf,
    /// additional string used in the header
    #[arg(long = "message", short = 'M', default_value = "")]
    message: String,
}

fn main() -> std::io::Result<()> {
    let config = Config::parse();
    let mut rows: Vec<(String, usize, String, String, String, String)> = Vec::new();
    for e in fs::read_dir(&config.from)? {
        let f = e?;
        if !f.file_type()?.is_file() {
            continue;
        }
        let fname = f.file_name().to_string_lossy().to_string();
        let Some(c) = regex!(r"^([0-9]+)_(.+)_stats\.yml$").captures(&fname) else {
            continue;
        };
        let row: usize = c[1].parse().unwrap_or(0);
        let configuration = c[2].to_string();
        match report::read_statistics(&f.path()) {
            Ok(doc) => rows.push((
                configuration,
                row,
                field(&doc, "problem"),
                field(&doc, "status"),
                field(&doc, "time"),
                field(&doc, "objective"),
            )),
            Err(e) => eprintln!("skipping {}: {}", fname, e),
        }
    }
    rows.sort();
    let extra_message = if config.message.is_empty() {
        "".to_string()
    } else {
        format!(", {}", config.message)
    };
    println!(
        "# mzn-bench {} @ {}{}",
        VERSION,
        Local::now().format("%FT%H:%M:%S"),
        extra_message
    );
    println!("configuration,row,problem,status,time,objective");
    for (configuration, row, problem, status, time, objective) in &rows {
        println!(
            "\"{}\",{},\"{}\",{},{},{}",
            configuration, row, problem, status, time, objective
        );
    }
    Ok(())
}

fn field(doc: &serde_json::Map<String, Value>, key: &str) -> String {
    match doc.get(key) {
        None | Some(Value::Null) => "".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}
