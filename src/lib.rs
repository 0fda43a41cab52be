pub mod config;
pub mod error;
pub mod instance;
pub mod report;
pub mod solver;

/// Artifact label used before a task's (row, configuration) pair is known.
pub const NO_LABEL: &str = "noname";

#[macro_export]
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}
