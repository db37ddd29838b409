//! Command implementations.

pub mod assertion;
pub mod ca;
pub mod inspect;

use std::fmt::Display;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Writes `buf` to `path`, or to stdout when no path is given.
pub(crate) fn write_to_file_or_stdout(path: Option<&Path>, buf: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, buf)
            .with_context(|| format!("writing {}", path.display())),
        None => std::io::stdout()
            .write_all(buf)
            .context("writing to stdout"),
    }
}

/// Reads all of `path`, or stdin when no path is given.
pub(crate) fn read_from_file_or_stdin(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))
        },
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading from stdin")?;
            Ok(buf)
        },
    }
}

/// Two-column output, keys left-aligned to the widest row.
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: Vec<(String, String)>,
}

impl Table {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, key: &str, value: impl Display) {
        self.rows.push((key.to_string(), value.to_string()));
    }

    pub(crate) fn print(self) {
        let width = self.rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in self.rows {
            println!("{key:<width$} {value}");
        }
    }
}

/// Formats a list of claims the way the queue and inspect output shows them.
pub(crate) fn claim_list<T: Display>(items: &[T]) -> String {
    let joined = items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{joined}]")
}

/// Dumps the collected CPU profile in pprof's protobuf format.
pub(crate) fn write_cpu_profile(path: &Path, guard: &pprof::ProfilerGuard<'_>) -> Result<()> {
    use pprof::protos::Message;

    let report = guard.report().build().context("building CPU profile")?;
    let profile = report.pprof().context("encoding CPU profile")?;
    let mut buf = Vec::new();
    profile
        .write_to_vec(&mut buf)
        .context("serializing CPU profile")?;
    std::fs::write(path, &buf).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_list_joins_with_spaces() {
        assert_eq!(claim_list(&["a", "b", "c"]), "[a b c]");
        assert_eq!(claim_list::<&str>(&[]), "[]");
    }

    #[test]
    fn table_collects_rows() {
        let mut table = Table::new();
        table.add("short", 1);
        table.add("a longer key", "value");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], ("short".to_string(), "1".to_string()));
    }
}
