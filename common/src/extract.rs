use std::{fs, path::PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::table::{Table, Value};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read `{path}`")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// One benchmark run: a log file plus the parameter values that produced it.
#[derive(Debug, Clone)]
pub struct RunFile {
    pub path: PathBuf,
    pub params: Vec<(String, Value)>,
}

/// Scans each run's log and returns one table row per line matching a
/// measurement pattern.
///
/// Section patterns are tested line by line; the captures of the most recent
/// match of each pattern stay active until a later match overwrites the same
/// group name. A measurement row merges, in order, the run's parameters, the
/// active section captures, and the match's own named groups; later sources
/// overwrite same-named keys.
///
/// An unreadable file or a malformed pattern fails the whole call; patterns
/// are compiled before any file is opened.
pub fn extract(
    files: &[RunFile],
    section_patterns: &[&str],
    measurement_patterns: &[&str],
) -> Result<Table, ExtractError> {
    let sections = compile(section_patterns)?;
    let measurements = compile(measurement_patterns)?;

    let mut table = Table::new();
    for run in files {
        let text = fs::read_to_string(&run.path).map_err(|source| ExtractError::FileRead {
            path: run.path.clone(),
            source,
        })?;
        let before = table.len();
        scan_file(&mut table, run, &text, &sections, &measurements);
        debug!(
            "{}: {} measurement row(s)",
            run.path.display(),
            table.len() - before
        );
    }
    table.coerce_columns();
    Ok(table)
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, ExtractError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ExtractError::Pattern {
                pattern: (*p).to_owned(),
                source: Box::new(source),
            })
        })
        .collect()
}

fn scan_file(
    table: &mut Table,
    run: &RunFile,
    text: &str,
    sections: &[Regex],
    measurements: &[Regex],
) {
    // Active section captures for this file, threaded through the line scan.
    let mut active: Vec<(String, Value)> = Vec::new();

    for line in text.lines() {
        for re in sections {
            if let Some(caps) = re.captures(line) {
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        upsert(&mut active, name, Value::parse(m.as_str()));
                    }
                }
            }
        }

        // A line matching several measurement patterns emits one row each.
        for re in measurements {
            if let Some(caps) = re.captures(line) {
                let mut row = run.params.clone();
                for (name, value) in &active {
                    upsert(&mut row, name, value.clone());
                }
                for name in re.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        upsert(&mut row, name, Value::parse(m.as_str()));
                    }
                }
                table.push_row(row);
            }
        }
    }
}

fn upsert(fields: &mut Vec<(String, Value)>, name: &str, value: Value) {
    match fields.iter().position(|(k, _)| k == name) {
        Some(pos) => fields[pos].1 = value,
        None => fields.push((name.to_owned(), value)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const SECTIONS: &[&str] = &[r"# of processes: *(?P<nproc>\d+)"];
    const MEASUREMENTS: &[&str] = &[r"\[(?P<i>\d+)\] *(?P<time>\d+) *ns"];

    fn log_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn run(path: &std::path::Path, params: &[(&str, Value)]) -> RunFile {
        RunFile {
            path: path.to_owned(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn section_captures_propagate_to_measurement_rows() {
        let f = log_file("# of processes: 4\n[1] 100 ns\n[2] 200 ns\n");
        let files = [run(f.path(), &[])];
        let t = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "nproc"), Some(&Value::Int(4)));
        assert_eq!(t.get(0, "i"), Some(&Value::Int(1)));
        assert_eq!(t.get(0, "time"), Some(&Value::Int(100)));
        assert_eq!(t.get(1, "nproc"), Some(&Value::Int(4)));
        assert_eq!(t.get(1, "i"), Some(&Value::Int(2)));
        assert_eq!(t.get(1, "time"), Some(&Value::Int(200)));
    }

    #[test]
    fn section_recapture_overwrites_previous_value() {
        let f = log_file(
            "# of processes: 4\n[0] 10 ns\n# of processes: 8\n[1] 20 ns\n",
        );
        let files = [run(f.path(), &[])];
        let t = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        assert_eq!(t.get(0, "nproc"), Some(&Value::Int(4)));
        assert_eq!(t.get(1, "nproc"), Some(&Value::Int(8)));
    }

    #[test]
    fn params_are_attached_and_captures_override_them() {
        let f = log_file("# of processes: 4\n[0] 10 ns\n");
        let files = [run(
            f.path(),
            &[
                ("policy", Value::Text("nocache".to_owned())),
                // Same name as a section capture: the capture wins.
                ("nproc", Value::Int(999)),
            ],
        )];
        let t = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        assert_eq!(t.get(0, "policy"), Some(&Value::Text("nocache".to_owned())));
        assert_eq!(t.get(0, "nproc"), Some(&Value::Int(4)));
    }

    #[test]
    fn row_count_equals_measurement_matches() {
        let f = log_file("noise\n[0] 1 ns\nmore noise\n[1] 2 ns\n[2] 3 ns\ntrailing\n");
        let files = [run(f.path(), &[])];
        let t = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn multiple_measurement_patterns_emit_one_row_each() {
        let f = log_file("[0] 5 ns\n");
        let files = [run(f.path(), &[])];
        let patterns = [r"\[(?P<i>\d+)\]", r"(?P<time>\d+) *ns"];
        let t = extract(&files, &[], &patterns).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "i"), Some(&Value::Int(0)));
        assert_eq!(t.get(0, "time"), Some(&Value::Null));
        assert_eq!(t.get(1, "time"), Some(&Value::Int(5)));
    }

    #[test]
    fn numeric_coercion_of_captures() {
        let f = log_file("Traverse : 12.5 s\nTraverse : 12 s\n");
        let files = [run(f.path(), &[])];
        let t = extract(&files, &[], &[r"Traverse *: *(?P<time>[\d.]+) *s"]).unwrap();
        // Column-wide promotion: the integer row joins the float rows.
        assert_eq!(t.get(0, "time"), Some(&Value::Float(12.5)));
        assert_eq!(t.get(1, "time"), Some(&Value::Float(12.0)));
    }

    #[test]
    fn missing_file_fails_the_whole_call() {
        let good = log_file("[0] 1 ns\n");
        let files = [
            run(good.path(), &[]),
            run(std::path::Path::new("/nonexistent/run.out"), &[]),
        ];
        let err = extract(&files, SECTIONS, MEASUREMENTS).unwrap_err();
        assert!(matches!(err, ExtractError::FileRead { .. }));
    }

    #[test]
    fn malformed_pattern_fails_before_reading() {
        let files = [run(std::path::Path::new("/nonexistent/run.out"), &[])];
        let err = extract(&files, &["(unclosed"], MEASUREMENTS).unwrap_err();
        assert!(matches!(err, ExtractError::Pattern { .. }));
    }

    #[test]
    fn extraction_is_idempotent() {
        let f = log_file("# of processes: 2\n[0] 7 ns\n[1] 9 ns\n");
        let files = [run(f.path(), &[("duplicate", Value::Int(0))])];
        let a = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        let b = extract(&files, SECTIONS, MEASUREMENTS).unwrap();
        assert_eq!(a, b);
    }
}
