//! Subjects in from a CSV column, results back out as extra columns.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use tracing::info;

use crate::lang_graph::{types::response::ResultTable, MAX_SUBJECTS};

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .with_context(|| format!("column {column:?} not found in CSV headers"))
}

/// Distinct non-blank values of `column`, in first-seen row order.
pub fn read_subjects(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let index = column_index(reader.headers()?, column)?;

    let mut subjects: Vec<String> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed row in {}", path.display()))?;
        let Some(value) = record.get(index).map(str::trim) else {
            continue;
        };
        if !value.is_empty() && !subjects.iter().any(|s| s == value) {
            subjects.push(value.to_string());
        }
    }

    if subjects.is_empty() {
        bail!("column {column:?} holds no subjects");
    }
    if subjects.len() > MAX_SUBJECTS {
        bail!(
            "column {column:?} holds {} distinct subjects, at most {MAX_SUBJECTS} are supported",
            subjects.len()
        );
    }
    Ok(subjects)
}

/// Copies `input` to `output` with one extra column per table field. Each
/// row gets the value belonging to its own subject. `output` may be `input`.
pub fn augment_csv(input: &Path, column: &str, table: &ResultTable, output: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(input)
        .with_context(|| format!("cannot open {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let index = column_index(&headers, column)?;
    // Creating `output` truncates `input` when both name the same file.
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("malformed row in {}", input.display()))?;
    drop(reader);

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("cannot create {}", output.display()))?;
    let mut header_row: Vec<&str> = headers.iter().collect();
    header_row.extend(table.fields());
    writer.write_record(&header_row)?;

    for record in &records {
        let subject = record.get(index).map(str::trim).unwrap_or_default();
        let position = table.subjects.iter().position(|s| s == subject);

        let mut row: Vec<&str> = record.iter().collect();
        row.extend(table.columns.iter().map(|c| {
            position
                .and_then(|p| c.values.get(p))
                .map(String::as_str)
                .unwrap_or_default()
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(rows = records.len(), output = %output.display(), "Wrote augmented CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::lang_graph::types::response::ResultColumn;

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn subjects_are_distinct_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "in.csv",
            "id,company\n1,Meta\n2,Google\n3,Meta\n4,\n5,Amazon\n",
        );
        assert_eq!(
            read_subjects(&path, "company").unwrap(),
            ["Meta", "Google", "Amazon"]
        );
    }

    #[test]
    fn too_many_or_missing_subjects_fail() {
        let dir = tempfile::tempdir().unwrap();
        let many = write(&dir, "many.csv", "company\na\nb\nc\nd\ne\nf\n");
        assert!(read_subjects(&many, "company").is_err());

        let empty = write(&dir, "empty.csv", "company\n\n");
        assert!(read_subjects(&empty, "company").is_err());

        assert!(read_subjects(&many, "name").is_err());
    }

    #[test]
    fn rows_get_their_own_subject_values() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(&dir, "in.csv", "id,company\n1,Meta\n2,Google\n3,Meta\n4,Apple\n");
        let output = dir.path().join("out.csv");
        let table = ResultTable {
            subjects: vec!["Meta".into(), "Google".into()],
            columns: vec![ResultColumn {
                field: "Address".into(),
                values: vec!["1 Hacker Way".into(), "1600 Amphitheatre Parkway".into()],
            }],
        };

        augment_csv(&input, "company", &table, &output).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            [
                "id,company,Address",
                "1,Meta,1 Hacker Way",
                "2,Google,1600 Amphitheatre Parkway",
                "3,Meta,1 Hacker Way",
                "4,Apple,",
            ]
        );
    }

    #[test]
    fn augmenting_in_place_keeps_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = String::from("id,company\n");
        for i in 0..2000 {
            let company = if i % 2 == 0 { "Meta" } else { "Google" };
            text.push_str(&format!("{i},{company}\n"));
        }
        let path = write(&dir, "companies.csv", &text);
        let table = ResultTable {
            subjects: vec!["Meta".into(), "Google".into()],
            columns: vec![ResultColumn {
                field: "Address".into(),
                values: vec!["1 Hacker Way".into(), "1600 Amphitheatre Parkway".into()],
            }],
        };

        augment_csv(&path, "company", &table, &path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2001);
        assert_eq!(lines[0], "id,company,Address");
        assert_eq!(lines[1], "0,Meta,1 Hacker Way");
        assert_eq!(lines[2000], "1999,Google,1600 Amphitheatre Parkway");
    }
}
