use std::path::Path;

use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::error::Result;

/// Write `rows` as a delimited table with a header row.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Print the first `max_rows` rows of a table as markdown.
pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    if rows.is_empty() || max_rows == 0 {
        println!("(no rows)\n");
        return;
    }
    let preview: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    let table_str = Table::new(preview)
        .with(Style::markdown())
        .to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyEntry;

    #[test]
    fn csv_has_header_and_empty_cells_for_nulls() {
        #[derive(Serialize)]
        struct Row {
            id: u32,
            value: Option<f64>,
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        write_csv(&path, &[Row { id: 1, value: Some(2.5) }, Row { id: 2, value: None }]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,value\n1,2.5\n2,\n");
    }

    #[test]
    fn json_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        write_json(&path, &KeyEntry { id: 1, value: "Kenya".into() }).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"id\": 1"));
    }
}
