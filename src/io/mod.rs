//! Plain-text tuple files and shard discovery.

use crate::core::{JoinError, NodeId, Relation, Result, Row};
use log::debug;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Parses `<join_val> <row_id>` lines into rows of `relation`.
///
/// `origin` names the source in error messages.
pub fn parse_tuples(source: &str, relation: Relation, origin: &str) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(key), Some(id), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(JoinError::Parse(format!(
                "{}:{}: expected '<join_val> <row_id>', got '{}'",
                origin,
                line_no + 1,
                line
            )));
        };
        let parse = |field: &str, what: &str| {
            field.parse::<u32>().map_err(|_| {
                JoinError::Parse(format!(
                    "{}:{}: invalid {} '{}'",
                    origin,
                    line_no + 1,
                    what,
                    field
                ))
            })
        };
        rows.push(Row::input(relation, parse(key, "join_val")?, parse(id, "row_id")?));
    }
    Ok(rows)
}

pub fn read_tuples(path: impl AsRef<Path>, relation: Relation) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .map_err(|err| JoinError::Io(format!("cannot read '{}': {}", path.display(), err)))?;
    let rows = parse_tuples(&source, relation, &path.display().to_string())?;
    debug!("read {} {} rows from {}", rows.len(), relation, path.display());
    Ok(rows)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir)
        .map_err(|err| JoinError::Io(format!("cannot list '{}': {}", dir.display(), err)))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// The shard of `node_id`: the first file whose name starts with the 1-based
/// node number not followed by another digit (`2_R.txt` is node 1, `12_R.txt`
/// is not).
pub fn find_shard(files: &[PathBuf], node_id: NodeId) -> Option<&PathBuf> {
    let prefix = (node_id + 1).to_string();
    files.iter().find(|path| {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        name.strip_prefix(&prefix)
            .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
    })
}

/// Resolves one shard per node in `dir`.
///
/// Fails with [`JoinError::Config`] when any node has no shard, before any
/// data is read.
pub fn shard_paths(dir: impl AsRef<Path>, node_count: usize) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let files = list_files(dir)?;
    (0..node_count)
        .map(|node_id| {
            find_shard(&files, node_id).cloned().ok_or_else(|| {
                JoinError::Config(format!(
                    "no shard for node {} (prefix '{}') in '{}': {} files for {} nodes",
                    node_id,
                    node_id + 1,
                    dir.display(),
                    files.len(),
                    node_count
                ))
            })
        })
        .collect()
}

/// Writes `join_val source_id_r source_id_s` lines.
pub fn write_rows(path: impl AsRef<Path>, rows: &[Row]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    for row in rows {
        writeln!(out, "{}", row)?;
    }
    out.flush()?;
    Ok(())
}
