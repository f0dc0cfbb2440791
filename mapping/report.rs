// ========================================================================================
//                               Matrix output
// ========================================================================================
//
// Writes a finished reaction activity matrix as a tab-separated file. The mapper
// itself never touches the filesystem; this is used by the command-line driver only.
//
// The file is written to a temporary sibling and renamed into place, so a reader
// either sees the complete table or no file at all. Existing files are never
// overwritten.

use crate::types::ReactionActivityMatrix;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(
        "Output file '{0}' already exists. rxnmap will not overwrite it. Please remove it or choose another output path."
    )]
    OutputExists(PathBuf),
    #[error("Failed to write output file: {0}")]
    Io(#[from] io::Error),
}

/// Writes `matrix` to `path` as TSV: a `#REACTION` header followed by the sample
/// ids, then one line per reaction.
pub fn write_matrix_tsv(path: &Path, matrix: &ReactionActivityMatrix) -> Result<(), ReportError> {
    if path.exists() {
        return Err(ReportError::OutputExists(path.to_path_buf()));
    }

    let (temp_path, temp_file) = create_temp_sibling(path)?;
    let write_result = write_rows(temp_file, matrix);
    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })?;
    Ok(())
}

fn create_temp_sibling(path: &Path) -> io::Result<(PathBuf, File)> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rxnmap_results".to_string());
    let pid = process::id();

    for attempt in 0..16u32 {
        let candidate = path.with_file_name(format!(".{file_name}.{pid}.{attempt}.tmp"));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "Failed to allocate a unique temporary output file next to '{}'.",
            path.display()
        ),
    ))
}

fn write_rows(file: File, matrix: &ReactionActivityMatrix) -> io::Result<()> {
    let mut writer = BufWriter::new(file);

    write!(writer, "#REACTION")?;
    for sample in matrix.sample_ids() {
        write!(writer, "\t{sample}")?;
    }
    writeln!(writer)?;

    let values = matrix.values();
    let mut line_buffer = String::with_capacity(64 + matrix.n_samples() * 24);
    let mut ryu_buffer = ryu::Buffer::new();

    for (reaction, row) in matrix.reaction_ids().iter().zip(values.rows()) {
        line_buffer.clear();
        line_buffer.push_str(reaction);
        for &value in row {
            line_buffer.push('\t');
            line_buffer.push_str(ryu_buffer.format(value));
        }
        writeln!(writer, "{line_buffer}")?;
    }

    writer.flush()?;
    let file = writer.into_inner().map_err(io::Error::other)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn matrix() -> ReactionActivityMatrix {
        ReactionActivityMatrix::from_columns(
            vec!["r1".into(), "r2".into()],
            vec!["s1".into(), "s2".into()],
            &[vec![2.0, 6.0], vec![0.0, 7.25]],
        )
    }

    #[test]
    fn writes_header_and_rows_in_matrix_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.rxn.tsv");
        write_matrix_tsv(&path, &matrix()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["#REACTION\ts1\ts2", "r1\t2.0\t0.0", "r2\t6.0\t7.25"]);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn refuses_to_overwrite_existing_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.rxn.tsv");
        fs::write(&path, "keep me").unwrap();

        let err = write_matrix_tsv(&path, &matrix()).unwrap_err();
        assert!(matches!(err, ReportError::OutputExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }
}
