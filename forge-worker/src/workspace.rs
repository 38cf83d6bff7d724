//! Local working set
//!
//! A scoped temporary directory holding one task's input and output
//! artifacts. The directory is removed when the working set is released or
//! dropped, so every exit path of a pipeline (success, error, panic) cleans
//! up before the next poll.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Extension used for the produced artifact
const OUTPUT_EXTENSION: &str = "mp4";

/// Temporary directory owned by exactly one pipeline execution
#[derive(Debug)]
pub struct WorkingSet {
    dir: TempDir,
    file_stem: String,
}

impl WorkingSet {
    /// Creates a fresh directory for `task_id` under `base`
    pub fn create(base: &Path, task_id: &str) -> io::Result<Self> {
        std::fs::create_dir_all(base)?;
        let file_stem = sanitize(task_id);
        let dir = tempfile::Builder::new()
            .prefix(&format!("forge-{}-", file_stem))
            .tempdir_in(base)?;
        Ok(Self { dir, file_stem })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the input artifact is downloaded to
    ///
    /// Keeps the extension of the remote artifact so the compute routine can
    /// recognize the format.
    pub fn input_path(&self, source_reference: &str) -> PathBuf {
        let extension = Path::new(source_reference)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(sanitize)
            .filter(|ext| !ext.is_empty());

        let name = match extension {
            Some(ext) => format!("{}_input.{}", self.file_stem, ext),
            None => format!("{}_input", self.file_stem),
        };
        self.dir.path().join(name)
    }

    /// Where the compute routine writes the output artifact
    pub fn output_path(&self) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}_output.{}", self.file_stem, OUTPUT_EXTENSION))
    }

    /// Removes the directory and everything in it
    pub fn release(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Restricts a remote identifier to characters safe in a file name
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_inside_working_set() {
        let base = TempDir::new().unwrap();
        let ws = WorkingSet::create(base.path(), "item-1").unwrap();

        let input = ws.input_path("uploads/group/photo.JPG");
        assert_eq!(input.parent(), Some(ws.path()));
        assert_eq!(input.file_name().unwrap(), "item-1_input.JPG");
        assert_eq!(ws.output_path().file_name().unwrap(), "item-1_output.mp4");
        assert_eq!(
            ws.input_path("uploads/noext").file_name().unwrap(),
            "item-1_input"
        );
    }

    #[test]
    fn test_hostile_task_id_stays_inside_base() {
        let base = TempDir::new().unwrap();
        let ws = WorkingSet::create(base.path(), "../../etc/passwd").unwrap();

        assert!(ws.path().starts_with(base.path()));
        assert!(ws.output_path().starts_with(ws.path()));
    }

    #[test]
    fn test_release_removes_directory() {
        let base = TempDir::new().unwrap();
        let ws = WorkingSet::create(base.path(), "item-1").unwrap();
        std::fs::write(ws.output_path(), b"video").unwrap();
        let path = ws.path().to_path_buf();

        ws.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let base = TempDir::new().unwrap();
        let path = {
            let ws = WorkingSet::create(base.path(), "item-2").unwrap();
            std::fs::write(ws.input_path("a.png"), b"png").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_create_makes_missing_base() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("forge").join("work");
        let ws = WorkingSet::create(&nested, "item-3").unwrap();
        assert!(ws.path().starts_with(&nested));
    }
}
