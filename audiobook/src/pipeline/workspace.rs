//! Per-run working directory.

use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::chapters::LocatedChapter;
use crate::text::TextChunk;

/// A fresh directory holding extracted text and assembly scratch files.
///
/// Removed by [`WorkDir::remove`], or on drop if that is never reached.
pub struct WorkDir {
    dir: TempDir,
    scratch: PathBuf,
}

impl WorkDir {
    /// Create a uniquely named directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let prefix = format!("audiobook-{}-", Local::now().format("%Y%m%d-%H%M%S"));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        fs::create_dir(dir.path().join("chunks"))?;
        let scratch = dir.path().join("audio");
        fs::create_dir(&scratch)?;

        log::debug!("Working directory: {}", dir.path().display());
        Ok(Self { dir, scratch })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory for the assembler's intermediate files.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Save the extracted chapter texts to `chapters.txt`.
    pub fn write_chapters(&self, chapters: &[LocatedChapter]) -> std::io::Result<()> {
        let mut file = fs::File::create(self.path().join("chapters.txt"))?;
        for chapter in chapters {
            writeln!(file, "=== Chapter {}: {} ===", chapter.number, chapter.title)?;
            writeln!(file, "{}", chapter.text)?;
            writeln!(file)?;
        }
        Ok(())
    }

    /// Save each chunk payload to `chunks/chunk_NNNN.txt`.
    pub fn write_chunks(&self, chunks: &[TextChunk]) -> std::io::Result<()> {
        let dir = self.path().join("chunks");
        for chunk in chunks {
            fs::write(dir.join(format!("chunk_{:04}.txt", chunk.index)), &chunk.text)?;
        }
        Ok(())
    }

    /// Delete the directory and everything in it.
    pub fn remove(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        log::debug!("Removed working directory {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_create_write_remove() {
        let root = TempDir::new().unwrap();
        let work = WorkDir::create(Some(root.path())).unwrap();

        let name = work.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("audiobook-"));
        assert!(work.scratch().is_dir());

        work.write_chapters(&[LocatedChapter {
            number: 2,
            title: "Chapter 2".to_string(),
            text: "Body".to_string(),
        }])
        .unwrap();
        work.write_chunks(&[TextChunk::new(0, 2, "Body", "Kore")]).unwrap();

        let chapters = fs::read_to_string(work.path().join("chapters.txt")).unwrap();
        assert!(chapters.contains("=== Chapter 2: Chapter 2 ==="));
        assert_eq!(
            fs::read_to_string(work.path().join("chunks/chunk_0000.txt")).unwrap(),
            "Body"
        );

        work.remove().unwrap();
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_directories_are_unique() {
        let root = TempDir::new().unwrap();
        let a = WorkDir::create(Some(root.path())).unwrap();
        let b = WorkDir::create(Some(root.path())).unwrap();
        assert_ne!(a.path(), b.path());
        drop(a);
        drop(b);
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_creates_missing_root() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("nested/work");
        let work = WorkDir::create(Some(&root)).unwrap();
        assert!(work.path().starts_with(&root));
    }
}
