//! Per-run staging directories.
//!
//! Every test case gets an exclusive subdirectory of one run-scoped temp dir,
//! with a nested directory for pre-instrumented artifacts. No two cases share
//! mutable filesystem state.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory a case's instrumented artifacts are written to and run from.
pub const INSTRUMENTED_DIR: &str = "instrumented";

/// The run-scoped staging root. Dropping it removes everything.
#[derive(Debug)]
pub struct StagingArea {
    root: tempfile::TempDir,
}

/// A case's exclusive directories inside the staging area.
#[derive(Debug, Clone)]
pub struct CaseDirs {
    pub dir: PathBuf,
    pub instrumented: PathBuf,
}

impl StagingArea {
    pub fn new() -> anyhow::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("divergate-")
            .tempdir()
            .context("create staging root")?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Create (or reuse) the exclusive directories for one named case.
    pub fn case_dirs(&self, name: &str) -> anyhow::Result<CaseDirs> {
        let dir = self.root.path().join(name);
        let instrumented = dir.join(INSTRUMENTED_DIR);
        fs::create_dir_all(&instrumented)
            .with_context(|| format!("create staging directory for {name:?}"))?;
        Ok(CaseDirs { dir, instrumented })
    }
}

/// Copy a fixture into a staging directory, keeping its file name.
pub fn stage_file(source: &Path, into: &Path) -> anyhow::Result<PathBuf> {
    let file_name = source
        .file_name()
        .with_context(|| format!("not a file path: {}", source.display()))?;
    let dest = into.join(file_name);
    fs::copy(source, &dest)
        .with_context(|| format!("copy {} into {}", source.display(), into.display()))?;
    Ok(dest)
}

/// Compiled class artifacts for a program, in stable order.
///
/// Matches `<program>*.class` so inner classes (`Foo$Bar.class`) are included.
pub fn compiled_classes(dir: &Path, program: &str) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("{program}*.class"));
    let pattern = pattern.to_string_lossy();
    let mut found = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        found.push(entry.context("read staging directory entry")?);
    }
    found.sort();
    Ok(found)
}
