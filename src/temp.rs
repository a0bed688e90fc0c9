use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::TempDir;

use crate::error::Result;

/// Scratch directory for intermediate files of one run. Removed on drop
/// unless the run asked to keep intermediates.
#[derive(Debug)]
pub struct TempFolder {
	dir: Option<TempDir>,
	path: PathBuf,
	keep: bool,
}

impl TempFolder {
	/// Creates `{base}/.tmp-{run_id}-XXXXXX`, with `base` the output folder
	/// or the system temp directory.
	pub fn create(output: &Path, run_id: &str, use_system_temp: bool, keep: bool) -> Result<TempFolder> {
		let base = if use_system_temp {
			std::env::temp_dir()
		} else {
			fs::create_dir_all(output)?;
			output.to_path_buf()
		};
		let dir = tempfile::Builder::new()
			.prefix(&format!(".tmp-{}-", run_id))
			.tempdir_in(base)?;
		let path = dir.path().to_path_buf();
		Ok(TempFolder {
			dir: Some(dir),
			path,
			keep,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Creates and returns a named subfolder.
	pub fn subfolder(&self, name: &str) -> Result<PathBuf> {
		let path = self.path.join(name);
		fs::create_dir_all(&path)?;
		Ok(path)
	}
}

impl Drop for TempFolder {
	fn drop(&mut self) {
		let dir = match self.dir.take() {
			Some(dir) => dir,
			None => return,
		};
		if self.keep {
			info!("Keeping intermediate files in {}", dir.keep().display());
			return;
		}
		if let Err(err) = dir.close() {
			warn!("Could not remove {}: {}", self.path.display(), err);
		}
	}
}
