use crate::config::ConfigErrors;
use globset::GlobMatcher;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use std::{collections::VecDeque, path::Path, path::PathBuf};
use tracing::{debug, error, warn};

#[derive(Debug)]
/// Regular files found directly inside an input directory, in sorted order
pub struct Collector {
    paths: VecDeque<PathBuf>,
}

impl Collector {
    /// collect all regular files directly under `dir`, subdirectories are not descended into
    pub fn load(dir: &Path, glob: Option<&GlobMatcher>) -> Result<Self, ConfigErrors> {
        if !dir.is_dir() {
            error!(path = ?dir, "Input directory not found");

            return Err(ConfigErrors::FileNotFound);
        }

        if let Some(glob) = glob {
            debug!("Filtering with glob: {}", glob.glob());
        }

        let paths = WalkBuilder::new(dir)
            .max_depth(Some(1))
            .standard_filters(false)
            .follow_links(true)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Failed to search for input files: {e}");
                    None
                }
            })
            .filter(|entry| entry.depth() == 1 && entry.path().is_file())
            .filter(|entry| {
                glob.map_or(true, |glob| {
                    entry
                        .path()
                        .file_name()
                        .map_or(false, |name| glob.is_match(name))
                })
            })
            .map(DirEntry::into_path)
            .sorted()
            .collect();

        Ok(Self { paths })
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// combined size of all remaining files in bytes, unreadable files are skipped
    pub fn total_size(&self) -> u64 {
        self.paths
            .iter()
            .filter_map(|path| match path.metadata() {
                Ok(metadata) => Some(metadata.len()),
                Err(error) => {
                    warn!(path = ?path, "Failed to read metadata: {error}");
                    None
                }
            })
            .sum()
    }
}

impl Iterator for Collector {
    type Item = PathBuf;

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.paths.len(), Some(self.paths.len()))
    }

    fn next(&mut self) -> Option<Self::Item> {
        self.paths.pop_front()
    }
}

impl ExactSizeIterator for Collector {}
