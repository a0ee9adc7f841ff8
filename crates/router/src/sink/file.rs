// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed sink: one append-only file per destination

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ust_core::DestinationId;

use super::{Sink, SinkError};

/// How destinations map onto files under the dump directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkLayout {
    /// `<dir>/<category>`
    #[default]
    Category,
    /// `<dir>/<group>/<node>/<category>`
    Grouped,
}

/// Writes each destination to its own file through a buffered writer
pub struct FileSink {
    dir: PathBuf,
    layout: SinkLayout,
    writers: DashMap<PathBuf, Mutex<BufWriter<File>>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, layout: SinkLayout) -> Self {
        Self {
            dir: dir.into(),
            layout,
            writers: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that receives `destination`'s records
    pub fn path_for(&self, destination: &DestinationId) -> Result<PathBuf, SinkError> {
        let components: &[&str] = match self.layout {
            SinkLayout::Category => &[destination.category()],
            SinkLayout::Grouped => &[
                destination.group_name(),
                destination.node_name(),
                destination.category(),
            ],
        };
        let mut path = self.dir.clone();
        for component in components {
            if !is_file_name(component) {
                return Err(SinkError::InvalidDestination(destination.clone()));
            }
            path.push(component);
        }
        Ok(path)
    }

    fn open(path: &Path) -> Result<BufWriter<File>, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        Ok(BufWriter::new(file))
    }
}

fn is_file_name(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\', '\0'])
}

impl Sink for FileSink {
    fn append(&self, destination: &DestinationId, data: &[u8]) -> Result<(), SinkError> {
        let path = self.path_for(destination)?;
        if !self.writers.contains_key(&path) {
            let writer = Self::open(&path)?;
            self.writers
                .entry(path.clone())
                .or_insert_with(|| Mutex::new(writer));
        }
        let entry = self
            .writers
            .get(&path)
            .ok_or_else(|| SinkError::Unavailable(format!("writer for {} vanished", path.display())))?;
        let mut writer = entry.lock().unwrap_or_else(|e| e.into_inner());
        writer
            .write_all(data)
            .map_err(|source| SinkError::Io { path, source })
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut first_error = None;
        for entry in self.writers.iter() {
            let mut writer = entry.value().lock().unwrap_or_else(|e| e.into_inner());
            if let Err(source) = writer.flush() {
                tracing::error!(path = %entry.key().display(), error = %source, "sink flush failed");
                first_error.get_or_insert(SinkError::Io {
                    path: entry.key().clone(),
                    source,
                });
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
