// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use lithos_stencil_engine::{Error, Loader};

/// Loads templates from one or more directories, searched in order.
///
/// Names are relative paths below a search directory; absolute names and
/// names containing `..` are rejected so templates cannot reach outside the
/// configured directories.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    search_paths: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![path.into()],
        }
    }

    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

fn is_contained(name: &Path) -> bool {
    name.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<String, Error> {
        let relative = Path::new(name);
        if name.is_empty() || !is_contained(relative) {
            return Err(Error::not_found_with_source(
                name,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "template name escapes the search paths",
                ),
            ));
        }

        for root in &self.search_paths {
            let candidate = root.join(relative);
            tracing::trace!(path = %candidate.display(), "trying template path");
            match fs::read_to_string(&candidate) {
                Ok(source) => return Ok(source),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::not_found_with_source(name, err)),
            }
        }
        Err(Error::not_found(name))
    }
}
