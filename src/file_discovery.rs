//! Async recursive discovery of voucher files across the given roots.

use std::path::{Path, PathBuf};

use globset::{GlobSet, GlobSetBuilder};
use tokio::fs;

use crate::error::{AnalyzeError, Result};

/// Async file discovery with extension and include/exclude glob filters.
///
/// A root that cannot be read at all is a run-level error (the only fatal
/// path before dispatch); unreadable entries below a readable root are warned
/// about and skipped so one bad subtree never sinks the batch.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (lowercased, without the dot)
    extensions: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    /// Maximum directory depth (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_set: None,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Set file extensions to discover
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Add include patterns (glob syntax)
    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(patterns, "include")?;
        Ok(self)
    }

    /// Add exclude patterns (glob syntax)
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(patterns, "exclude")?;
        Ok(self)
    }

    /// Set maximum traversal depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Flatten all roots (files and/or directories, folders expanded
    /// recursively) into one list of candidate voucher paths.
    pub async fn discover_all(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for root in roots {
            files.extend(self.discover_files(root).await?);
        }
        Ok(files)
    }

    /// Discover files under a single root (file or directory).
    pub async fn discover_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(root).await.map_err(|e| AnalyzeError::Discovery {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        if metadata.is_file() {
            // Explicitly named files still go through the filters
            if self.should_process(root) {
                return Ok(vec![root.to_path_buf()]);
            }
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(root).await.map_err(|e| AnalyzeError::Discovery {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        while let Some(entry) = read_dir.next_entry().await.map_err(AnalyzeError::from)? {
            let entry_path = entry.path();
            if entry_path.is_symlink() && !self.follow_symlinks {
                continue;
            }
            if let Err(e) = self.discover_recursive(&entry_path, 0, &mut files).await {
                eprintln!("Warning: skipping {}: {}", entry_path.display(), e);
            }
        }

        Ok(files)
    }

    fn discover_recursive<'a>(
        &'a self,
        path: &'a Path,
        depth: usize,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(max_depth) = self.max_depth
                && depth > max_depth
            {
                return Ok(());
            }

            let metadata = fs::metadata(path).await.map_err(AnalyzeError::from)?;

            if metadata.is_file() {
                if self.should_process(path) {
                    files.push(path.to_path_buf());
                }
            } else if metadata.is_dir() {
                if let Some(max_depth) = self.max_depth
                    && depth >= max_depth
                {
                    return Ok(());
                }

                let mut read_dir = fs::read_dir(path).await.map_err(AnalyzeError::from)?;
                while let Some(entry) = read_dir.next_entry().await.map_err(AnalyzeError::from)? {
                    let entry_path = entry.path();
                    if entry_path.is_symlink() && !self.follow_symlinks {
                        continue;
                    }
                    if let Err(e) = self.discover_recursive(&entry_path, depth + 1, files).await {
                        eprintln!("Warning: skipping {}: {}", entry_path.display(), e);
                    }
                }
            }

            Ok(())
        })
    }

    /// Check extension and glob filters for one candidate file.
    pub fn should_process(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) if self.extensions.contains(&extension.to_lowercase()) => {}
            _ => return false,
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        if let Some(include_set) = &self.include_set {
            return include_set.is_match(path);
        }

        true
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn build_glob_set(patterns: Vec<String>, label: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                AnalyzeError::Config(format!("Invalid {} pattern '{}': {}", label, pattern, e))
            })?;
        builder.add(glob);
    }

    let set = builder
        .build()
        .map_err(|e| AnalyzeError::Config(format!("Failed to build {} glob set: {}", label, e)))?;
    Ok(Some(set))
}
