//! Candidate discovery.
//!
//! Walks the image tree lazily with `walkdir`, pruning excluded directories and
//! yielding the paths of `*.jpg`/`*.jpeg` files. Each path becomes a
//! [`Candidate`] only when the run controller is ready to process it, so the
//! stat snapshot is taken as late as possible and exactly once.

use std::{
    fs,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

use glob::{MatchOptions, Pattern, PatternError};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::marker::Timestamp;

/// File name patterns of the images the pipeline handles.
pub const IMAGE_PATTERNS: [&str; 2] = ["*.jpg", "*.jpeg"];

/// A file selected for evaluation, with the metadata captured at discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: Timestamp,
    pub uid: u32,
    pub gid: u32,
    /// Permission bits, including setuid/setgid/sticky.
    pub mode: u32,
}

impl Candidate {
    /// Stats `path` and freezes the result.
    pub fn capture<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            mtime: Timestamp::from_system_time(metadata.modified()?),
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode() & 0o7777,
        })
    }
}

/// Which files and directories the walk keeps.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    images: Vec<Pattern>,
    excludes: Vec<Pattern>,
    options: MatchOptions,
}

impl CandidateFilter {
    /// Builds a filter from directory exclusion patterns.
    ///
    /// With `ignore_case`, `PHOTO.JPG` is picked up as well.
    pub fn new<S: AsRef<str>>(excludes: &[S], ignore_case: bool) -> Result<Self, PatternError> {
        let images = IMAGE_PATTERNS
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let excludes = excludes
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            images,
            excludes,
            options: MatchOptions {
                case_sensitive: !ignore_case,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        })
    }

    pub fn is_image(&self, file_name: &str) -> bool {
        self.images
            .iter()
            .any(|p| p.matches_with(file_name, self.options))
    }

    /// Excluded directory names are always compared case-sensitively.
    pub fn is_excluded(&self, dir_name: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(dir_name))
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        entry
            .file_name()
            .to_str()
            .is_none_or(|name| !self.is_excluded(name))
    }

    fn is_candidate(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.is_image(name))
    }
}

/// Lazily lists the images under `root`.
///
/// Unreadable directories are logged and skipped; the walk carries on.
pub fn discover<'a>(
    root: &Path,
    filter: &'a CandidateFilter,
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| filter.keep_entry(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(move |entry| filter.is_candidate(entry))
        .map(DirEntry::into_path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn names(root: &Path, filter: &CandidateFilter) -> Vec<String> {
        let mut found: Vec<String> = discover(root, filter)
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        found.sort();
        found
    }

    #[test]
    fn test_image_patterns() {
        let filter = CandidateFilter::new::<&str>(&[], false).unwrap();
        assert!(filter.is_image("a.jpg"));
        assert!(filter.is_image("a.b.jpeg"));
        assert!(!filter.is_image("a.JPG"));
        assert!(!filter.is_image("a.png"));
        assert!(!filter.is_image("a.jpg.bak"));

        let filter = CandidateFilter::new::<&str>(&[], true).unwrap();
        assert!(filter.is_image("a.JPG"));
        assert!(filter.is_image("a.JpEg"));
    }

    #[test]
    fn test_discover_prunes_excluded_directories() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("b.jpeg"));
        touch(&root.join("notes.txt"));
        touch(&root.join("cache/c.jpg"));
        touch(&root.join("thumbs-2024/d.jpg"));
        touch(&root.join("gallery/e.jpg"));
        touch(&root.join("gallery/cache/f.jpg"));
        fs::create_dir_all(root.join("dir.jpg")).unwrap();

        let filter = CandidateFilter::new(&["cache", "thumbs-*"], false).unwrap();
        assert_eq!(
            names(root, &filter),
            vec!["a.jpg", "b.jpeg", "gallery/e.jpg"]
        );
    }

    #[test]
    fn test_discover_root_matching_exclude_is_still_walked() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("cache");
        touch(&root.join("a.jpg"));

        let filter = CandidateFilter::new(&["cache"], false).unwrap();
        assert_eq!(names(&root, &filter), vec!["a.jpg"]);
    }

    #[test]
    fn test_capture_snapshot() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("a.jpg");
        fs::write(&path, vec![0u8; 1234]).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let candidate = Candidate::capture(&path).unwrap();
        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(candidate.size, 1234);
        assert_eq!(candidate.mode, 0o640);
        assert_eq!(candidate.uid, metadata.uid());
        assert_eq!(candidate.gid, metadata.gid());
        assert_eq!(
            candidate.mtime,
            Timestamp::from_system_time(metadata.modified().unwrap())
        );

        assert!(Candidate::capture(temp_dir.path().join("gone.jpg")).is_err());
    }
}
