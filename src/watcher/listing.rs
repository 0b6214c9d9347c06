use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Suffixes browsers give to downloads that are still being written.
pub const DEFAULT_PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub modified: SystemTime,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            modified,
        }
    }
}

/// Source of directory listings. Each call is a fresh view of the directory.
pub trait DirectoryLister {
    fn list(&self) -> io::Result<Vec<FileEntry>>;
}

/// Lists regular files of a directory on disk.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DirectoryLister for FsDirectory {
    fn list(&self) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            // A partial download can be renamed between read_dir and stat
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(FileEntry { name, modified });
        }
        Ok(entries)
    }
}

/// Names currently present, used as the baseline of an export job.
pub fn snapshot<L: DirectoryLister + ?Sized>(lister: &L) -> io::Result<HashSet<String>> {
    Ok(lister.list()?.into_iter().map(|e| e.name).collect())
}

/// Decides which new files count as finished downloads.
#[derive(Debug, Clone)]
pub struct WatchRules {
    pub valid_suffix: String,
    pub partial_suffixes: Vec<String>,
    pub name_pattern: Option<Regex>,
}

impl WatchRules {
    pub fn new(valid_suffix: impl Into<String>) -> Self {
        Self {
            valid_suffix: valid_suffix.into(),
            partial_suffixes: DEFAULT_PARTIAL_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            name_pattern: None,
        }
    }

    pub fn with_partial_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.partial_suffixes = suffixes;
        self
    }

    pub fn with_name_pattern(mut self, pattern: Regex) -> Self {
        self.name_pattern = Some(pattern);
        self
    }

    pub fn is_partial(&self, name: &str) -> bool {
        self.partial_suffixes.iter().any(|s| ends_with_ignore_case(name, s))
    }

    pub fn is_complete(&self, name: &str) -> bool {
        !self.is_partial(name)
            && ends_with_ignore_case(name, &self.valid_suffix)
            && self.name_pattern.as_ref().map_or(true, |re| re.is_match(name))
    }
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// New files of one tick, split into finished and not-yet-finished.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Candidates {
    pub complete: Vec<FileEntry>,
    pub pending: Vec<String>,
}

impl Candidates {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .complete
            .iter()
            .map(|e| e.name.clone())
            .chain(self.pending.iter().cloned())
            .collect();
        names.sort();
        names
    }
}

/// `listing - baseline`, classified with `rules`. Holds no state between ticks.
pub fn classify(listing: &[FileEntry], baseline: &HashSet<String>, rules: &WatchRules) -> Candidates {
    let mut candidates = Candidates::default();
    for entry in listing.iter().filter(|e| !baseline.contains(&e.name)) {
        if rules.is_complete(&entry.name) {
            candidates.complete.push(entry.clone());
        } else {
            candidates.pending.push(entry.name.clone());
        }
    }
    candidates
}

/// Outcome of choosing among finished downloads.
#[derive(Debug, PartialEq, Eq)]
pub enum Pick<'a> {
    Nothing,
    Latest(&'a FileEntry),
    Tied(Vec<&'a FileEntry>),
}

/// Chooses the most recently modified entry. Entries sharing the latest
/// time are reported as `Tied` when `strict`, otherwise the greatest name wins.
pub fn pick_latest(complete: &[FileEntry], strict: bool) -> Pick<'_> {
    let Some(latest) = complete.iter().map(|e| e.modified).max() else {
        return Pick::Nothing;
    };
    let mut newest: Vec<&FileEntry> = complete.iter().filter(|e| e.modified == latest).collect();
    newest.sort_by(|a, b| a.name.cmp(&b.name));

    match newest.len() {
        1 => Pick::Latest(newest[0]),
        _ if strict => Pick::Tied(newest),
        _ => Pick::Latest(newest[newest.len() - 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn baseline(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn classify_excludes_baseline_and_splits_partials() {
        let rules = WatchRules::new(".xlsx");
        let listing = vec![
            FileEntry::new("old.xlsx", at(1)),
            FileEntry::new("rate_all.xlsx.crdownload", at(2)),
            FileEntry::new("notes.txt", at(2)),
            FileEntry::new("rate_all.xlsx", at(3)),
        ];

        let c = classify(&listing, &baseline(&["old.xlsx"]), &rules);

        assert_eq!(c.complete, vec![FileEntry::new("rate_all.xlsx", at(3))]);
        assert_eq!(c.pending, vec!["rate_all.xlsx.crdownload", "notes.txt"]);
    }

    #[test]
    fn suffix_match_ignores_case() {
        let rules = WatchRules::new(".xlsx");
        assert!(rules.is_complete("Report.XLSX"));
        assert!(!rules.is_complete("Report.xlsx.CRDOWNLOAD"));
        assert!(!rules.is_complete("x"));
    }

    #[test]
    fn name_pattern_narrows_accepted_files() {
        let rules = WatchRules::new(".xlsx").with_name_pattern(Regex::new(r"^rate_all_").unwrap());
        assert!(rules.is_complete("rate_all_2024-05-01.xlsx"));
        assert!(!rules.is_complete("other.xlsx"));
    }

    #[test]
    fn pick_prefers_latest_mtime() {
        let complete = vec![FileEntry::new("a.xlsx", at(5)), FileEntry::new("b.xlsx", at(9))];
        assert_eq!(pick_latest(&complete, false), Pick::Latest(&complete[1]));
        assert_eq!(pick_latest(&[], false), Pick::Nothing);
    }

    #[test]
    fn exact_ties_are_ambiguous_only_when_strict() {
        let complete = vec![FileEntry::new("b.xlsx", at(5)), FileEntry::new("a.xlsx", at(5))];
        assert_eq!(pick_latest(&complete, false), Pick::Latest(&complete[0]));
        assert_eq!(
            pick_latest(&complete, true),
            Pick::Tied(vec![&complete[1], &complete[0]])
        );
    }

    #[test]
    fn fs_directory_lists_only_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = snapshot(&FsDirectory::new(dir.path())).unwrap();
        assert_eq!(names, baseline(&["a.xlsx"]));
    }
}
