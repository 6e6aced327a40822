//! Filesystem facts: a bounded-depth file locator and a line-oriented
//! content matcher.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex::Regex;
use vuln_check_types::VulnCheckError;

/// Default recursion bound for the locator.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Walk `root` up to `max_depth` levels and return every regular file whose
/// basename matches `name_pattern`, in a deterministic order.
///
/// An unreadable root is an error; unreadable subdirectories are skipped
/// silently. Symlinks are not followed.
pub fn locate_files(
    root: &Path,
    name_pattern: &Regex,
    max_depth: usize,
) -> Result<Vec<PathBuf>, VulnCheckError> {
    let mut matches = Vec::new();
    let entries = read_dir_sorted(root)
        .map_err(|e| VulnCheckError::Preparation(format!("read {}: {}", root.display(), e)))?;
    walk(entries, name_pattern, max_depth, 1, &mut matches);
    Ok(matches)
}

fn walk(
    entries: Vec<fs::DirEntry>,
    name_pattern: &Regex,
    max_depth: usize,
    depth: usize,
    matches: &mut Vec<PathBuf>,
) {
    if depth > max_depth {
        return;
    }
    for entry in entries {
        let Ok(ftype) = entry.file_type() else {
            continue;
        };
        if ftype.is_dir() {
            if let Ok(sub) = read_dir_sorted(&entry.path()) {
                walk(sub, name_pattern, max_depth, depth + 1, matches);
            }
        } else if ftype.is_file() {
            let name = entry.file_name();
            if name_pattern.is_match(&name.to_string_lossy()) {
                matches.push(entry.path());
            }
        }
    }
}

fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Scan `path` line by line with `re` and return one row per matching line:
/// element 0 is the whole match, subsequent elements the capture groups.
///
/// Lines are decoded as lossy UTF-8 so binary junk in a scanned file does
/// not abort the match.
pub fn match_file_content(path: &Path, re: &Regex) -> Result<Vec<Vec<String>>, VulnCheckError> {
    let fd = fs::File::open(path)
        .map_err(|e| VulnCheckError::Preparation(format!("open {}: {}", path.display(), e)))?;
    let mut rdr = BufReader::new(fd);
    let mut ret = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = rdr
            .read_until(b'\n', &mut buf)
            .map_err(|e| VulnCheckError::Io(format!("read {}: {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(caps) = re.captures(&line) {
            let mut row = Vec::with_capacity(caps.len());
            row.push(caps.get(0).map_or("", |m| m.as_str()).to_string());
            for i in 1..caps.len() {
                row.push(caps.get(i).map_or("", |m| m.as_str()).to_string());
            }
            ret.push(row);
        }
    }

    Ok(ret)
}
