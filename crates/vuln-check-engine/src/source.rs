//! Criteria gathering for each source kind.

use std::path::Path;

use regex::Regex;
use vuln_check_host as host;
use vuln_check_policy::{FileContentSpec, FileNameSpec, PackageSpec, RawSpec};
use vuln_check_types::{Criterion, PackageEntry, VulnCheckError};

use crate::evr::{self, EvrOperation};

/// One criterion per installed package whose name matches. Names match the
/// `name` field exactly, or the `collectmatch` regex when present (for
/// packages like kernel images whose names embed a version). With
/// `onlynewest`, only the greatest version under EVR order survives.
pub(crate) fn package_criteria(
    spec: &PackageSpec,
    packages: &[PackageEntry],
) -> Result<Vec<Criterion>, VulnCheckError> {
    let mut matched: Vec<&PackageEntry> = match &spec.collect_match {
        Some(pattern) => {
            let re = compile(pattern)?;
            packages.iter().filter(|p| re.is_match(&p.name)).collect()
        }
        None => packages.iter().filter(|p| p.name == spec.name).collect(),
    };

    if spec.only_newest {
        matched = newest(&matched).into_iter().collect();
    }

    Ok(matched
        .into_iter()
        .map(|p| Criterion {
            identifier: p.name.clone(),
            test_value: p.version.clone(),
        })
        .collect())
}

/// Pick the entry with the greatest version. A candidate whose version does
/// not compare cleanly never displaces the incumbent.
fn newest<'a>(entries: &[&'a PackageEntry]) -> Option<&'a PackageEntry> {
    let mut best: Option<&'a PackageEntry> = None;
    for &entry in entries {
        match best {
            None => best = Some(entry),
            Some(cur) => {
                if let Ok(true) = evr::compare(EvrOperation::LessThan, &cur.version, &entry.version)
                {
                    best = Some(entry);
                }
            }
        }
    }
    best
}

/// Locate files under `path` whose basename matches `file`, scan
/// each line by line with `expression`, and emit criteria per captured
/// group (or per whole match when the pattern has no groups). With `concat`
/// set, all criteria collapse into one joined value.
pub(crate) fn filecontent_criteria(
    spec: &FileContentSpec,
    max_depth: usize,
) -> Result<Vec<Criterion>, VulnCheckError> {
    let name_re = compile(&spec.file)?;
    let content_re = compile(&spec.expression)?;

    let mut criteria = Vec::new();
    for path in host::locate_files(Path::new(&spec.path), &name_re, max_depth)? {
        // Files that disappear or cannot be read mid-scan are skipped.
        let Ok(rows) = host::match_file_content(&path, &content_re) else {
            continue;
        };
        let identifier = path.to_string_lossy().to_string();
        for row in rows {
            if row.len() > 1 {
                for group in &row[1..] {
                    criteria.push(Criterion {
                        identifier: identifier.clone(),
                        test_value: group.clone(),
                    });
                }
            } else if let Some(whole) = row.into_iter().next() {
                criteria.push(Criterion {
                    identifier: identifier.clone(),
                    test_value: whole,
                });
            }
        }
    }

    match &spec.concat {
        Some(sep) => Ok(criteria_concat(&criteria, sep)),
        None => Ok(criteria),
    }
}

/// One criterion per file whose basename matches `file`; the value is the
/// first capture group, so patterns without a matching group yield nothing.
pub(crate) fn filename_criteria(
    spec: &FileNameSpec,
    max_depth: usize,
) -> Result<Vec<Criterion>, VulnCheckError> {
    let name_re = compile(&spec.file)?;

    let mut criteria = Vec::new();
    for path in host::locate_files(Path::new(&spec.path), &name_re, max_depth)? {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        let Some(caps) = name_re.captures(&name) else {
            continue;
        };
        let Some(group) = caps.get(1) else {
            continue;
        };
        criteria.push(Criterion {
            identifier: path.to_string_lossy().to_string(),
            test_value: group.as_str().to_string(),
        });
    }

    Ok(criteria)
}

pub(crate) fn raw_criteria(spec: &RawSpec) -> Vec<Criterion> {
    spec.identifiers
        .iter()
        .map(|c| Criterion {
            identifier: c.identifier.clone(),
            test_value: c.value.clone(),
        })
        .collect()
}

/// Collapse criteria into a single synthesized criterion: the identifier is
/// `concat:` plus the comma-joined source identifiers, the value the source
/// values joined by `sep`. Empty input stays empty.
pub(crate) fn criteria_concat(input: &[Criterion], sep: &str) -> Vec<Criterion> {
    let Some((first, rest)) = input.split_first() else {
        return Vec::new();
    };

    let mut identifier = format!("concat:{}", first.identifier);
    let mut value = first.test_value.clone();
    for c in rest {
        identifier.push(',');
        identifier.push_str(&c.identifier);
        value.push_str(sep);
        value.push_str(&c.test_value);
    }

    vec![Criterion {
        identifier,
        test_value: value,
    }]
}

fn compile(pattern: &str) -> Result<Regex, VulnCheckError> {
    Regex::new(pattern)
        .map_err(|e| VulnCheckError::Preparation(format!("regexp \"{}\": {}", pattern, e)))
}
