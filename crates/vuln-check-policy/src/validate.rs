//! Structural validation of policy documents.
//!
//! Validation runs once after load and aborts analysis on failure. It covers
//! reference integrity (object and test lookups), per-source required
//! fields, modifier selectors, and cycle detection over the union of `if`
//! edges and modifier source edges.

use std::collections::HashMap;

use crate::{Document, SourceKind, Test};

/// Validate a document for consistency beyond JSON syntax.
pub fn validate(doc: &Document) -> anyhow::Result<()> {
    let mut object_names: HashMap<&str, usize> = HashMap::new();
    for obj in &doc.objects {
        if obj.name.is_empty() {
            anyhow::bail!("an object in the document has no name");
        }
        if object_names.insert(&obj.name, 1).is_some() {
            anyhow::bail!("duplicate object \"{}\"", obj.name);
        }
        validate_source(obj.name.as_str(), obj.source()?)?;
    }

    let mut test_ids: HashMap<&str, usize> = HashMap::new();
    for (i, t) in doc.tests.iter().enumerate() {
        if t.identifier.is_empty() {
            anyhow::bail!("a test in the document has no identifier");
        }
        if test_ids.insert(&t.identifier, i).is_some() {
            anyhow::bail!("duplicate test \"{}\"", t.identifier);
        }
    }

    for t in &doc.tests {
        validate_test(doc, &test_ids, t)?;
    }

    detect_cycles(doc, &test_ids)?;

    Ok(())
}

fn validate_source(name: &str, source: SourceKind<'_>) -> anyhow::Result<()> {
    match source {
        SourceKind::Package(p) => {
            if p.name.is_empty() {
                anyhow::bail!("object \"{}\": package must specify name", name);
            }
        }
        SourceKind::FileContent(f) => {
            if f.path.is_empty() || f.file.is_empty() || f.expression.is_empty() {
                anyhow::bail!(
                    "object \"{}\": filecontent must specify path, file and expression",
                    name
                );
            }
        }
        SourceKind::FileName(f) => {
            if f.path.is_empty() || f.file.is_empty() {
                anyhow::bail!("object \"{}\": filename must specify path and file", name);
            }
        }
        SourceKind::Raw(r) => {
            if r.identifiers.is_empty() {
                anyhow::bail!("object \"{}\": raw must list identifiers", name);
            }
            if r.identifiers.iter().any(|c| c.identifier.is_empty()) {
                anyhow::bail!("object \"{}\": raw identifier must not be empty", name);
            }
        }
    }
    Ok(())
}

fn validate_test(
    doc: &Document,
    test_ids: &HashMap<&str, usize>,
    t: &Test,
) -> anyhow::Result<()> {
    match (&t.object, &t.concat) {
        (Some(obj), None) => {
            if doc.get_object(obj).is_none() {
                anyhow::bail!("{}: unknown object \"{}\"", t.identifier, obj);
            }
        }
        (None, Some(concat)) => {
            if concat.operator.is_empty() {
                anyhow::bail!("{}: must specify concat operator", t.identifier);
            }
            for src in &concat.sources {
                if !test_ids.contains_key(src.identifier.as_str()) {
                    anyhow::bail!(
                        "{}: unknown modifier source \"{}\"",
                        t.identifier,
                        src.identifier
                    );
                }
                if src.select != "all" {
                    anyhow::bail!(
                        "{}: modifier source \"{}\" has invalid selector \"{}\"",
                        t.identifier,
                        src.identifier,
                        src.select
                    );
                }
            }
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("{}: test has both an object and a modifier", t.identifier)
        }
        (None, None) => anyhow::bail!("{}: no valid source interface", t.identifier),
    }

    if t.evr.is_some() && t.regexp.is_some() {
        anyhow::bail!("{}: more than one evaluator specified", t.identifier);
    }

    for dep in &t.depends {
        if !test_ids.contains_key(dep.as_str()) {
            anyhow::bail!("{}: unknown test \"{}\"", t.identifier, dep);
        }
        if dep == &t.identifier {
            anyhow::bail!("{}: test cannot reference itself", t.identifier);
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Reject cycles in the combined `if` / modifier-source graph. The engine
/// evaluates this graph depth-first; a cycle would otherwise recurse until
/// stack exhaustion.
fn detect_cycles(doc: &Document, test_ids: &HashMap<&str, usize>) -> anyhow::Result<()> {
    let mut colors = vec![Color::White; doc.tests.len()];
    for i in 0..doc.tests.len() {
        if colors[i] == Color::White {
            visit(doc, test_ids, i, &mut colors)?;
        }
    }
    Ok(())
}

fn visit(
    doc: &Document,
    test_ids: &HashMap<&str, usize>,
    idx: usize,
    colors: &mut [Color],
) -> anyhow::Result<()> {
    colors[idx] = Color::Gray;
    let t = &doc.tests[idx];

    let deps = t.depends.iter().map(|d| d.as_str());
    let sources = t
        .concat
        .iter()
        .flat_map(|c| c.sources.iter().map(|s| s.identifier.as_str()));

    for next in deps.chain(sources) {
        // Unknown identifiers were already rejected above.
        let Some(&ni) = test_ids.get(next) else {
            continue;
        };
        match colors[ni] {
            Color::Gray => anyhow::bail!(
                "dependency cycle involving \"{}\" and \"{}\"",
                t.identifier,
                next
            ),
            Color::White => visit(doc, test_ids, ni, colors)?,
            Color::Black => {}
        }
    }

    colors[idx] = Color::Black;
    Ok(())
}
