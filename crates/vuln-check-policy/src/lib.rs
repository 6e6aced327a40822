//! Policy document model and JSON wiring.
//!
//! A policy document is the declarative input: an ordered list of variables,
//! a set of named objects (fact sources), and a set of tests that pair an
//! object (or a concat modifier) with an evaluator and optional `if`
//! dependencies. This crate owns the serde model, loading, structural
//! validation, and variable expansion; it performs no host IO.

pub mod validate;

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vuln_check_types::Tag;

pub use validate::validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<Object>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<Test>,
}

/// A key/value pair used for lexical `${key}` substitution in source fields.
/// Read-only after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variable {
    pub key: String,
    pub value: String,
}

/// A named, reusable fact source. Exactly one source kind is populated;
/// `source()` enforces this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "object")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filecontent: Option<FileContentSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<FileNameSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawSpec>,
}

/// A borrowed view of the one populated source kind of an [`Object`].
#[derive(Debug, Clone, Copy)]
pub enum SourceKind<'a> {
    Package(&'a PackageSpec),
    FileContent(&'a FileContentSpec),
    FileName(&'a FileNameSpec),
    Raw(&'a RawSpec),
}

impl Object {
    /// Returns the populated source kind. Errors unless exactly one of the
    /// source fields is set.
    pub fn source(&self) -> anyhow::Result<SourceKind<'_>> {
        let mut found: Vec<SourceKind<'_>> = Vec::new();
        if let Some(p) = &self.package {
            found.push(SourceKind::Package(p));
        }
        if let Some(f) = &self.filecontent {
            found.push(SourceKind::FileContent(f));
        }
        if let Some(f) = &self.filename {
            found.push(SourceKind::FileName(f));
        }
        if let Some(r) = &self.raw {
            found.push(SourceKind::Raw(r));
        }
        match found.len() {
            0 => anyhow::bail!("object \"{}\" has no source", self.name),
            1 => Ok(found[0]),
            _ => anyhow::bail!("object \"{}\" has more than one source", self.name),
        }
    }
}

/// Package source. Installed packages match `name` exactly, or the
/// `collectmatch` regex when present. The regex form exists for packages
/// whose names embed a version (kernel images), where a direct name
/// comparison cannot work; the regex is compiled at preparation time, so a
/// bad pattern stays local to the owning object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default, rename = "onlynewest")]
    pub only_newest: bool,
    #[serde(default, rename = "collectmatch", skip_serializing_if = "Option::is_none")]
    pub collect_match: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContentSpec {
    pub path: String,
    pub file: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileNameSpec {
    pub path: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSpec {
    pub identifiers: Vec<RawCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawCriterion {
    pub identifier: String,
    pub value: String,
}

/// A named unit of evaluation. Carries either an `object` reference or an
/// embedded `concat` modifier, an optional evaluator (`evr` or `regexp`,
/// noop otherwise), optional `if` dependencies, and expectation flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Test {
    #[serde(rename = "test")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat: Option<ConcatSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evr: Option<EvrSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<RegexpSpec>,
    #[serde(default, rename = "if", skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, rename = "expectedresult")]
    pub expected_result: bool,
    #[serde(default, rename = "expecterror")]
    pub expect_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Test {
    pub fn is_modifier(&self) -> bool {
        self.concat.is_some()
    }
}

/// The concat modifier: merge the criteria of other tests and collapse them
/// into a single criterion joined by `operator`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConcatSpec {
    pub operator: String,
    pub sources: Vec<ModifierSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifierSource {
    pub identifier: String,
    pub select: String,
}

/// EVR evaluator spec. The operation stays a string so an unrecognized
/// operator surfaces at evaluation time, where `expecterror` can see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvrSpec {
    pub operation: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegexpSpec {
    pub value: String,
}

/// Load a policy document from a JSON file.
pub fn load_document(path: &Path) -> anyhow::Result<Document> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read policy document {}", path.display()))?;
    load_document_str(&text)
}

/// Load a policy document from JSON text.
pub fn load_document_str(text: &str) -> anyhow::Result<Document> {
    let doc: Document = serde_json::from_str(text).context("parse policy document")?;
    Ok(doc)
}

/// Substitute every `${key}` occurrence in `input` with the matching
/// variable's value. Unknown keys are left literal.
pub fn expand_variables(vars: &[Variable], input: &str) -> String {
    let mut out = input.to_string();
    for v in vars {
        let token = format!("${{{}}}", v.key);
        if out.contains(&token) {
            out = out.replace(&token, &v.value);
        }
    }
    out
}

impl PackageSpec {
    pub fn expanded(&self, vars: &[Variable]) -> PackageSpec {
        PackageSpec {
            name: expand_variables(vars, &self.name),
            only_newest: self.only_newest,
            collect_match: self.collect_match.clone(),
        }
    }
}

impl FileContentSpec {
    pub fn expanded(&self, vars: &[Variable]) -> FileContentSpec {
        FileContentSpec {
            path: expand_variables(vars, &self.path),
            file: expand_variables(vars, &self.file),
            expression: self.expression.clone(),
            concat: self.concat.clone(),
        }
    }
}

impl FileNameSpec {
    pub fn expanded(&self, vars: &[Variable]) -> FileNameSpec {
        FileNameSpec {
            path: expand_variables(vars, &self.path),
            file: self.file.clone(),
        }
    }
}

impl Document {
    /// Identifiers of all tests, in document order.
    pub fn test_identifiers(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.identifier.as_str()).collect()
    }

    pub fn get_test(&self, identifier: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.identifier == identifier)
    }

    pub fn get_object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let doc = load_document_str(
            r#"{
                "objects": [
                    { "object": "openssl-package", "package": { "name": "openssl" } }
                ],
                "tests": [
                    { "test": "package0", "expectedresult": true, "object": "openssl-package" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.tests.len(), 1);
        assert_eq!(doc.tests[0].identifier, "package0");
        assert!(doc.tests[0].expected_result);
        assert!(matches!(
            doc.objects[0].source().unwrap(),
            SourceKind::Package(p) if p.name == "openssl" && !p.only_newest
        ));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let doc = load_document_str(
            r#"{
                "comment": "generated",
                "objects": [
                    { "object": "o", "note": "x", "raw": { "identifiers": [
                        { "identifier": "a", "value": "1" }
                    ] } }
                ],
                "tests": [
                    { "test": "t", "object": "o", "extra": 42 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.tests.len(), 1);
    }

    #[test]
    fn object_without_source_is_an_error() {
        let obj = Object {
            name: "empty".into(),
            ..Default::default()
        };
        let err = obj.source().unwrap_err().to_string();
        assert!(err.contains("has no source"));
    }

    #[test]
    fn object_with_two_sources_is_an_error() {
        let doc = load_document_str(
            r#"{
                "objects": [
                    { "object": "both",
                      "package": { "name": "openssl" },
                      "filename": { "path": "/etc", "file": "(.*)\\.conf" } }
                ]
            }"#,
        )
        .unwrap();
        let err = doc.objects[0].source().unwrap_err().to_string();
        assert!(err.contains("more than one source"));
    }

    #[test]
    fn test_if_list_and_flags_parse() {
        let doc = load_document_str(
            r#"{
                "objects": [
                    { "object": "o", "package": { "name": "grub-common" } }
                ],
                "tests": [
                    { "test": "t1", "object": "o",
                      "evr": { "operation": "<", "value": "2.02-beta1" } },
                    { "test": "t2", "object": "o", "if": ["t1"], "expecterror": true,
                      "tags": [ { "key": "cve", "value": "CVE-2015-0000" } ] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.tests[1].depends, vec!["t1".to_string()]);
        assert!(doc.tests[1].expect_error);
        assert_eq!(doc.tests[1].tags[0].key, "cve");
        let evr = doc.tests[0].evr.as_ref().unwrap();
        assert_eq!(evr.operation, "<");
        assert_eq!(evr.value, "2.02-beta1");
    }

    #[test]
    fn concat_modifier_parses() {
        let doc = load_document_str(
            r#"{
                "tests": [
                    { "test": "combined",
                      "concat": { "operator": ".", "sources": [
                          { "identifier": "a", "select": "all" },
                          { "identifier": "b", "select": "all" }
                      ] } }
                ]
            }"#,
        )
        .unwrap();
        assert!(doc.tests[0].is_modifier());
        let concat = doc.tests[0].concat.as_ref().unwrap();
        assert_eq!(concat.operator, ".");
        assert_eq!(concat.sources.len(), 2);
    }

    #[test]
    fn package_collectmatch_parses() {
        let doc = load_document_str(
            r#"{
                "objects": [
                    { "object": "kernel-image", "package": {
                        "name": "linux-image-generic",
                        "collectmatch": "^linux-image-.*-generic$",
                        "onlynewest": true
                    } }
                ]
            }"#,
        )
        .unwrap();
        let SourceKind::Package(p) = doc.objects[0].source().unwrap() else {
            panic!("expected a package source");
        };
        assert_eq!(p.name, "linux-image-generic");
        assert_eq!(p.collect_match.as_deref(), Some("^linux-image-.*-generic$"));
        assert!(p.only_newest);
    }

    #[test]
    fn expansion_replaces_known_keys_only() {
        let vars = vec![
            Variable {
                key: "root".into(),
                value: "/tmp/scan".into(),
            },
            Variable {
                key: "pkg".into(),
                value: "openssl".into(),
            },
        ];
        assert_eq!(expand_variables(&vars, "${root}/etc"), "/tmp/scan/etc");
        assert_eq!(expand_variables(&vars, "${pkg}-${pkg}"), "openssl-openssl");
        assert_eq!(expand_variables(&vars, "${missing}/etc"), "${missing}/etc");
        assert_eq!(expand_variables(&vars, "no tokens"), "no tokens");
    }

    #[test]
    fn expansion_covers_paths_and_names_but_not_expressions() {
        let vars = vec![Variable {
            key: "root".into(),
            value: "/srv".into(),
        }];
        let fc = FileContentSpec {
            path: "${root}".into(),
            file: "${root}.conf".into(),
            expression: "${root}".into(),
            concat: None,
        };
        let e = fc.expanded(&vars);
        assert_eq!(e.path, "/srv");
        assert_eq!(e.file, "/srv.conf");
        // expressions are matched verbatim, never expanded
        assert_eq!(e.expression, "${root}");

        let fname = FileNameSpec {
            path: "${root}".into(),
            file: "(${root})".into(),
        };
        let e = fname.expanded(&vars);
        assert_eq!(e.path, "/srv");
        assert_eq!(e.file, "(${root})");
    }

    #[test]
    fn document_lookups() {
        let doc = load_document_str(
            r#"{
                "objects": [ { "object": "o", "package": { "name": "bash" } } ],
                "tests": [
                    { "test": "a", "object": "o" },
                    { "test": "b", "object": "o" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.test_identifiers(), vec!["a", "b"]);
        assert!(doc.get_test("b").is_some());
        assert!(doc.get_test("c").is_none());
        assert!(doc.get_object("o").is_some());
        assert!(doc.get_object("x").is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = load_document_str("{ not json").unwrap_err().to_string();
        assert!(err.contains("parse policy document"));
    }
}
