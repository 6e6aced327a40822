//! The policy interpreter.
//!
//! An [`Engine`] owns the host adapters and per-run state: it validates a
//! loaded document, prepares every object at most once (expanding variables
//! first), runs tests depth-first along their `if` dependencies with
//! per-test memoization, folds dependency master results, and emits one
//! record per test in document order.
//!
//! Errors during preparation or evaluation stay local to the owning object
//! or test; only structural document errors abort an analysis.

pub mod evr;

mod evaluator;
mod source;

use std::collections::HashMap;
use std::sync::Arc;

use vuln_check_host::{DebugLogWriter, PackageEnumerator, DEFAULT_MAX_DEPTH};
use vuln_check_policy::{Document, SourceKind};
use vuln_check_types::{
    Criterion, Evaluation, ExpectedMismatch, PackageEntry, SubResult, TestRecord, VulnCheckError,
};

pub use evaluator::Evaluator;

pub struct EngineOptions {
    /// Recursion bound for filesystem sources.
    pub max_depth: usize,
    /// Debug trace sink; `None` disables tracing.
    pub debug: Option<Arc<dyn DebugLogWriter>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            debug: None,
        }
    }
}

/// The outcome of analyzing one document.
#[derive(Debug)]
pub struct Analysis {
    /// One record per test, in document order.
    pub records: Vec<TestRecord>,
    /// Tests whose outcome disagreed with their declared expectation
    /// (`expectedresult`, or an `expecterror` that never errored), in
    /// evaluation order.
    pub mismatches: Vec<ExpectedMismatch>,
}

impl Analysis {
    pub fn get(&self, identifier: &str) -> Option<&TestRecord> {
        self.records.iter().find(|r| r.identifier == identifier)
    }
}

pub struct Engine {
    enumerator: Box<dyn PackageEnumerator>,
    options: EngineOptions,
    // Populated on first demand, shared by every package object in the run.
    packages: Option<Result<Vec<PackageEntry>, VulnCheckError>>,
}

impl Engine {
    pub fn new(enumerator: Box<dyn PackageEnumerator>) -> Self {
        Self::with_options(enumerator, EngineOptions::default())
    }

    pub fn with_options(enumerator: Box<dyn PackageEnumerator>, options: EngineOptions) -> Self {
        Self {
            enumerator,
            options,
            packages: None,
        }
    }

    /// The full package cache, enumerating on first call.
    pub fn query_packages(&mut self) -> Result<Vec<PackageEntry>, VulnCheckError> {
        self.packages().map(|p| p.to_vec())
    }

    /// Validate `doc`, prepare its objects, run its tests, and collect
    /// records. Structural errors abort; per-entity errors are reported in
    /// the affected records.
    pub fn analyze(&mut self, doc: &Document) -> Result<Analysis, VulnCheckError> {
        vuln_check_policy::validate(doc).map_err(|e| VulnCheckError::Document(e.to_string()))?;

        let mut run = RunState::new(doc);

        for idx in 0..doc.objects.len() {
            self.prepare_object(doc, &mut run, idx);
        }
        for idx in 0..doc.tests.len() {
            self.run_test(doc, &mut run, idx);
        }

        let records = (0..doc.tests.len()).map(|i| run.record(doc, i)).collect();
        Ok(Analysis {
            records,
            mismatches: run.mismatches,
        })
    }

    fn packages(&mut self) -> Result<&[PackageEntry], VulnCheckError> {
        if self.packages.is_none() {
            self.debug(|| "initializing package cache".to_string());
            let result = self.enumerator.enumerate();
            if let Ok(pkgs) = &result {
                self.debug(|| format!("package cache holds {} entries", pkgs.len()));
            }
            self.packages = Some(result);
        }
        match &self.packages {
            Some(Ok(pkgs)) => Ok(pkgs),
            Some(Err(e)) => Err(e.clone()),
            None => Err(VulnCheckError::Preparation("package cache unavailable".into())),
        }
    }

    fn prepare_object(&mut self, doc: &Document, run: &mut RunState, idx: usize) {
        if run.objects[idx].prepared {
            return;
        }
        run.objects[idx].prepared = true;

        let obj = &doc.objects[idx];
        self.debug(|| format!("preparing object \"{}\"", obj.name));

        let source = match obj.source() {
            Ok(s) => s,
            Err(e) => {
                run.objects[idx].err = Some(VulnCheckError::Document(e.to_string()));
                return;
            }
        };

        let outcome = match source {
            SourceKind::Package(spec) => {
                let spec = spec.expanded(&doc.variables);
                self.packages()
                    .and_then(|pkgs| source::package_criteria(&spec, pkgs))
            }
            SourceKind::FileContent(spec) => {
                source::filecontent_criteria(&spec.expanded(&doc.variables), self.options.max_depth)
            }
            SourceKind::FileName(spec) => {
                source::filename_criteria(&spec.expanded(&doc.variables), self.options.max_depth)
            }
            SourceKind::Raw(spec) => Ok(source::raw_criteria(spec)),
        };

        match outcome {
            Ok(criteria) => {
                self.debug(|| {
                    format!(
                        "object \"{}\" yielded {} criteria",
                        obj.name,
                        criteria.len()
                    )
                });
                run.objects[idx].criteria = criteria;
            }
            Err(e) => {
                self.debug(|| format!("object \"{}\" failed: {}", obj.name, e));
                run.objects[idx].err = Some(e);
            }
        }
    }

    /// Criteria for a test: its object's prepared criteria, or for a
    /// modifier the collapsed union of its source tests' criteria. Source
    /// tests are resolved by identifier; cycles were rejected at validation.
    fn test_criteria(
        &self,
        doc: &Document,
        run: &RunState,
        idx: usize,
    ) -> Result<Vec<Criterion>, VulnCheckError> {
        let t = &doc.tests[idx];

        if let Some(concat) = &t.concat {
            let mut merged = Vec::new();
            for src in &concat.sources {
                let si = run.test_index(&src.identifier)?;
                merged.extend(self.test_criteria(doc, run, si)?);
            }
            return Ok(source::criteria_concat(&merged, &concat.operator));
        }

        let Some(name) = t.object.as_deref() else {
            return Err(VulnCheckError::Document(format!(
                "{}: no valid source interface",
                t.identifier
            )));
        };
        let oi = run.object_index(name)?;
        let prepared = &run.objects[oi];
        if let Some(e) = &prepared.err {
            return Err(e.clone());
        }
        Ok(prepared.criteria.clone())
    }

    fn run_test(&mut self, doc: &Document, run: &mut RunState, idx: usize) {
        if run.tests[idx].evaluated || run.tests[idx].err.is_some() {
            return;
        }
        run.tests[idx].evaluated = true;

        let t = &doc.tests[idx];
        self.debug(|| format!("running test \"{}\"", t.identifier));

        // Dependencies run first, depth-first.
        for dep in &t.depends {
            let Ok(di) = run.test_index(dep) else {
                continue;
            };
            self.run_test(doc, run, di);
            if run.tests[di].err.is_some() {
                run.tests[idx].err = Some(VulnCheckError::Evaluation(format!(
                    "a test dependency failed (\"{}\")",
                    dep
                )));
                return;
            }
        }

        let criteria = match self.test_criteria(doc, run, idx) {
            Ok(c) => c,
            Err(e) => {
                run.tests[idx].err = Some(e);
                return;
            }
        };

        let ev = Evaluator::from_test(t);
        let mut results: Vec<Evaluation> = Vec::with_capacity(criteria.len());
        for criterion in &criteria {
            match ev.evaluate(criterion) {
                Ok(r) => {
                    self.debug(|| {
                        format!(
                            "test \"{}\": {} \"{}\" -> {}",
                            t.identifier, criterion.identifier, criterion.test_value, r.result
                        )
                    });
                    results.push(r);
                }
                Err(e) => {
                    run.tests[idx].err = Some(e);
                    return;
                }
            }
        }

        let has_true_results = results.iter().any(|r| r.result);
        // The master result starts from this test's own truth and is zeroed
        // by any dependency whose master result is false.
        let mut master_result = has_true_results;
        for dep in &t.depends {
            if let Ok(di) = run.test_index(dep) {
                if !run.tests[di].master_result {
                    master_result = false;
                    break;
                }
            }
        }

        let state = &mut run.tests[idx];
        state.results = results;
        state.has_true_results = has_true_results;
        state.master_result = master_result;

        if t.expect_error {
            // An expecterror test is satisfied only by an error; reaching
            // this point means evaluation completed cleanly.
            let record = run.record(doc, idx);
            run.mismatches.push(ExpectedMismatch {
                record,
                expected: t.expected_result,
                expected_error: true,
            });
        } else if master_result != t.expected_result {
            let record = run.record(doc, idx);
            run.mismatches.push(ExpectedMismatch {
                record,
                expected: t.expected_result,
                expected_error: false,
            });
        }
    }

    fn debug(&self, msg: impl FnOnce() -> String) {
        if let Some(writer) = &self.options.debug {
            writer.write_line(&msg());
        }
    }
}

#[derive(Default)]
struct PreparedObject {
    prepared: bool,
    criteria: Vec<Criterion>,
    err: Option<VulnCheckError>,
}

#[derive(Default)]
struct TestState {
    evaluated: bool,
    err: Option<VulnCheckError>,
    results: Vec<Evaluation>,
    has_true_results: bool,
    master_result: bool,
}

struct RunState {
    object_indices: HashMap<String, usize>,
    test_indices: HashMap<String, usize>,
    objects: Vec<PreparedObject>,
    tests: Vec<TestState>,
    mismatches: Vec<ExpectedMismatch>,
}

impl RunState {
    fn new(doc: &Document) -> Self {
        let object_indices = doc
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.name.clone(), i))
            .collect();
        let test_indices = doc
            .tests
            .iter()
            .enumerate()
            .map(|(i, t)| (t.identifier.clone(), i))
            .collect();
        Self {
            object_indices,
            test_indices,
            objects: doc.objects.iter().map(|_| PreparedObject::default()).collect(),
            tests: doc.tests.iter().map(|_| TestState::default()).collect(),
            mismatches: Vec::new(),
        }
    }

    fn object_index(&self, name: &str) -> Result<usize, VulnCheckError> {
        self.object_indices
            .get(name)
            .copied()
            .ok_or_else(|| VulnCheckError::Document(format!("unknown object \"{}\"", name)))
    }

    fn test_index(&self, identifier: &str) -> Result<usize, VulnCheckError> {
        self.test_indices
            .get(identifier)
            .copied()
            .ok_or_else(|| VulnCheckError::Document(format!("unknown test \"{}\"", identifier)))
    }

    fn record(&self, doc: &Document, idx: usize) -> TestRecord {
        let t = &doc.tests[idx];
        let state = &self.tests[idx];
        TestRecord {
            identifier: t.identifier.clone(),
            description: t.description.clone(),
            tags: t.tags.clone(),
            is_error: state.err.is_some(),
            error: state.err.as_ref().map(|e| e.to_string()),
            master_result: state.master_result,
            has_true_results: state.has_true_results,
            results: state
                .results
                .iter()
                .map(|r| SubResult {
                    result: r.result,
                    identifier: r.criterion.identifier.clone(),
                })
                .collect(),
        }
    }
}
