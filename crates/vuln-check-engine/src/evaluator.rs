//! Evaluator dispatch: reduce a criterion to a boolean.

use regex::Regex;
use vuln_check_policy::{EvrSpec, RegexpSpec, Test};
use vuln_check_types::{Criterion, Evaluation, VulnCheckError};

use crate::evr::{self, EvrOperation};

/// The evaluator attached to a test. With neither `evr` nor `regexp`
/// specified the noop evaluator applies: the test is true if its source
/// yielded anything at all.
pub enum Evaluator<'a> {
    Evr(&'a EvrSpec),
    Regexp(&'a RegexpSpec),
    Noop,
}

impl<'a> Evaluator<'a> {
    pub fn from_test(t: &'a Test) -> Evaluator<'a> {
        if let Some(evr) = &t.evr {
            Evaluator::Evr(evr)
        } else if let Some(re) = &t.regexp {
            Evaluator::Regexp(re)
        } else {
            Evaluator::Noop
        }
    }

    pub fn evaluate(&self, criterion: &Criterion) -> Result<Evaluation, VulnCheckError> {
        let result = match self {
            Evaluator::Evr(spec) => {
                let op = EvrOperation::parse(&spec.operation).ok_or_else(|| {
                    VulnCheckError::Evaluation(format!(
                        "invalid evr operation \"{}\"",
                        spec.operation
                    ))
                })?;
                evr::compare(op, &criterion.test_value, &spec.value)?
            }
            Evaluator::Regexp(spec) => {
                let re = Regex::new(&spec.value).map_err(|e| {
                    VulnCheckError::Evaluation(format!("regexp \"{}\": {}", spec.value, e))
                })?;
                re.is_match(&criterion.test_value)
            }
            Evaluator::Noop => true,
        };
        Ok(Evaluation {
            criterion: criterion.clone(),
            result,
        })
    }
}
