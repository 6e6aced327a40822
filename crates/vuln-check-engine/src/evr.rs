//! RPM-style Epoch-Version-Release comparison.
//!
//! Version strings are split into `(epoch, version, release)`, each of the
//! latter two tokenized into alternating digit/alpha runs, and compared the
//! way librpm's `rpmvercmp` does: numeric tokens beat alpha tokens, digit
//! runs compare numerically after leading-zero stripping, and iteration is
//! driven by the check side, so the comparison is deliberately asymmetric.

use vuln_check_types::VulnCheckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvrOperation {
    LessThan,
    Equals,
}

impl EvrOperation {
    pub fn parse(s: &str) -> Option<EvrOperation> {
        match s {
            "<" => Some(EvrOperation::LessThan),
            "=" => Some(EvrOperation::Equals),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvrOperation::LessThan => "<",
            EvrOperation::Equals => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evr {
    epoch: String,
    version: String,
    release: String,
}

/// Split a version string into its EVR parts.
///
/// Leading digits followed by `:` are the epoch (default `"0"`); the last
/// `-` in the remainder separates version from release. A string that is
/// all digits, has nothing after the epoch colon, or ends in a dash is
/// malformed.
pub fn extract(s: &str) -> Result<Evr, VulnCheckError> {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits >= s.len() {
        return Err(VulnCheckError::Evaluation(format!(
            "evr extract: all digits in \"{}\"",
            s
        )));
    }

    let (epoch, remain) = if s.as_bytes()[digits] == b':' {
        (&s[..digits], &s[digits + 1..])
    } else {
        ("0", s)
    };
    if remain.is_empty() {
        return Err(VulnCheckError::Evaluation(format!(
            "evr extract: only epoch in \"{}\"",
            s
        )));
    }

    let (version, release) = match remain.rfind('-') {
        Some(pos) => {
            if pos + 1 >= remain.len() {
                return Err(VulnCheckError::Evaluation(format!(
                    "evr extract: \"{}\" ends in dash",
                    s
                )));
            }
            (&remain[..pos], &remain[pos + 1..])
        }
        None => (remain, ""),
    };

    Ok(Evr {
        epoch: epoch.to_string(),
        version: version.to_string(),
        release: release.to_string(),
    })
}

/// Extract maximal alphanumeric runs, then split each run at digit/alpha
/// boundaries. Every returned token is all-digit or all-alpha.
fn tokenize(s: &str) -> Vec<String> {
    let mut ret = Vec::new();
    let mut cur = String::new();
    let mut cur_digit = false;

    for c in s.chars() {
        if !c.is_ascii_alphanumeric() {
            if !cur.is_empty() {
                ret.push(std::mem::take(&mut cur));
            }
            continue;
        }
        let digit = c.is_ascii_digit();
        if !cur.is_empty() && digit != cur_digit {
            ret.push(std::mem::take(&mut cur));
        }
        cur_digit = digit;
        cur.push(c);
    }
    if !cur.is_empty() {
        ret.push(cur);
    }
    ret
}

fn trim_zeros(s: &str) -> &str {
    if s.len() == 1 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return s;
    }
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// Compare two version segments. Returns +1 if the check side wins
/// (`actual < check`), -1 if the actual side wins, 0 if equal.
///
/// Iteration is driven by the check-side token list; changing that breaks
/// compatibility with established rpmvercmp behavior.
fn rpm_ver_cmp(actual: &str, check: &str) -> i32 {
    if actual == check {
        return 0;
    }

    let act_tokens = tokenize(actual);
    let chk_tokens = tokenize(check);

    for (i, chk) in chk_tokens.iter().enumerate() {
        let Some(act) = act_tokens.get(i) else {
            // More tokens on the check side, the check wins.
            return 1;
        };

        let act = trim_zeros(act);
        let chk = trim_zeros(chk);

        let act_digit = act.as_bytes()[0].is_ascii_digit();
        let chk_digit = chk.as_bytes()[0].is_ascii_digit();

        // A numeric component always wins out over alpha.
        match (act_digit, chk_digit) {
            (true, false) => return -1,
            (false, true) => return 1,
            (true, true) => {
                // Numeric comparison: a longer digit run is larger.
                let ord = act.len().cmp(&chk.len()).then_with(|| act.cmp(chk));
                match ord {
                    std::cmp::Ordering::Less => return 1,
                    std::cmp::Ordering::Greater => return -1,
                    std::cmp::Ordering::Equal => {}
                }
            }
            (false, false) => match act.cmp(chk) {
                std::cmp::Ordering::Less => return 1,
                std::cmp::Ordering::Greater => return -1,
                std::cmp::Ordering::Equal => {}
            },
        }
    }

    // The actual value still has tokens left over, actual wins.
    if act_tokens.len() > chk_tokens.len() {
        return -1;
    }

    0
}

fn rpm_compare(actual: &Evr, check: &Evr) -> Result<i32, VulnCheckError> {
    let aepoch: i64 = actual
        .epoch
        .parse()
        .map_err(|_| VulnCheckError::Evaluation("evr compare: bad actual epoch".into()))?;
    let cepoch: i64 = check
        .epoch
        .parse()
        .map_err(|_| VulnCheckError::Evaluation("evr compare: bad check epoch".into()))?;

    if cepoch != aepoch {
        return Ok(if cepoch > aepoch { 1 } else { -1 });
    }

    let ret = rpm_ver_cmp(&actual.version, &check.version);
    if ret != 0 {
        return Ok(ret);
    }

    Ok(rpm_ver_cmp(&actual.release, &check.release))
}

/// Compare `actual` against `check` under `op`.
///
/// `LessThan` is true iff `actual < check`; `Equals` iff they compare equal.
pub fn compare(op: EvrOperation, actual: &str, check: &str) -> Result<bool, VulnCheckError> {
    let act = extract(actual)?;
    let chk = extract(check)?;
    let ret = rpm_compare(&act, &chk)?;
    Ok(match op {
        EvrOperation::Equals => ret == 0,
        EvrOperation::LessThan => ret == 1,
    })
}
