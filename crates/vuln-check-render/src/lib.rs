//! Renderings of test records.
//!
//! Rendering is pure and deterministic: everything shown comes from the
//! record itself.

use vuln_check_types::{ReportEnvelope, TestRecord};

/// Single-line, greppable form: one `master` line per test, one `sub` line
/// per sub-result.
pub fn render_grep(record: &TestRecord) -> String {
    let mut lines = Vec::with_capacity(1 + record.results.len());

    let flag = if record.is_error {
        "[error]"
    } else if record.master_result {
        "[true]"
    } else {
        "[false]"
    };
    lines.push(format!(
        "master {} test:\"{}\" hastrue:{} error:\"{}\"",
        flag,
        record.identifier,
        record.has_true_results,
        record.error.as_deref().unwrap_or("")
    ));

    for sub in &record.results {
        let flag = if sub.result { "[true]" } else { "[false]" };
        lines.push(format!(
            "sub {} test:\"{}\" identifier:\"{}\"",
            flag, record.identifier, sub.identifier
        ));
    }

    lines.join("\n") + "\n"
}

/// Multi-line, human-readable form.
pub fn render_human(record: &TestRecord) -> String {
    let mut lines = Vec::new();
    lines.push(format!("result for \"{}\"", record.identifier));

    if record.master_result {
        lines.push("\tmaster result: true".to_string());
    } else {
        let mut buf = "\tmaster result: false".to_string();
        if record.has_true_results {
            buf.push_str(", has true results, failure caused by dependency");
        }
        lines.push(buf);
    }

    if let Some(err) = &record.error {
        lines.push(format!("[error] error: {}", err));
    }

    for sub in &record.results {
        lines.push(format!(
            "\t[{}] identifier: \"{}\"",
            sub.result, sub.identifier
        ));
    }

    lines.join("\n") + "\n"
}

/// Pretty-printed JSON form of the whole report.
pub fn render_json(report: &ReportEnvelope) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vuln_check_types::{RunMeta, SubResult, ToolMeta, REPORT_SCHEMA, TOOL_NAME};

    fn record() -> TestRecord {
        TestRecord {
            identifier: "package0".into(),
            description: None,
            tags: vec![],
            is_error: false,
            error: None,
            master_result: true,
            has_true_results: true,
            results: vec![
                SubResult {
                    result: true,
                    identifier: "openssl".into(),
                },
                SubResult {
                    result: false,
                    identifier: "openssl-fips".into(),
                },
            ],
        }
    }

    #[test]
    fn grep_form_is_one_master_line_plus_subs() {
        let out = render_grep(&record());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "master [true] test:\"package0\" hastrue:true error:\"\""
        );
        assert_eq!(lines[1], "sub [true] test:\"package0\" identifier:\"openssl\"");
        assert_eq!(
            lines[2],
            "sub [false] test:\"package0\" identifier:\"openssl-fips\""
        );
    }

    #[test]
    fn grep_form_flags_errors() {
        let mut r = record();
        r.is_error = true;
        r.error = Some("invalid evr operation \"badop\"".into());
        r.master_result = false;
        r.has_true_results = false;
        r.results.clear();
        let out = render_grep(&r);
        assert!(out.starts_with("master [error]"));
        assert!(out.contains("error:\"invalid evr operation \"badop\"\""));
    }

    #[test]
    fn human_form_shows_master_and_subs() {
        let out = render_human(&record());
        assert!(out.starts_with("result for \"package0\"\n"));
        assert!(out.contains("\tmaster result: true\n"));
        assert!(out.contains("\t[true] identifier: \"openssl\""));
        assert!(out.contains("\t[false] identifier: \"openssl-fips\""));
    }

    #[test]
    fn human_form_annotates_dependency_failure() {
        let mut r = record();
        r.master_result = false;
        let out = render_human(&r);
        assert!(out.contains("master result: false, has true results, failure caused by dependency"));
    }

    #[test]
    fn human_form_plain_false_is_unannotated() {
        let mut r = record();
        r.master_result = false;
        r.has_true_results = false;
        r.results.clear();
        let out = render_human(&r);
        assert!(out.contains("\tmaster result: false\n"));
        assert!(!out.contains("failure caused by dependency"));
    }

    #[test]
    fn human_form_includes_error_line() {
        let mut r = record();
        r.is_error = true;
        r.error = Some("a test dependency failed (\"base\")".into());
        let out = render_human(&r);
        assert!(out.contains("[error] error: a test dependency failed (\"base\")"));
    }

    #[test]
    fn json_form_round_trips() {
        let report = ReportEnvelope {
            schema: REPORT_SCHEMA.into(),
            tool: ToolMeta {
                name: TOOL_NAME.into(),
                version: "0.1.0".into(),
            },
            run: RunMeta {
                started_at: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                ended_at: None,
                duration_ms: Some(12),
            },
            results: vec![record()],
        };
        let text = render_json(&report).unwrap();
        let parsed: ReportEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report);
        assert!(text.contains("package0"));
    }
}
