//! End-to-end package policies against the fixture package table.

use vuln_check_engine::{Analysis, Engine};
use vuln_check_host::FixturePackages;
use vuln_check_policy::load_document_str;

/// Run a policy against the fixture table. Expectation checking
/// (`expectedresult` and `expecterror` alike) is the engine's own mismatch
/// machinery; the harness only guards against errors no test asked for.
fn exec_policy(json: &str) -> Analysis {
    let doc = load_document_str(json).expect("load policy");
    let mut engine = Engine::new(Box::new(FixturePackages));
    let analysis = engine.analyze(&doc).expect("analyze policy");

    for t in &doc.tests {
        let record = analysis.get(&t.identifier).expect("record for test");
        if !t.expect_error {
            assert!(
                !record.is_error,
                "test {} errored: {:?}",
                t.identifier, record.error
            );
        }
    }
    let unmet: Vec<&str> = analysis
        .mismatches
        .iter()
        .map(|m| m.record.identifier.as_str())
        .collect();
    assert!(unmet.is_empty(), "unmet expectations: {:?}", unmet);

    analysis
}

const PACKAGE_POLICY: &str = r#"
{
    "objects": [
    {
        "object": "openssl-package",
        "package": {
            "name": "openssl"
        }
    },

    {
        "object": "libbind-package",
        "package": {
            "name": "libbind"
        }
    },

    {
        "object": "grub-common-package",
        "package": {
            "name": "grub-common"
        }
    },

    {
        "object": "kernel-package-newest",
        "package": {
            "name": "kernel",
            "onlynewest": true
        }
    }
    ],

    "tests": [
    {
        "test": "package0",
        "expectedresult": true,
        "object": "openssl-package"
    },

    {
        "test": "package1",
        "expectedresult": true,
        "object": "libbind-package",
        "evr": {
            "operation": "=",
            "value": "1:9.9.5.dfsg-4.3"
        }
    },

    {
        "test": "package2",
        "expectedresult": false,
        "object": "grub-common-package",
        "evr": {
            "operation": "<",
            "value": "2.02-beta1"
        }
    },

    {
        "test": "package3",
        "expectedresult": false,
        "object": "grub-common-package",
        "evr": {
            "operation": "<",
            "value": "2.02-beta2"
        }
    },

    {
        "test": "package4",
        "expectedresult": false,
        "object": "grub-common-package",
        "evr": {
            "operation": "<",
            "value": "2.01-beta2"
        }
    },

    {
        "test": "package5",
        "expectedresult": false,
        "object": "grub-common-package",
        "evr": {
            "operation": "<",
            "value": "2.02-beta3"
        },
        "if": [ "package2" ]
    },

    {
        "test": "package6",
        "expecterror": true,
        "object": "openssl-package",
        "evr": {
            "operation": "badop",
            "value": "1.0.1e"
        }
    },

    {
        "test": "package7",
        "expectedresult": false,
        "object": "kernel-package-newest",
        "evr": {
            "operation": "<",
            "value": "2.6.32-573.8.1.el6.x86_64"
        }
    },

    {
        "test": "package8",
        "expectedresult": true,
        "object": "kernel-package-newest",
        "evr": {
            "operation": "<",
            "value": "2.6.32-574.el6.x86_64"
        }
    }
    ]
}
"#;

#[test]
fn package_policy_matches_expectations() {
    let analysis = exec_policy(PACKAGE_POLICY);

    // package5 is true on its own but gated false by package2.
    let gated = analysis.get("package5").unwrap();
    assert!(gated.has_true_results);
    assert!(!gated.master_result);

    // onlynewest collapsed the two kernel entries to one criterion.
    let newest = analysis.get("package7").unwrap();
    assert_eq!(newest.results.len(), 1);
    assert_eq!(newest.results[0].identifier, "kernel");
}

#[test]
fn package_query_returns_the_fixture_table() {
    let mut engine = Engine::new(Box::new(FixturePackages));
    let pkgs = engine.query_packages().expect("query packages");
    assert_eq!(pkgs.len(), 7);
    assert!(pkgs
        .iter()
        .any(|p| p.name == "grub-common" && p.version == "2.02-beta2"));
}

#[test]
fn expected_mismatches_are_reported() {
    let doc = load_document_str(
        r#"{
            "objects": [ { "object": "ssl", "package": { "name": "openssl" } } ],
            "tests": [
                { "test": "wrong", "expectedresult": false, "object": "ssl" }
            ]
        }"#,
    )
    .unwrap();
    let mut engine = Engine::new(Box::new(FixturePackages));
    let analysis = engine.analyze(&doc).unwrap();
    assert_eq!(analysis.mismatches.len(), 1);
    let mismatch = &analysis.mismatches[0];
    assert_eq!(mismatch.record.identifier, "wrong");
    assert!(!mismatch.expected);
    assert!(!mismatch.expected_error);
    assert!(mismatch.record.master_result);
}

#[test]
fn collectmatch_gathers_versioned_package_names() {
    let doc = load_document_str(
        r#"{
            "objects": [
                { "object": "kernel-image-newest", "package": {
                    "name": "linux-image-generic",
                    "collectmatch": "^linux-image-[0-9].*-generic$",
                    "onlynewest": true
                } }
            ],
            "tests": [
                { "test": "kernel-image-outdated", "expectedresult": true,
                  "object": "kernel-image-newest",
                  "evr": { "operation": "<", "value": "3.19.0-30.34" } }
            ]
        }"#,
    )
    .unwrap();

    let mut engine = Engine::new(Box::new(vuln_check_host::fakes::StaticPackages::new([
        ("linux-image-3.19.0-25-generic", "3.19.0-25.26"),
        ("linux-image-3.19.0-28-generic", "3.19.0-28.30"),
        ("linux-image-extra-3.19.0-28-generic", "3.19.0-28.30"),
    ])));
    let analysis = engine.analyze(&doc).unwrap();

    let record = analysis.get("kernel-image-outdated").unwrap();
    assert!(!record.is_error);
    assert!(record.master_result);
    // onlynewest collapsed the regex matches to the greatest image.
    assert_eq!(record.results.len(), 1);
    assert_eq!(record.results[0].identifier, "linux-image-3.19.0-28-generic");
    assert!(analysis.mismatches.is_empty());
}
