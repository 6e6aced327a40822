#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(doc) = vuln_check_policy::load_document_str(text) {
            let _ = vuln_check_policy::validate(&doc);
        }
    }
});
