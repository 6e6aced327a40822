#![no_main]

use libfuzzer_sys::fuzz_target;
use vuln_check_engine::evr::{compare, extract, EvrOperation};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = extract(text);
        if let Some((actual, check)) = text.split_once('\n') {
            let _ = compare(EvrOperation::Equals, actual, check);
            let _ = compare(EvrOperation::LessThan, actual, check);
        }
    }
});
