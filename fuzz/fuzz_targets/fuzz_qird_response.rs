//! Fuzz target: `parse_qird_unread`
//!
//! Feeds arbitrary modem response lines to the QIRD parser and checks it
//! agrees with a plain reading of the third non-empty field.
//!
//! cargo fuzz run fuzz_qird_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use lwm2m_client::cellular::modem::parse_qird_unread;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };

    let fields: Vec<&str> = line.split(',').filter(|f| !f.is_empty()).collect();
    match parse_qird_unread(line) {
        None => assert!(fields.len() < 3, "parser gave up on a line with an unread field"),
        Some(has_data) => {
            assert!(fields.len() >= 3);
            assert_eq!(has_data, fields[2].trim() != "0");
        }
    }
});
