//! Fuzz target: `FirmwareUpdate` download stream
//!
//! Splits arbitrary input into chunks and drives open → write* → finish.
//! The state machine must never panic and must end either idle or holding
//! exactly the bytes that were accepted.
//!
//! cargo fuzz run fuzz_firmware_stream

#![no_main]

use libfuzzer_sys::fuzz_target;
use lwm2m_client::adapters::firmware_update::{FirmwareUpdate, UpdateState};

fuzz_target!(|data: &[u8]| {
    let Some((&chunk_len, body)) = data.split_first() else {
        return;
    };
    let chunk_len = usize::from(chunk_len.max(1));

    let mut fw = FirmwareUpdate::new();
    if fw.stream_open().is_err() {
        return;
    }
    for chunk in body.chunks(chunk_len) {
        if fw.stream_write(chunk).is_err() {
            assert_eq!(fw.state(), UpdateState::Idle);
            return;
        }
    }

    match fw.stream_finish() {
        Ok(()) => {
            assert_eq!(fw.state(), UpdateState::Downloaded { size: body.len() });
            assert_eq!(fw.image(), body);
        }
        Err(_) => assert_eq!(fw.state(), UpdateState::Idle),
    }
});
