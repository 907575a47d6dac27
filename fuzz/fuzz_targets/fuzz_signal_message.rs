#![no_main]

use libfuzzer_sys::fuzz_target;
use multihost_seat_client::protocol::{RoomSnapshot, SignalMessage};

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's UTF-8 validation.
    let _ = serde_json::from_slice::<SignalMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<SignalMessage>(s);
        let _ = serde_json::from_str::<RoomSnapshot>(s);
    }
});
