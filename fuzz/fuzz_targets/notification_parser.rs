#![no_main]

use hotkeys::source::notify::{parse_notification_line, pattern_matches};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some(msg) = parse_notification_line(input) {
            let _ = pattern_matches(&msg.pattern, &msg.channel);
        }
    }
});
