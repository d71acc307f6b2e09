#![no_main]

use hotkeys::attributor::{attribute, ScoringPolicy};
use hotkeys::event::RawEvent;
use hotkeys::source::monitor::parse_monitor_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither parsing nor attribution may panic on arbitrary client output
        if let Some(record) = parse_monitor_line(input) {
            let _ = attribute(
                &RawEvent::command(record.command),
                &ScoringPolicy::command_weighted(),
            );
        }
    }
});
