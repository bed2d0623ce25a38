use crate::notifier::Notifier;
use crate::scanner::ScanEvent;

/// Writes one JSON object per event to stdout.
pub struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, event: &ScanEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize scan event"),
        }
    }
}
