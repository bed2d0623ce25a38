pub mod json;
pub mod terminal;

use crate::scanner::ScanEvent;

/// Sink for scan events as they are produced.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &ScanEvent);
}
