use tokio::sync::mpsc;

/// Line sink for a scan's user-visible output.
///
/// Clones share one channel; the receiving side sees every line in emission
/// order and ends once all clones are dropped.
#[derive(Debug, Clone)]
pub struct ScanLogger {
    tx: mpsc::UnboundedSender<String>,
}

impl ScanLogger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit text; multi-line text is sent one line at a time
    pub fn log(&self, text: impl Into<String>) {
        let text = text.into();
        for line in text.trim_end().lines() {
            // A closed receiver means nobody is listening any more
            let _ = self.tx.send(line.to_string());
        }
    }
}
