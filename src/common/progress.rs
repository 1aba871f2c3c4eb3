use std::cell::Cell;

use indicatif::{ProgressBar, ProgressStyle};

/// Incremental progress for long scans, copies and restores.
///
/// Counters are always maintained so callers can read how far an
/// operation got; the terminal bar is optional.
pub struct Progress {
    bar: Option<ProgressBar>,
    items: Cell<u64>,
    bytes: Cell<u64>,
}

impl Progress {
    /// Counters only, nothing drawn
    pub fn hidden() -> Self {
        Self {
            bar: None,
            items: Cell::new(0),
            bytes: Cell::new(0),
        }
    }

    /// Draw a bar of `len` steps when `show` is set
    pub fn bar(show: bool, len: u64, label: &str) -> Self {
        let bar = if show {
            let pb = ProgressBar::new(len);
            let template = format!(
                "{{spinner:.cyan}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} {{msg}}",
                label
            );
            let style = ProgressStyle::default_bar()
                .template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━░");
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        Self {
            bar,
            items: Cell::new(0),
            bytes: Cell::new(0),
        }
    }

    /// Spinner for work of unknown length
    pub fn spinner(show: bool, label: &str) -> Self {
        let bar = if show {
            let pb = ProgressBar::new_spinner();
            let template = format!("{{spinner:.cyan}} {{pos}} {} {{msg}}", label);
            let style = ProgressStyle::default_spinner()
                .template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        Self {
            bar,
            items: Cell::new(0),
            bytes: Cell::new(0),
        }
    }

    /// Record one processed item of `bytes` size
    pub fn advance(&self, bytes: u64, message: &str) {
        self.items.set(self.items.get() + 1);
        self.bytes.set(self.bytes.get() + bytes);
        if let Some(ref pb) = self.bar {
            pb.set_message(message.to_string());
            pb.inc(1);
        }
    }

    pub fn items(&self) -> u64 {
        self.items.get()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.get()
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.bar {
            pb.finish_and_clear();
        }
    }
}
