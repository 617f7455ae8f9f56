//! Progress reporting surface for the long-running build phases.

use indicatif::{ProgressBar, ProgressStyle};

/// Callback surface the build phases report through. The driver decides
/// how the reports are rendered.
pub trait Progress {
    /// A new phase starts; any running progress display is finished.
    fn set_action(&mut self, action: &str);

    fn set_progress(&mut self, current: u64, total: u64);

    fn info(&mut self, message: &str);

    fn error(&mut self, message: &str);
}

/// Terminal renderer: one progress bar per phase, messages to stderr.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        ConsoleProgress { bar: None }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn create_bar(total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%)")
                .expect("Failed to create progress style")
                .progress_chars("#>-"),
        );
        bar
    }
}

impl Progress for ConsoleProgress {
    fn set_action(&mut self, action: &str) {
        self.finish_bar();
        eprintln!("{}", action);
    }

    fn set_progress(&mut self, current: u64, total: u64) {
        let bar = self.bar.get_or_insert_with(|| Self::create_bar(total));
        bar.set_length(total);
        bar.set_position(current);
    }

    fn info(&mut self, message: &str) {
        match &self.bar {
            Some(bar) => bar.println(message),
            None => eprintln!("{}", message),
        }
    }

    fn error(&mut self, message: &str) {
        log::error!("{}", message);
        match &self.bar {
            Some(bar) => bar.println(format!("ERROR: {}", message)),
            None => eprintln!("ERROR: {}", message),
        }
    }
}

/// Collects messages instead of rendering them. Used by tests and by
/// embedders that report progress elsewhere.
#[derive(Default)]
pub struct SilentProgress {
    pub infos: Vec<String>,
    pub errors: Vec<String>,
}

impl SilentProgress {
    pub fn new() -> Self {
        SilentProgress::default()
    }
}

impl Progress for SilentProgress {
    fn set_action(&mut self, _action: &str) {}

    fn set_progress(&mut self, _current: u64, _total: u64) {}

    fn info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
