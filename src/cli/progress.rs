//! Progress bar and summary reporting for CLI transfers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use console::style;
use indicatif::{HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressStyle};

use crate::progress::{TransferOutcome, TransferProgress};
use crate::stats::SessionStats;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single file. A `size` of `0` gives a spinner.
#[must_use]
pub fn make_progress_bar(size: u64, name: &str) -> ProgressBar {
    let bar = if size == 0 {
        let bar = ProgressBar::no_length();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {bytes} @ {bytes_per_sec} - {msg}")
                .expect("progress template is valid"),
        );
        bar
    } else {
        let bar = ProgressBar::new(size);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
            )
            .expect("progress template is valid")
            .progress_chars("━━╌"),
        );
        bar
    };
    bar.set_message(name.to_string());
    bar
}

/// Creates a progress bar for total progress over several transfers.
#[must_use]
pub fn make_total_progress_bar(size: u64) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "Total [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}",
        )
        .expect("template valid")
        .progress_chars("━━╌"),
    );
    bar
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Draws one bar per running transfer, plus an optional total bar.
///
/// Bars are keyed by destination path, so transfers that share a file name
/// in different directories each keep their own bar.
pub struct BarProgress {
    multi: MultiProgress,
    total: Option<ProgressBar>,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl BarProgress {
    #[must_use]
    pub fn new(multi: MultiProgress, total: Option<ProgressBar>) -> Self {
        Self {
            multi,
            total,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn take_bar(&self, path: &Path) -> Option<ProgressBar> {
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    fn println(&self, line: String) {
        let _ = self.multi.println(line);
    }
}

impl TransferProgress for BarProgress {
    fn on_start(&self, path: &Path, total: u64) {
        let bar = make_progress_bar(total, &display_name(path));
        let bar = match &self.total {
            Some(total_bar) => self.multi.insert_before(total_bar, bar),
            None => self.multi.add(bar),
        };
        bar.enable_steady_tick(Duration::from_millis(250));
        if let Some(stale) = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), bar)
        {
            stale.finish_and_clear();
        }
    }

    fn on_progress(&self, path: &Path, bytes_delta: u64) {
        if let Some(bar) = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            bar.inc(bytes_delta);
        }
        if let Some(total) = &self.total {
            total.inc(bytes_delta);
        }
    }

    fn on_cache_hit(&self, path: &Path, size: u64) {
        self.println(format!(
            "  {} - up to date ({})",
            display_name(path),
            HumanBytes(size)
        ));
    }

    fn on_corrupted(&self, path: &Path, local: u64, remote: u64) {
        self.println(format!(
            "  {} {} - cached copy has {} of {}, fetching again",
            style("!").yellow(),
            display_name(path),
            HumanBytes(local),
            HumanBytes(remote)
        ));
    }

    fn on_complete(&self, path: &Path, outcome: &TransferOutcome) {
        if let Some(bar) = self.take_bar(path) {
            bar.finish_and_clear();
        }
        if !outcome.from_cache {
            self.println(format!(
                "  {} - {} in {} ({}/s avg, {}/s peak)",
                outcome.file_name,
                HumanBytes(outcome.bytes_transferred),
                HumanDuration(outcome.elapsed),
                HumanBytes(outcome.average_speed),
                HumanBytes(outcome.peak_speed),
            ));
        }
    }

    fn on_error(&self, path: &Path, error: &str) {
        if let Some(bar) = self.take_bar(path) {
            bar.abandon();
        }
        self.println(format!(
            "  {} {} - {error}",
            style("✗").red(),
            display_name(path)
        ));
    }
}

/// Prints a summary of transfer statistics.
pub fn print_summary(stats: &SessionStats) {
    if stats.files_downloaded == 0 && stats.files_cached == 0 && stats.files_failed == 0 {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("{}", style("Transfer Summary").bold());
    println!("{SEPARATOR}");

    if stats.files_downloaded > 0 {
        println!("  Files downloaded:  {}", stats.files_downloaded);
        println!("  Total size:        {}", HumanBytes(stats.total_bytes));
        println!("  Total time:        {}", HumanDuration(stats.elapsed));
        println!("  Average speed:     {}/s", HumanBytes(stats.average_speed()));
        println!("  Peak speed:        {}/s", HumanBytes(stats.peak_speed));
    }
    if stats.files_cached > 0 {
        println!("  Already present:   {}", stats.files_cached);
    }
    if stats.files_failed > 0 {
        println!("  Failed:            {}", style(stats.files_failed).red());
    }

    println!("{SEPARATOR}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn unknown_size_gets_spinner() {
        assert_eq!(make_progress_bar(0, "x.img").length(), None);
        assert_eq!(make_progress_bar(10, "x.img").length(), Some(10));
    }

    #[test]
    fn bars_track_progress_and_total() {
        let multi = hidden();
        let total = multi.add(make_total_progress_bar(150));
        let progress = BarProgress::new(multi, Some(total.clone()));

        let a = Path::new("/srv/a.img");
        let b = Path::new("/srv/b.img");
        progress.on_start(a, 100);
        progress.on_start(b, 50);
        progress.on_progress(a, 60);
        progress.on_progress(b, 50);

        assert_eq!(total.position(), 110);
        let bars = progress.bars.lock().unwrap();
        assert_eq!(bars[a].position(), 60);
        assert_eq!(bars[b].position(), 50);
    }

    #[test]
    fn same_name_in_two_directories_keeps_two_bars() {
        let progress = BarProgress::new(hidden(), None);
        let first = Path::new("/srv/stable/os.img");
        let second = Path::new("/srv/beta/os.img");
        progress.on_start(first, 100);
        progress.on_start(second, 100);
        progress.on_progress(first, 30);
        progress.on_progress(second, 70);

        {
            let bars = progress.bars.lock().unwrap();
            assert_eq!(bars.len(), 2);
            assert_eq!(bars[first].position(), 30);
            assert_eq!(bars[second].position(), 70);
            assert!(!bars[first].is_finished());
        }

        progress.on_error(second, "boom");
        assert!(progress.bars.lock().unwrap().contains_key(first));
    }

    #[test]
    fn display_name_is_file_name() {
        assert_eq!(display_name(Path::new("/srv/images/os.img")), "os.img");
    }

    #[test]
    fn finished_bars_are_released() {
        let progress = BarProgress::new(hidden(), None);
        let a = Path::new("a.img");
        let b = Path::new("b.img");
        progress.on_start(a, 10);
        progress.on_start(b, 10);

        progress.on_complete(
            a,
            &TransferOutcome::cached("a.img".to_string(), PathBuf::from("a.img"), Duration::ZERO),
        );
        progress.on_error(b, "boom");

        assert!(progress.bars.lock().unwrap().is_empty());
    }
}
