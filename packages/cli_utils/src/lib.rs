#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the waste map binaries.
//!
//! [`IndicatifProgress`] renders analysis progress as `indicatif` bars and
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so log
//! lines never tear a bar mid-redraw.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use waste_map_analysis::progress::{AnalysisStage, ProgressCallback};

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] behind [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style applied whenever `set_total()` (re)starts the bar.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// A bar that walks through the pipeline stages of one zone.
    #[must_use]
    pub fn stages_bar(multi: &MultiProgress, zone_id: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(AnalysisStage::count()));
        bar.enable_steady_tick(Duration::from_millis(100));
        let bar_style = ProgressStyle::with_template(
            "{spinner:.cyan} {msg:<28} {wide_bar:.cyan/dim} {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(bar_style.clone());
        bar.set_message(zone_id.to_string());

        Arc::new(Self { bar, bar_style })
    }

    /// A bar counting finished zones in a batch. Total is known up front.
    #[must_use]
    pub fn zones_bar(multi: &MultiProgress, message: &str, total: u64) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(total));
        let bar_style = ProgressStyle::with_template(
            "{msg} {wide_bar:.green/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(bar_style.clone());
        bar.set_message(message.to_string());

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already set in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn stages_bar_counts_pipeline_stages() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::stages_bar(&multi, "z1");
        progress.inc(3);
        progress.set_message("z1: estimate".to_string());
        progress.finish("z1: done".to_string());
    }

    #[test]
    fn set_total_resets_position() {
        let bar = ProgressBar::hidden();
        let progress = IndicatifProgress {
            bar: bar.clone(),
            bar_style: ProgressStyle::default_bar(),
        };
        progress.inc(5);
        progress.set_total(10);
        assert_eq!(bar.position(), 0);
        assert_eq!(bar.length(), Some(10));
        progress.inc(2);
        assert_eq!(bar.position(), 2);
    }
}
