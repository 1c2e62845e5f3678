// SPDX-License-Identifier: MIT

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Observer for transfer progress. Implementations must not fail, and the
/// transfer behaves the same whether or not anything listens.
pub trait Progress {
    /// `delta` more bytes were moved, out of `total`.
    fn report(&mut self, delta: u64, total: u64);

    fn finish(&mut self);
}

/// Discards all progress.
impl Progress for () {
    fn report(&mut self, _delta: u64, _total: u64) {}

    fn finish(&mut self) {}
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn report(&mut self, delta: u64, total: u64) {
        (**self).report(delta, total)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

const TEMPLATE: &str =
    "{msg} : {percent:>3}%[{bar:40}] {bytes}/{total_bytes} [elapsed: {elapsed} left: {eta}, {bytes_per_sec}]";

/// Terminal progress bar on stderr.
pub struct Bar {
    bar: ProgressBar,
}

impl Bar {
    pub fn new(desc: &'static str, total: u64) -> Self {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("# ");
        let bar = ProgressBar::new(total).with_style(style).with_message(desc);
        Bar { bar }
    }

    /// A bar that tracks counts but never draws.
    pub fn hidden(desc: &'static str, total: u64) -> Self {
        let bar = Self::new(desc, total);
        bar.bar.set_draw_target(ProgressDrawTarget::hidden());
        bar
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Progress for Bar {
    fn report(&mut self, delta: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.inc(delta);
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}
