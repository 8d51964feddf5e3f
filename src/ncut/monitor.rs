//   Copyright 2025 normcut developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.

//! Progress reporting of batched solves

use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::warn;

use super::solver::Partition;
use crate::linalg::eigen::SymmetricEigen;

/// Observer of [`NormalizedCuts::solve_with`](super::NormalizedCuts::solve_with).
pub trait SolveVisitor {
    fn start_solve(&mut self, batch: usize, n: usize);
    fn start_sample(&mut self, index: usize);
    fn finish_sample(&mut self, index: usize, eigen: &SymmetricEigen);
    fn finish_solve(&mut self, partition: &Partition);
}

fn progress_style(bar_width: usize) -> ProgressStyle {
    let template = format!(
        "{: >12} {}",
        style("Solving").cyan().bold(),
        format!("[{{bar:{}}}] {{pos:>2}}/{{len:2}} ({{elapsed}})", bar_width)
    );
    ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Second smallest eigenvalue, or NaN if the decomposition is too small.
fn fiedler_value(eigen: &SymmetricEigen) -> f64 {
    eigen.eigenvalues.get(1).copied().unwrap_or(f64::NAN)
}

/// Prints a progress bar and one line per solved sample to the terminal.
#[derive(Clone, Debug)]
pub struct SolveConsole {
    pb: ProgressBar,
    timer: Instant,
    start: Instant,
}

impl SolveConsole {
    pub fn new() -> SolveConsole {
        SolveConsole {
            pb: ProgressBar::hidden(),
            timer: Instant::now(),
            start: Instant::now(),
        }
    }
}

impl Default for SolveConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl SolveVisitor for SolveConsole {
    fn start_solve(&mut self, batch: usize, n: usize) {
        self.pb = ProgressBar::new(batch as u64);
        self.pb.set_style(progress_style(25));
        self.pb.enable_steady_tick(Duration::from_secs(5));

        println!("Batch size: {}", batch);
        println!("Pixels per image: {}", n);

        self.start = Instant::now();
    }

    fn start_sample(&mut self, _index: usize) {
        self.timer = Instant::now();
    }

    fn finish_sample(&mut self, index: usize, eigen: &SymmetricEigen) {
        let duration = self.timer.elapsed();
        self.pb.println(format!(
            "{: >12} sample {} in {:#} (fiedler value {:.6}, {} rows excluded)",
            style("Finished").green().bold(),
            index,
            HumanDuration(duration),
            fiedler_value(eigen),
            eigen.excluded
        ));
        self.pb.inc(1);
    }

    fn finish_solve(&mut self, partition: &Partition) {
        self.pb.finish_and_clear();
        println!(
            "\n{: >12} normalized cuts of {} samples in {:#}",
            style("Completed").green().bold(),
            partition.batch_size(),
            HumanDuration(self.start.elapsed())
        );
    }
}

#[derive(serde::Serialize)]
struct CsvRow {
    sample: usize,
    n: usize,
    fiedler_value: f64,
    excluded: usize,
    time_ms: u128,
}

/// Writes one csv row per solved sample.
#[derive(Debug)]
pub struct SolveCsv {
    writer: csv::Writer<File>,
    timer: Instant,
    pb: ProgressBar,
}

impl SolveCsv {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<SolveCsv, csv::Error> {
        Ok(SolveCsv {
            writer: csv::Writer::from_path(path)?,
            timer: Instant::now(),
            pb: ProgressBar::hidden(),
        })
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!("Failed to flush solve statistics: {}", err);
        }
    }
}

impl SolveVisitor for SolveCsv {
    fn start_solve(&mut self, batch: usize, _n: usize) {
        self.pb = ProgressBar::new(batch as u64);
        self.pb.set_style(progress_style(20));
    }

    fn start_sample(&mut self, _index: usize) {
        self.timer = Instant::now();
    }

    fn finish_sample(&mut self, index: usize, eigen: &SymmetricEigen) {
        let row = CsvRow {
            sample: index,
            n: eigen.len(),
            fiedler_value: fiedler_value(eigen),
            excluded: eigen.excluded,
            time_ms: self.timer.elapsed().as_millis(),
        };
        if let Err(err) = self.writer.serialize(row) {
            warn!("Failed to record sample {}: {}", index, err);
        }
        self.flush();
        self.pb.inc(1);
    }

    fn finish_solve(&mut self, _partition: &Partition) {
        self.flush();
        self.pb.finish_and_clear();
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoOpVis {}

impl SolveVisitor for NoOpVis {
    fn start_solve(&mut self, _: usize, _: usize) {}
    fn start_sample(&mut self, _: usize) {}
    fn finish_sample(&mut self, _: usize, _: &SymmetricEigen) {}
    fn finish_solve(&mut self, _: &Partition) {}
}
