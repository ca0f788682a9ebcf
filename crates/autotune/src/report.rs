//! Pass summaries and the reporting sink.

use crate::prune::{count_good, rank_best};
use crate::stats::TrialStat;
use anyhow::Result;
use gemmtune_kernels::config::{Configuration, KernelParams, KernelProfile, ProblemShape};
use gemmtune_kernels::matmul::MatmulKernelFamily;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;

/// One benchmarked candidate and everything measured for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub index: usize,
    pub configuration: Configuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<KernelParams>,
    pub stat: TrialStat,
}

/// Final state of one benchmarking pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub label: String,
    pub kernel: String,
    pub shape: ProblemShape,
    pub trials: usize,
    pub candidates: Vec<CandidateSummary>,
    pub good_kernel_count: usize,
}

impl PassSummary {
    pub fn new(
        label: &str,
        family: &dyn MatmulKernelFamily,
        shape: ProblemShape,
        trials: usize,
        configurations: Vec<Configuration>,
        stats: Vec<TrialStat>,
    ) -> Self {
        let good_kernel_count = count_good(&stats);
        let candidates = configurations
            .into_iter()
            .zip(stats)
            .enumerate()
            .map(|(index, (configuration, stat))| CandidateSummary {
                index,
                params: family.decode(&configuration).ok(),
                configuration,
                stat,
            })
            .collect();

        Self {
            label: label.to_string(),
            kernel: family.name().to_string(),
            shape,
            trials,
            candidates,
            good_kernel_count,
        }
    }

    /// Fastest candidate by running average; see [`rank_best`].
    pub fn best(&self) -> Option<&CandidateSummary> {
        rank_best(self.candidates.iter().map(|c| &c.stat))
            .map(|index| &self.candidates[index])
    }

    pub fn survivors(&self) -> impl Iterator<Item = &CandidateSummary> {
        self.candidates.iter().filter(|c| c.stat.is_good())
    }

    pub fn best_profile(&self) -> Option<KernelProfile> {
        self.best().map(|candidate| {
            KernelProfile::new(
                &self.kernel,
                candidate.configuration.clone(),
                candidate.stat.average_us,
            )
        })
    }
}

pub fn save_summaries(summaries: &[PassSummary], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let blob = serde_json::to_vec_pretty(summaries)?;
    std::fs::write(path, blob)?;
    Ok(())
}

/// Receives progress and results from the benchmark loop.
pub trait ReportSink {
    fn pass_started(&mut self, label: &str, candidates: usize) -> Result<()>;

    /// Called after every trial round, once pruning has run.
    fn round_finished(&mut self, round: usize, alive: usize) -> Result<()>;

    /// Called exactly once per pass with the full per-candidate results.
    fn pass_finished(&mut self, summary: &PassSummary) -> Result<()>;
}

/// Plain-text report written to any `io::Write`.
pub struct TextReport<W: Write> {
    out: W,
}

impl TextReport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn pass_started(&mut self, label: &str, candidates: usize) -> Result<()> {
        writeln!(self.out, "*** {label}: {candidates} candidate configurations ***")?;
        Ok(())
    }

    fn round_finished(&mut self, round: usize, alive: usize) -> Result<()> {
        writeln!(self.out, "--- trial {round} done, {alive} alive ---")?;
        Ok(())
    }

    fn pass_finished(&mut self, summary: &PassSummary) -> Result<()> {
        writeln!(
            self.out,
            "[{}] {} ({} trials)",
            summary.kernel, summary.shape, summary.trials
        )?;
        writeln!(
            self.out,
            "{:>5}  {:<22} {:<30} {:<8} {:>12} {:>10} {:>10}  detail",
            "idx", "configuration", "params", "status", "avg_us", "gflops", "stddev_us"
        )?;
        for candidate in &summary.candidates {
            let stat = &candidate.stat;
            let status = match (stat.ok, stat.alive) {
                (false, _) => "failed",
                (true, true) => "alive",
                (true, false) => "pruned",
            };
            let params = candidate
                .params
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let detail: Vec<String> = stat.detail.iter().map(|d| d.to_string()).collect();
            writeln!(
                self.out,
                "{:>5}  {:<22} {:<30} {:<8} {:>12.1} {:>10.3} {:>10.1}  [{}]",
                candidate.index,
                candidate.configuration.to_string(),
                params,
                status,
                stat.average_us,
                stat.gflops(),
                stat.std_dev(),
                detail.join(" ")
            )?;
        }

        match summary.best() {
            Some(best) => writeln!(
                self.out,
                "best: #{} {} avg {:.1} us, {:.3} GFLOPS",
                best.index,
                best.configuration,
                best.stat.average_us,
                best.stat.gflops()
            )?,
            None => writeln!(self.out, "best: none")?,
        }
        writeln!(self.out, "good kernels: {}", summary.good_kernel_count)?;
        self.out.flush()?;
        Ok(())
    }
}
