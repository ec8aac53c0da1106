use std::path::Path;
use std::sync::Arc;

use bollard::container::StatsOptions;
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::OrchestrationError;

const UNLIMITED_MEM_THRESHOLD: u64 = 1u64 << 50;

/// One sampling tick for one monitored container (spec §3, "Resource
/// Sample"). Block and net counters are cumulative since container start.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSample {
    pub timestamp_ms_epoch: i64,
    pub cpu_percent: f64,
    pub mem_mb: f64,
    pub mem_limit_mb: f64,
    pub mem_percent: Option<f64>,
    pub blk_read_mb_cum: f64,
    pub blk_write_mb_cum: f64,
    pub net_rx_mb_cum: f64,
    pub net_tx_mb_cum: f64,
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Derive one [`ResourceSample`] from a raw stats snapshot plus the
/// previous one, needed to compute CPU deltas (spec §4.2, "Resource
/// sampler"). Returns `None` for the very first sample, which only serves
/// to prime those deltas.
fn compute_sample(
    prev: &bollard::container::Stats,
    cur: &bollard::container::Stats,
    pid: Option<u32>,
) -> ResourceSample {
    let cpu_delta = cur.cpu_stats.cpu_usage.total_usage as f64 - prev.cpu_stats.cpu_usage.total_usage as f64;
    let system_delta = cur.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
        - prev.cpu_stats.system_cpu_usage.unwrap_or(0) as f64;
    let online_cpus = cur.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;
    let cpu_percent = if system_delta > 0.0 {
        (cpu_delta / system_delta) * online_cpus * 100.0
    } else {
        0.0
    };

    let usage = cur.memory_stats.usage.unwrap_or(0);
    let cache = cur
        .memory_stats
        .stats
        .as_ref()
        .and_then(|s| s.cache)
        .unwrap_or(0);
    let mem_mb = bytes_to_mb(usage.saturating_sub(cache));
    let limit = cur.memory_stats.limit.unwrap_or(0);
    let (mem_limit_mb, mem_percent) = if limit >= UNLIMITED_MEM_THRESHOLD || limit == 0 {
        (bytes_to_mb(limit), None)
    } else {
        (bytes_to_mb(limit), Some(mem_mb / bytes_to_mb(limit) * 100.0))
    };

    let (blk_read, blk_write) = blkio_from_docker(cur)
        .filter(|(r, w)| *r != 0 || *w != 0)
        .or_else(|| pid.and_then(blkio_from_cgroup_v2))
        .or_else(|| pid.and_then(blkio_from_proc))
        .unwrap_or((0, 0));

    let (net_rx, net_tx) = cur
        .networks
        .as_ref()
        .map(|nets| {
            nets.values()
                .fold((0u64, 0u64), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes))
        })
        .unwrap_or((0, 0));

    ResourceSample {
        timestamp_ms_epoch: Utc::now().timestamp_millis(),
        cpu_percent,
        mem_mb,
        mem_limit_mb,
        mem_percent,
        blk_read_mb_cum: bytes_to_mb(blk_read),
        blk_write_mb_cum: bytes_to_mb(blk_write),
        net_rx_mb_cum: bytes_to_mb(net_rx),
        net_tx_mb_cum: bytes_to_mb(net_tx),
    }
}

fn blkio_from_docker(stats: &bollard::container::Stats) -> Option<(u64, u64)> {
    let entries = stats.blkio_stats.io_service_bytes_recursive.as_ref()?;
    let mut read = 0u64;
    let mut write = 0u64;
    for entry in entries {
        match entry.op.as_str() {
            "Read" | "read" => read += entry.value,
            "Write" | "write" => write += entry.value,
            _ => {}
        }
    }
    Some((read, write))
}

/// cgroup v2 `io.stat` fallback, used when the runtime's own blkio
/// counters come back all-zero (spec §4.2).
fn blkio_from_cgroup_v2(pid: u32) -> Option<(u64, u64)> {
    let path = format!("/proc/{pid}/root/sys/fs/cgroup/io.stat");
    let contents = std::fs::read_to_string(path).ok()?;
    let mut read = 0u64;
    let mut write = 0u64;
    for line in contents.lines() {
        for field in line.split_whitespace().skip(1) {
            if let Some(v) = field.strip_prefix("rbytes=") {
                read += v.parse().unwrap_or(0);
            } else if let Some(v) = field.strip_prefix("wbytes=") {
                write += v.parse().unwrap_or(0);
            }
        }
    }
    Some((read, write))
}

/// `/proc/<pid>/io` fallback, the last resort when neither the runtime nor
/// cgroup v2 expose block I/O counters.
fn blkio_from_proc(pid: u32) -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/io")).ok()?;
    let mut read = None;
    let mut write = None;
    for line in contents.lines() {
        if let Some(v) = line.strip_prefix("read_bytes: ") {
            read = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("write_bytes: ") {
            write = v.trim().parse().ok();
        }
    }
    Some((read?, write?))
}

/// Totals over a window given a baseline captured at the window start.
pub fn window_totals(baseline: &ResourceSample, latest: &ResourceSample) -> (f64, f64, f64, f64) {
    (
        latest.blk_read_mb_cum - baseline.blk_read_mb_cum,
        latest.blk_write_mb_cum - baseline.blk_write_mb_cum,
        latest.net_rx_mb_cum - baseline.net_rx_mb_cum,
        latest.net_tx_mb_cum - baseline.net_tx_mb_cum,
    )
}

struct RunningMonitor {
    handle: JoinHandle<()>,
    samples: Arc<Mutex<Vec<ResourceSample>>>,
    stop_tx: oneshot::Sender<()>,
}

/// One monitor instance per DO (spec §4.2: "A single monitor instance per
/// DO"). `start` takes an in-process mutex guarding that single slot;
/// starting while already running is rejected as `MonitorAlreadyRunning`
/// (HTTP 409, spec §6).
#[derive(Default)]
pub struct ResourceMonitor {
    running: Mutex<Option<RunningMonitor>>,
}

impl ResourceMonitor {
    pub async fn start(
        &self,
        docker: Docker,
        container_ref: String,
        interval_s: u64,
        csv_path: Option<String>,
    ) -> Result<(), OrchestrationError> {
        let mut slot = self.running.lock().await;
        if slot.is_some() {
            return Err(OrchestrationError::MonitorAlreadyRunning);
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let samples_for_task = samples.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            run_sampling_loop(docker, container_ref, interval_s, csv_path, samples_for_task, stop_rx).await;
        });

        *slot = Some(RunningMonitor { handle, samples, stop_tx });
        Ok(())
    }

    /// Signals the sampling loop to take one last synchronous sample and
    /// flush its CSV, then waits for it to exit, so window totals computed
    /// right after `stop()` always reflect a sample taken at (or after) the
    /// stop call rather than whatever arrived on the last tick.
    pub async fn stop(&self) -> Result<(), OrchestrationError> {
        let mut slot = self.running.lock().await;
        match slot.take() {
            Some(running) => {
                let _ = running.stop_tx.send(());
                let _ = running.handle.await;
                Ok(())
            }
            None => Err(OrchestrationError::MonitorNotRunning),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn run_sampling_loop(
    docker: Docker,
    container_ref: String,
    interval_s: u64,
    csv_path: Option<String>,
    samples: Arc<Mutex<Vec<ResourceSample>>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let pid = docker
        .inspect_container(&container_ref, None)
        .await
        .ok()
        .and_then(|c| c.state.and_then(|s| s.pid))
        .and_then(|p| u32::try_from(p).ok());

    let mut stream = docker.stats(
        &container_ref,
        Some(StatsOptions {
            stream: true,
            one_shot: false,
        }),
    );

    let mut prev: Option<bollard::container::Stats> = None;
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_s.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(Ok(cur)) = stream.next().await else {
                    break;
                };
                if let Some(prev_stats) = &prev {
                    let sample = compute_sample(prev_stats, &cur, pid);
                    samples.lock().await.push(sample);
                }
                prev = Some(cur);
            }
            _ = &mut stop_rx => {
                if let Some(prev_stats) = &prev {
                    if let Some(cur) = one_shot_stats(&docker, &container_ref).await {
                        let sample = compute_sample(prev_stats, &cur, pid);
                        samples.lock().await.push(sample);
                    }
                }
                break;
            }
        }
    }

    if let Some(path) = csv_path {
        if let Err(err) = write_csv(&path, &samples.lock().await) {
            warn!(%err, path, "failed to write resource monitor CSV");
        } else {
            info!(path, "wrote resource monitor CSV");
        }
    }
}

/// One non-streaming stats read, for the final sample taken on `stop()`.
async fn one_shot_stats(docker: &Docker, container_ref: &str) -> Option<bollard::container::Stats> {
    let mut stream = docker.stats(
        container_ref,
        Some(StatsOptions {
            stream: false,
            one_shot: true,
        }),
    );
    stream.next().await?.ok()
}

fn write_csv(path: impl AsRef<Path>, samples: &[ResourceSample]) -> eyre::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_totals_subtracts_baseline() {
        let baseline = ResourceSample {
            timestamp_ms_epoch: 0,
            cpu_percent: 0.0,
            mem_mb: 0.0,
            mem_limit_mb: 0.0,
            mem_percent: None,
            blk_read_mb_cum: 10.0,
            blk_write_mb_cum: 5.0,
            net_rx_mb_cum: 1.0,
            net_tx_mb_cum: 2.0,
        };
        let latest = ResourceSample {
            blk_read_mb_cum: 30.0,
            blk_write_mb_cum: 9.0,
            net_rx_mb_cum: 4.0,
            net_tx_mb_cum: 6.0,
            ..baseline.clone()
        };
        let (read, write, rx, tx) = window_totals(&baseline, &latest);
        assert_eq!((read, write, rx, tx), (20.0, 4.0, 3.0, 4.0));
    }
}
