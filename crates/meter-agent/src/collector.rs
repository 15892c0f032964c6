//! Runtime sampling.
//!
//! Each tick produces the same set of gauge names plus one `PollCount`
//! counter. Sampling is read-only and never fails; a statistic the
//! platform cannot report is sent as zero.

use meter_core::Metric;
use rand::Rng;
use sysinfo::{Pid, System};

/// Anything that can produce a batch of metrics on demand.
pub trait Collector: Send {
    fn collect(&mut self) -> Vec<Metric>;
}

/// Host and process statistics via `sysinfo`.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
    /// Ticks sampled so far.
    poll_count: i64,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            poll_count: 0,
        }
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn collect(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        self.system.refresh_cpu();
        self.poll_count += 1;

        let sys = &self.system;
        let load = System::load_average();
        let mut metrics = vec![
            Metric::gauge("TotalMemory", sys.total_memory() as f64),
            Metric::gauge("UsedMemory", sys.used_memory() as f64),
            Metric::gauge("FreeMemory", sys.free_memory() as f64),
            Metric::gauge("AvailableMemory", sys.available_memory() as f64),
            Metric::gauge("TotalSwap", sys.total_swap() as f64),
            Metric::gauge("UsedSwap", sys.used_swap() as f64),
            Metric::gauge("CPUutilization", sys.global_cpu_info().cpu_usage() as f64),
            Metric::gauge("LoadAverage1", load.one),
            Metric::gauge("LoadAverage5", load.five),
            Metric::gauge("LoadAverage15", load.fifteen),
        ];

        let (resident, virt, cpu) = match self.pid {
            Some(pid) if self.system.refresh_process(pid) => match self.system.process(pid) {
                Some(p) => (p.memory() as f64, p.virtual_memory() as f64, p.cpu_usage() as f64),
                None => (0.0, 0.0, 0.0),
            },
            _ => (0.0, 0.0, 0.0),
        };
        metrics.push(Metric::gauge("ProcessResident", resident));
        metrics.push(Metric::gauge("ProcessVirtual", virt));
        metrics.push(Metric::gauge("ProcessCPU", cpu));

        metrics.push(Metric::gauge(
            "RandomValue",
            rand::thread_rng().gen_range(0.0..1.0),
        ));
        // One tick, one increment; the server holds the running total.
        metrics.push(Metric::counter("PollCount", 1));
        metrics
    }
}

#[cfg(test)]
mod tests {
    use meter_core::{MetricKind, MetricValue};

    use super::*;

    #[test]
    fn shape_is_stable_across_ticks() {
        let mut collector = RuntimeCollector::new();
        let first: Vec<String> = collector.collect().into_iter().map(|m| m.name).collect();
        let second: Vec<String> = collector.collect().into_iter().map(|m| m.name).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 15);
    }

    #[test]
    fn exactly_one_counter_per_tick() {
        let mut collector = RuntimeCollector::new();
        let batch = collector.collect();
        let counters: Vec<&Metric> = batch
            .iter()
            .filter(|m| m.kind() == MetricKind::Counter)
            .collect();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].name, "PollCount");
        assert_eq!(counters[0].value, MetricValue::Counter(1));
    }

    #[test]
    fn poll_count_tracks_ticks() {
        let mut collector = RuntimeCollector::new();
        for _ in 0..3 {
            collector.collect();
        }
        assert_eq!(collector.poll_count(), 3);
    }

    #[test]
    fn gauges_are_finite() {
        let mut collector = RuntimeCollector::new();
        for metric in collector.collect() {
            if let MetricValue::Gauge(v) = metric.value {
                assert!(v.is_finite(), "{} = {v}", metric.name);
            }
        }
    }
}
