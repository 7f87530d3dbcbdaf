//! Process-wide counters
//!
//! Everything is a relaxed atomic; readers only need eventual totals.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Point-in-time gauge values collected on each scrape
#[derive(Debug, Default)]
pub struct GaugeSnapshot {
    /// Sessions currently in the registry
    pub active_sessions: u64,
    /// Process resident set size in bytes (Linux only)
    pub process_memory_bytes: Option<u64>,
    /// Number of open file descriptors (Linux only)
    pub process_open_fds: Option<u64>,
}

impl GaugeSnapshot {
    /// Collect gauge values from /proc on Linux
    #[cfg(target_os = "linux")]
    pub fn collect_process_metrics(&mut self) {
        // Second field of statm is RSS in pages
        if let Ok(content) = std::fs::read_to_string("/proc/self/statm") {
            let rss_pages = content
                .split_whitespace()
                .nth(1)
                .and_then(|p| p.parse::<u64>().ok());
            if let Some(pages) = rss_pages {
                self.process_memory_bytes = Some(pages * 4096);
            }
        }

        if let Ok(entries) = std::fs::read_dir("/proc/self/fd") {
            self.process_open_fds = Some(entries.count() as u64);
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn collect_process_metrics(&mut self) {}
}

/// Global metrics collector
pub struct Metrics {
    /// Streams opened
    pub sessions_opened_total: AtomicU64,
    /// Streams torn down
    pub sessions_closed_total: AtomicU64,
    /// Token-less POSTs answered as health checks
    pub probes_total: AtomicU64,
    /// Events written to streams
    pub events_emitted_total: AtomicU64,
    /// Tool calls that reached a handler
    pub tool_calls_total: AtomicU64,
    /// Sum of tool call latency in milliseconds
    pub tool_latency_sum_ms: AtomicU64,
    /// Transit API requests
    pub upstream_requests_total: AtomicU64,
    /// Transit API requests that failed or returned garbage
    pub upstream_failures_total: AtomicU64,

    /// Inbound messages by JSON-RPC method
    messages_by_method: DashMap<String, AtomicU64>,
    /// Tool calls by tool name
    tool_calls_by_name: DashMap<String, AtomicU64>,
    /// Errors by kind label
    errors_by_kind: DashMap<String, AtomicU64>,
}

impl Metrics {
    fn new() -> Self {
        Self {
            sessions_opened_total: AtomicU64::new(0),
            sessions_closed_total: AtomicU64::new(0),
            probes_total: AtomicU64::new(0),
            events_emitted_total: AtomicU64::new(0),
            tool_calls_total: AtomicU64::new(0),
            tool_latency_sum_ms: AtomicU64::new(0),
            upstream_requests_total: AtomicU64::new(0),
            upstream_failures_total: AtomicU64::new(0),
            messages_by_method: DashMap::new(),
            tool_calls_by_name: DashMap::new(),
            errors_by_kind: DashMap::new(),
        }
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<Metrics> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe(&self) {
        self.probes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_emitted_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished tool call
    pub fn record_tool_call(&self, tool: &str, latency_ms: u64) {
        self.tool_calls_total.fetch_add(1, Ordering::Relaxed);
        self.tool_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        bump(&self.tool_calls_by_name, tool);
    }

    /// Record one upstream request and whether it succeeded
    pub fn record_upstream(&self, ok: bool) {
        self.upstream_requests_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.upstream_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an inbound message by method name
    pub fn record_message(&self, method: &str) {
        bump(&self.messages_by_method, method);
    }

    /// Record an error by kind label
    pub fn record_error(&self, kind: &str) {
        bump(&self.errors_by_kind, kind);
    }

    /// Current count for an error kind
    #[cfg(test)]
    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors_by_kind
            .get(kind)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Export metrics in Prometheus text format
    pub fn to_prometheus(&self, gauges: &GaugeSnapshot) -> String {
        use std::fmt::Write;

        let mut output = String::with_capacity(2048);

        macro_rules! counter {
            ($name:expr, $help:expr, $value:expr) => {
                let _ = writeln!(output, "# HELP {} {}", $name, $help);
                let _ = writeln!(output, "# TYPE {} counter", $name);
                let _ = writeln!(output, "{} {}", $name, $value.load(Ordering::Relaxed));
            };
        }

        macro_rules! gauge {
            ($name:expr, $help:expr, $value:expr) => {
                let _ = writeln!(output, "# HELP {} {}", $name, $help);
                let _ = writeln!(output, "# TYPE {} gauge", $name);
                let _ = writeln!(output, "{} {}", $name, $value);
            };
        }

        macro_rules! labelled {
            ($name:expr, $help:expr, $label:expr, $map:expr) => {
                if !$map.is_empty() {
                    let _ = writeln!(output, "# HELP {} {}", $name, $help);
                    let _ = writeln!(output, "# TYPE {} counter", $name);
                    for entry in $map.iter() {
                        let _ = writeln!(
                            output,
                            "{}{{{}=\"{}\"}} {}",
                            $name,
                            $label,
                            entry.key(),
                            entry.value().load(Ordering::Relaxed)
                        );
                    }
                }
            };
        }

        counter!(
            "busram_sessions_opened_total",
            "Total event streams opened",
            self.sessions_opened_total
        );
        counter!(
            "busram_sessions_closed_total",
            "Total event streams closed",
            self.sessions_closed_total
        );
        counter!(
            "busram_probes_total",
            "Token-less POSTs answered as health checks",
            self.probes_total
        );
        counter!(
            "busram_events_emitted_total",
            "Total events written to streams",
            self.events_emitted_total
        );
        counter!(
            "busram_tool_calls_total",
            "Total tool calls executed",
            self.tool_calls_total
        );
        counter!(
            "busram_tool_latency_sum_ms",
            "Sum of tool call latency in milliseconds",
            self.tool_latency_sum_ms
        );
        counter!(
            "busram_upstream_requests_total",
            "Total transit API requests",
            self.upstream_requests_total
        );
        counter!(
            "busram_upstream_failures_total",
            "Total failed transit API requests",
            self.upstream_failures_total
        );

        labelled!(
            "busram_messages_total",
            "Inbound messages by method",
            "method",
            self.messages_by_method
        );
        labelled!(
            "busram_tool_calls_by_tool_total",
            "Tool calls by tool name",
            "tool",
            self.tool_calls_by_name
        );
        labelled!(
            "busram_errors_total",
            "Errors by kind",
            "kind",
            self.errors_by_kind
        );

        gauge!(
            "busram_active_sessions",
            "Number of live sessions",
            gauges.active_sessions
        );
        if let Some(memory) = gauges.process_memory_bytes {
            gauge!(
                "busram_process_memory_bytes",
                "Process resident set size in bytes",
                memory
            );
        }
        if let Some(fds) = gauges.process_open_fds {
            gauge!(
                "busram_process_open_fds",
                "Number of open file descriptors",
                fds
            );
        }

        output
    }
}

fn bump(map: &DashMap<String, AtomicU64>, label: &str) {
    map.entry(label.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}
