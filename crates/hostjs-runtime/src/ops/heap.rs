//! The Heap Reporter (§4.6): a snapshot of current memory/registry state
//! for diagnostics.
//!
//! JavaScriptCore's public API exposes no heap-census API (no equivalent of
//! V8's `HeapStatistics`), so the snapshot is synthesized from what this
//! crate already tracks: the Memory Monitor's last RSS sample and the
//! Registry's live-value census (Open Question Resolution #2).

use crate::memory::MemoryMonitor;
use crate::registry::Registry;
use crate::value::{TypeTag, Value};

#[derive(Clone, Copy, Debug)]
pub struct HeapReport {
    pub approximate_used_bytes: u64,
    pub soft_limit_bytes: u64,
    pub hard_limit_bytes: u64,
    pub soft_limit_reached: bool,
    pub hard_limit_reached: bool,
    pub live_value_count: usize,
}

pub fn report(registry: &Registry, memory: &MemoryMonitor) -> HeapReport {
    HeapReport {
        approximate_used_bytes: memory.last_sampled_bytes(),
        soft_limit_bytes: memory.soft_limit(),
        hard_limit_bytes: memory.hard_limit(),
        soft_limit_reached: memory.is_soft_reached(),
        hard_limit_reached: memory.is_hard_reached(),
        live_value_count: registry.count(),
    }
}

/// `heap_stats()` (§4.6): a JSON object Value with the fields named in the
/// spec. JavaScriptCore has no public API for `total_physical_size` or
/// `total_heap_size_executable`; both are reported equal to the sampled RSS
/// figure, which is the only physical-memory number this crate has access
/// to (Open Question Resolution #1).
pub fn heap_stats_value(registry: &Registry, memory: &MemoryMonitor) -> Value {
    let r = report(registry, memory);
    let json = serde_json::json!({
        "total_physical_size": r.approximate_used_bytes,
        "total_heap_size_executable": r.approximate_used_bytes,
        "total_heap_size": r.approximate_used_bytes,
        "used_heap_size": r.approximate_used_bytes,
        "heap_size_limit": r.hard_limit_bytes,
    });
    Value::string(TypeTag::String, &json.to_string())
}

/// `heap_snapshot()` (§4.6): JavaScriptCore's C API has no heap-snapshot
/// serialization entry point (unlike `v8::HeapProfiler`). Resolved (Open
/// Question Resolution #2) by synthesizing a JSON summary carrying the same
/// figures as `heap_stats_value` plus the Registry's live-value census,
/// explicitly tagged as a summary rather than a V8-format snapshot.
pub fn heap_snapshot_value(registry: &Registry, memory: &MemoryMonitor) -> Value {
    let r = report(registry, memory);
    let json = serde_json::json!({
        "kind": "summary",
        "approximate_used_bytes": r.approximate_used_bytes,
        "soft_limit_bytes": r.soft_limit_bytes,
        "hard_limit_bytes": r.hard_limit_bytes,
        "soft_limit_reached": r.soft_limit_reached,
        "hard_limit_reached": r.hard_limit_reached,
        "live_value_count": r.live_value_count,
    });
    Value::string(TypeTag::String, &json.to_string())
}
