//! Copy tracing infrastructure.
//!
//! Provides a trait-based tracing system for the graph copier with zero-cost abstraction.
//! When using [`NoopTracer`], all trace methods compile away entirely via monomorphization,
//! the same way [`NoLimitTracker`](crate::resource::NoLimitTracker) eliminates resource
//! checking overhead.
//!
//! # Architecture
//!
//! The [`CopyTracer`] trait defines hook points at the copier's decisions (identity
//! sharing, visited-table hits, placeholder allocation, filling a copy's children,
//! rollback). Concrete implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable copy log to stderr |
//! | [`ProfilingTracer`] | Per-shape counters, sharing and work-stack depth |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! # Usage
//!
//! ```
//! use replica::{Heap, ListKind, ProfilingTracer, Value, deep_copy_with_tracer};
//!
//! let mut heap = Heap::default();
//! let list = heap.new_list(ListKind::ArrayList, vec![Value::Int(1)]).unwrap();
//! let mut tracer = ProfilingTracer::new();
//! deep_copy_with_tracer(&mut heap, Value::Ref(list), &mut tracer).unwrap();
//! assert_eq!(tracer.report().copies, 1);
//! ```

use ahash::AHashMap;

use crate::{error::CopyError, heap::HeapId, heap::Shape, value::Value};

/// Trace event emitted while copying.
///
/// Used by [`RecordingTracer`] to capture a full trace; serializable so a
/// trace can be dumped as JSON.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A top-level copy started. `root` is `None` for immediate values.
    Start { root: Option<HeapId> },
    /// A heap value was shared by identity instead of copied.
    Shared { original: HeapId },
    /// A reference resolved through the visited table.
    Revisit { original: HeapId, copy: HeapId },
    /// A new copy was allocated and registered before its children.
    Allocate {
        original: HeapId,
        copy: HeapId,
        shape: Shape,
        /// The original's concrete kind could not be rebuilt and a default was used.
        fallback: bool,
    },
    /// A copy's children were copied in.
    Fill {
        copy: HeapId,
        children: usize,
        /// Fills still waiting on the work stack.
        pending: usize,
    },
    /// The copy completed.
    Finish { copies: usize },
    /// The copy failed and its allocations were released.
    Rollback { freed: usize, error: String },
}

/// Trait for copy tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
pub trait CopyTracer: std::fmt::Debug {
    /// Called once per top-level copy, before anything is visited.
    #[inline(always)]
    fn on_start(&mut self, _root: Value) {}

    /// Called when an atomic heap value is returned unchanged.
    #[inline(always)]
    fn on_shared(&mut self, _original: HeapId) {}

    /// Called when a reference is resolved through the visited table.
    ///
    /// This is how cycles close and shared subgraphs stay shared.
    #[inline(always)]
    fn on_revisit(&mut self, _original: HeapId, _copy: HeapId) {}

    /// Called after a placeholder copy is allocated and registered.
    ///
    /// # Arguments
    /// * `shape` - Copy rule applied to the original
    /// * `fallback` - Whether a default kind replaced the original's concrete kind
    #[inline(always)]
    fn on_allocate(&mut self, _original: HeapId, _copy: HeapId, _shape: Shape, _fallback: bool) {}

    /// Called after a copy's children have all been copied in.
    ///
    /// # Arguments
    /// * `children` - Number of elements, entries or slots transferred
    /// * `pending` - Fills still waiting on the work stack
    #[inline(always)]
    fn on_fill(&mut self, _copy: HeapId, _children: usize, _pending: usize) {}

    /// Called when a copy completes successfully.
    #[inline(always)]
    fn on_finish(&mut self, _copies: usize) {}

    /// Called when a copy fails, after its allocations were freed.
    #[inline(always)]
    fn on_rollback(&mut self, _freed: usize, _error: &CopyError) {}
}

impl<T: CopyTracer + ?Sized> CopyTracer for &mut T {
    fn on_start(&mut self, root: Value) {
        (**self).on_start(root);
    }

    fn on_shared(&mut self, original: HeapId) {
        (**self).on_shared(original);
    }

    fn on_revisit(&mut self, original: HeapId, copy: HeapId) {
        (**self).on_revisit(original, copy);
    }

    fn on_allocate(&mut self, original: HeapId, copy: HeapId, shape: Shape, fallback: bool) {
        (**self).on_allocate(original, copy, shape, fallback);
    }

    fn on_fill(&mut self, copy: HeapId, children: usize, pending: usize) {
        (**self).on_fill(copy, children, pending);
    }

    fn on_finish(&mut self, copies: usize) {
        (**self).on_finish(copies);
    }

    fn on_rollback(&mut self, freed: usize, error: &CopyError) {
        (**self).on_rollback(freed, error);
    }
}

// ============================================================================
// NoopTracer: zero-cost default
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl CopyTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable copy log
// ============================================================================

/// Tracer that prints a human-readable copy log to stderr.
///
/// Output format:
/// ```text
/// === copy #4
///   +++ Aggregate #4 -> #7
///   === shared #5
///   +++ Sequence #6 -> #8
///   ... fill #8 children=2 pending=0
///   ... fill #7 children=3 pending=0
///   <<< done, 2 copies
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of lines to print before going quiet. None = unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that stops printing after `limit` lines.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn line(&mut self, line: std::fmt::Arguments<'_>) {
        if self.stopped {
            return;
        }
        eprintln!("{line}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} lines) ---");
            self.stopped = true;
        }
    }
}

impl CopyTracer for StderrTracer {
    fn on_start(&mut self, root: Value) {
        match root.ref_id() {
            Some(id) => self.line(format_args!("=== copy {id}")),
            None => self.line(format_args!("=== copy {root:?}")),
        }
    }

    fn on_shared(&mut self, original: HeapId) {
        self.line(format_args!("  === shared {original}"));
    }

    fn on_revisit(&mut self, original: HeapId, copy: HeapId) {
        self.line(format_args!("  <-> revisit {original} -> {copy}"));
    }

    fn on_allocate(&mut self, original: HeapId, copy: HeapId, shape: Shape, fallback: bool) {
        let note = if fallback { "  (default kind)" } else { "" };
        self.line(format_args!("  +++ {shape} {original} -> {copy}{note}"));
    }

    fn on_fill(&mut self, copy: HeapId, children: usize, pending: usize) {
        self.line(format_args!("  ... fill {copy} children={children} pending={pending}"));
    }

    fn on_finish(&mut self, copies: usize) {
        self.line(format_args!("  <<< done, {copies} copies"));
    }

    fn on_rollback(&mut self, freed: usize, error: &CopyError) {
        self.line(format_args!("  !!! rollback, freed {freed}: {error}"));
    }
}

// ============================================================================
// ProfilingTracer: per-shape counters
// ============================================================================

/// Tracer that collects copy statistics.
///
/// Retrieve results via [`ProfilingTracer::report`]. Counters accumulate
/// across every copy the tracer observes.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    shape_counts: AHashMap<Shape, u64>,
    copies: u64,
    shared: u64,
    revisits: u64,
    fallbacks: u64,
    children: u64,
    max_pending: usize,
    rollbacks: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// Copies allocated per shape, most frequent first.
    pub shape_counts: Vec<(Shape, u64)>,
    /// Total copies allocated.
    pub copies: u64,
    /// Atomic heap values shared by identity.
    pub shared: u64,
    /// References resolved through the visited table.
    pub revisits: u64,
    /// Copies built as a default kind.
    pub fallbacks: u64,
    /// Elements, entries and slots transferred.
    pub children: u64,
    /// Deepest work stack observed.
    pub max_pending: usize,
    /// Copies that failed and were rolled back.
    pub rollbacks: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a report; shape counts are sorted by frequency, then name.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut shape_counts: Vec<_> = self.shape_counts.iter().map(|(&k, &v)| (k, v)).collect();
        shape_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
        ProfilingReport {
            shape_counts,
            copies: self.copies,
            shared: self.shared,
            revisits: self.revisits,
            fallbacks: self.fallbacks,
            children: self.children,
            max_pending: self.max_pending,
            rollbacks: self.rollbacks,
        }
    }
}

impl CopyTracer for ProfilingTracer {
    #[inline]
    fn on_shared(&mut self, _original: HeapId) {
        self.shared += 1;
    }

    #[inline]
    fn on_revisit(&mut self, _original: HeapId, _copy: HeapId) {
        self.revisits += 1;
    }

    #[inline]
    fn on_allocate(&mut self, _original: HeapId, _copy: HeapId, shape: Shape, fallback: bool) {
        *self.shape_counts.entry(shape).or_insert(0) += 1;
        self.copies += 1;
        if fallback {
            self.fallbacks += 1;
        }
    }

    #[inline]
    fn on_fill(&mut self, _copy: HeapId, children: usize, pending: usize) {
        self.children += children as u64;
        self.max_pending = self.max_pending.max(pending);
    }

    fn on_rollback(&mut self, _freed: usize, _error: &CopyError) {
        self.rollbacks += 1;
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Copy Profiling Report ===")?;
        writeln!(f, "Copies allocated:   {}", self.copies)?;
        writeln!(f, "Shared by identity: {}", self.shared)?;
        writeln!(f, "Revisits:           {}", self.revisits)?;
        writeln!(f, "Default kinds:      {}", self.fallbacks)?;
        writeln!(f, "Children copied:    {}", self.children)?;
        writeln!(f, "Max pending fills:  {}", self.max_pending)?;
        writeln!(f, "Rollbacks:          {}", self.rollbacks)?;
        writeln!(f)?;
        writeln!(f, "--- Copies by Shape ---")?;
        for (shape, count) in &self.shape_counts {
            let pct = (*count as f64 / self.copies.max(1) as f64) * 100.0;
            writeln!(f, "  {:<12} {count:>10}  ({pct:>5.1}%)", shape.to_string())?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records all events for post-mortem analysis.
///
/// This is the most expensive tracer (allocates per event), so use it only
/// for debugging or for short copies.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_some_and(|l| self.events.len() >= l) {
            return;
        }
        self.events.push(event);
    }
}

impl CopyTracer for RecordingTracer {
    fn on_start(&mut self, root: Value) {
        self.record(TraceEvent::Start { root: root.ref_id() });
    }

    fn on_shared(&mut self, original: HeapId) {
        self.record(TraceEvent::Shared { original });
    }

    fn on_revisit(&mut self, original: HeapId, copy: HeapId) {
        self.record(TraceEvent::Revisit { original, copy });
    }

    fn on_allocate(&mut self, original: HeapId, copy: HeapId, shape: Shape, fallback: bool) {
        self.record(TraceEvent::Allocate {
            original,
            copy,
            shape,
            fallback,
        });
    }

    fn on_fill(&mut self, copy: HeapId, children: usize, pending: usize) {
        self.record(TraceEvent::Fill {
            copy,
            children,
            pending,
        });
    }

    fn on_finish(&mut self, copies: usize) {
        self.record(TraceEvent::Finish { copies });
    }

    fn on_rollback(&mut self, freed: usize, error: &CopyError) {
        self.record(TraceEvent::Rollback {
            freed,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_respects_limit() {
        let mut tracer = RecordingTracer::with_limit(2);
        tracer.on_start(Value::None);
        tracer.on_shared(HeapId::new(0));
        tracer.on_finish(0);
        assert_eq!(
            tracer.events(),
            &[TraceEvent::Start { root: None }, TraceEvent::Shared { original: HeapId::new(0) }]
        );
    }

    #[test]
    fn events_serialize_with_tags() {
        let json = serde_json::to_string(&TraceEvent::Finish { copies: 3 }).unwrap();
        assert_eq!(json, r#"{"event":"finish","copies":3}"#);
    }

    #[test]
    fn profiling_sorts_shapes_by_frequency() {
        let mut tracer = ProfilingTracer::new();
        let (a, b) = (HeapId::new(0), HeapId::new(1));
        tracer.on_allocate(a, b, Shape::Map, false);
        tracer.on_allocate(a, b, Shape::Sequence, true);
        tracer.on_allocate(a, b, Shape::Sequence, false);
        let report = tracer.report();
        assert_eq!(report.shape_counts, vec![(Shape::Sequence, 2), (Shape::Map, 1)]);
        assert_eq!(report.fallbacks, 1);
    }
}
