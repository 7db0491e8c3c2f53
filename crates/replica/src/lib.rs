#![doc = include_str!("../../../README.md")]
mod copy;
mod error;
mod heap;
mod resource;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    copy::{GraphCopier, VisitedTable, deep_copy, deep_copy_with_tracer},
    error::{CopyError, HeapError, HeapResult, SlotOp},
    heap::{Heap, HeapData, HeapDiff, HeapId, HeapStats, Shape},
    resource::{
        LimitedTracker, MAX_DATA_RECURSION_DEPTH, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    tracer::{CopyTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent},
    types::{
        Access, Array, ClassBuilder, ClassObject, EnumMember, FieldSlot, Initializer, Instance, InstanceInit, List,
        ListKind, LongInt, Map, MapKind, Queue, QueueKind, Set, SetKind, Str, ValueType,
    },
    value::Value,
};
