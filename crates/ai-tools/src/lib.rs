//! Trace events for deterministic AI runtimes.
//!
//! Events are pushed into a blackboard slot ([`TRACE_LOG`]) or a shared sink ([`TRACE_SINK`]),
//! so a runtime can record what it did without owning any output channel.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod trace;

pub use trace::{
    emit, SharedTraceSink, TraceEvent, TraceLog, TraceSink, VecTraceSink, TRACE_LOG, TRACE_SINK,
};
