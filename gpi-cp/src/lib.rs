//! Distributed in-memory checkpointing over a one-sided PGAS messaging
//! substrate.
//!
//! A group of cooperating processes periodically snapshots equal-sized
//! shared memory regions into a neighbor's memory (its "buddy"). If one
//! process fails, a pre-provisioned spare joins, recovers the lost snapshot
//! from the ring of survivors, and the computation resumes from the last
//! committed snapshot.
//!
//! The host application drives the six operations on [`CheckpointDescriptor`]
//! ([`CheckpointDescriptor::init`], [`CheckpointDescriptor::start`],
//! [`CheckpointDescriptor::commit`], [`CheckpointDescriptor::restore`],
//! [`CheckpointDescriptor::finalize`], [`CheckpointDescriptor::read_buddy`])
//! against an implementation of [`substrate::Substrate`], the abstract
//! one-sided messaging capability this crate consumes but does not provide.

mod channel;
mod descriptor;
mod half;
mod policy;
mod restore;
mod segment;
mod state;
mod stats;

pub mod error;
pub mod substrate;
pub mod timeout;

pub use descriptor::CheckpointDescriptor;
pub use policy::Policy;
pub use segment::unused_segment_id;
pub use stats::CpStats;
pub use timeout::Timeout;

/// Library version, reported as `MAJOR + MINOR/10.0`.
pub const VERSION: f32 = 1.0 + 0.0 / 10.0;
