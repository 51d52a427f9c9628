//! # Frame Sync
//!
//! Lock-step frame synchronization against a synchronous simulation host.
//!
//! Every `tick` advances the host clock once and returns exactly one
//! `FrameSet` for the tick the host reports. Each sensor delivers through
//! its own callback into an unbounded queue; its `SensorHandle` pops from
//! that queue until the frame for the current tick shows up, bounded by a
//! timeout, and a per-sensor decimation state machine decides which ticks
//! are read at all.
//!
//! ## Usage
//!
//! ```ignore
//! use frame_sync::AcquisitionScope;
//!
//! let mut scope = AcquisitionScope::enter(host.clone(), &timing, sensors, Some(host.world_source()))?;
//! while running {
//!     let frame_set = scope.tick(timing.read_timeout()).await?;
//!     // extract, dispatch
//! }
//! let summary = scope.exit();
//! ```

mod decimation;
mod error;
mod handle;
mod queue;
mod scope;
mod synchronizer;

pub use decimation::{Decimation, DecimationState};
pub use error::{Result, SyncError};
pub use handle::{HandleStats, SensorHandle};
pub use scope::{AcquisitionScope, ScopeSummary};
pub use synchronizer::{world_time, FrameSynchronizer, SyncState};
