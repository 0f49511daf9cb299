//! gol Environment Abstraction Layer
//!
//! This crate provides the seams that let the lobby engine run both in
//! **Production** (tokio) and in the **Simulation** harness:
//!
//! - Time (`now()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Randomness (`random_below()`)
//! - Redraw delivery (`RenderSink::notify()`)
//!
//! The transport that owns remote sessions is outside this workspace. It
//! hands each participant's render sink to the core as an opaque
//! `Arc<dyn RenderSink>`.
//!
//! # Example
//!
//! ```ignore
//! use gol_env::{LifeContext, RenderSink, SinkEvent};
//!
//! async fn redraw_loop<Ctx: LifeContext>(ctx: &Ctx, sink: &dyn RenderSink) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(50)).await;
//!         let _ = sink.notify(SinkEvent::GenerationAdvanced);
//!     }
//! }
//! ```

mod context;
mod error;
mod sink;
mod tokio_impl;
mod types;

pub use context::LifeContext;
pub use error::EnvError;
pub use sink::{ChannelSink, RenderSink, SinkEvent};
pub use tokio_impl::TokioContext;
pub use types::{LobbyId, ParticipantId};
