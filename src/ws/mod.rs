//! Live results fan-out: every successful vote becomes a snapshot on the
//! results channel, and the broadcaster pushes it to every observer socket
//! connected to the live listener.

mod acceptor;
mod broadcaster;
mod registry;
mod results_channel;

pub use acceptor::*;
pub use broadcaster::*;
pub use registry::*;
pub use results_channel::*;

use axum::{Router, routing::get};

pub fn live_router(state: LiveState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}
