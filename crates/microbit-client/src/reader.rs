//! Background reader loop.
//!
//! Exactly one task pulls lines from the link. Each line is decoded and
//! handed to the [`Router`]; malformed and unmatched lines are dropped. When
//! the link closes or fails the router is closed, which wakes every waiter.

use std::sync::Arc;

use microbit_link::{LineReader, LinkError};
use microbit_protocol::Response;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::router::{DispatchOutcome, Router};

/// Spawn the reader loop on the current runtime.
pub fn spawn_reader(reader: LineReader, router: Arc<Router>) -> JoinHandle<()> {
    tokio::spawn(run_reader(reader, router))
}

/// Read, decode and dispatch until the link goes away.
pub async fn run_reader(mut reader: LineReader, router: Arc<Router>) {
    loop {
        let line = match reader.read_line().await {
            Ok(line) => line,
            Err(LinkError::NotConnected) => {
                debug!("link closed, reader loop stopping");
                break;
            }
            Err(e) => {
                warn!(error = %e, "serial read failed, reader loop stopping");
                break;
            }
        };

        let Some(response) = Response::decode(&line) else {
            debug!(line = %line, "discarding malformed line");
            continue;
        };

        match router.dispatch(response) {
            DispatchOutcome::Fulfilled(id) => trace!(id, line = %line, "routed response"),
            DispatchOutcome::Unmatched(response) => {
                debug!(?response, "no pending wait for response")
            }
        }
    }

    router.close();
}
