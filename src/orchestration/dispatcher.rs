//! # Request Dispatcher
//!
//! The balancer's single control loop.
//!
//! ## Architecture
//!
//! ```text
//! BalancerHandle ──→ command channel ──┐
//! PipelineReporter ─→ event channel ───┤
//! wait_failure() ──→ waiter channel ───┼──→ RequestDispatcher::run ──→ JoinSet<per-request task>
//! FailureMonitor ──→ peer_failed() ────┘
//! ```
//!
//! Requests are accepted in arrival order and each runs in its own task, so
//! replies may come back in any order. The loop itself holds no locks; the
//! registry is the only shared state.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::commands::BalancerCommand;
use super::handle::BalancerHandle;
use super::handlers::{apply_pipeline_event, spawn_command};
use crate::error::{BalancerError, BalancerResult};
use crate::services::{FailureMonitor, PipelineEvent, PipelineReporter};
use crate::system_context::BalancerContext;

/// Why the dispatcher stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceExit {
    /// A client asked the service to stop
    Halted { requester_id: Uuid },
    /// The monitored peer was declared failed
    PeerFailed,
    /// Every handle was dropped
    ChannelClosed,
}

pub struct RequestDispatcher {
    context: Arc<BalancerContext>,
    failure_monitor: Arc<dyn FailureMonitor>,
    command_receiver: mpsc::Receiver<BalancerCommand>,
    pipeline_receiver: mpsc::Receiver<PipelineEvent>,
    wait_failure_receiver: mpsc::Receiver<oneshot::Sender<()>>,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("balancer_id", &self.context.balancer_id)
            .finish()
    }
}

impl RequestDispatcher {
    /// Create the dispatcher together with the client handle and the
    /// pipeline's progress reporter
    pub fn new(
        context: Arc<BalancerContext>,
        failure_monitor: Arc<dyn FailureMonitor>,
    ) -> (Self, BalancerHandle, PipelineReporter) {
        let service = &context.service_config;
        let (command_sender, command_receiver) = mpsc::channel(service.command_buffer_size);
        let (pipeline_sender, pipeline_receiver) =
            mpsc::channel(service.pipeline_event_buffer_size);
        let (wait_failure_sender, wait_failure_receiver) =
            mpsc::channel(service.command_buffer_size);

        let dispatcher = Self {
            context,
            failure_monitor,
            command_receiver,
            pipeline_receiver,
            wait_failure_receiver,
        };
        (
            dispatcher,
            BalancerHandle::new(command_sender, wait_failure_sender),
            PipelineReporter::new(pipeline_sender),
        )
    }

    /// Run until halted, the peer fails, or every handle is dropped.
    ///
    /// Returns `InternalFault` when a request task hit a fault that is not any
    /// single caller's; the service must then be restarted.
    pub async fn run(self) -> BalancerResult<ServiceExit> {
        let Self {
            context,
            failure_monitor,
            mut command_receiver,
            mut pipeline_receiver,
            mut wait_failure_receiver,
        } = self;

        let mut tasks: JoinSet<BalancerResult<()>> = JoinSet::new();
        let mut peer_failure = failure_monitor.peer_failed();
        // Held, never answered: peers learn of our death when these drop
        let mut failure_waiters: Vec<oneshot::Sender<()>> = Vec::new();
        let mut pipeline_open = true;
        let mut waiters_open = true;

        info!(
            balancer_id = %context.balancer_id,
            "🚀 BALANCER: Request dispatcher started"
        );

        let exit = loop {
            tokio::select! {
                command = command_receiver.recv() => {
                    match command {
                        Some(BalancerCommand::Halt { request, resp }) => {
                            info!(
                                balancer_id = %context.balancer_id,
                                requester_id = %request.requester_id,
                                "🛑 BALANCER: Halt requested"
                            );
                            let _ = resp.send(Ok(()));
                            break ServiceExit::Halted { requester_id: request.requester_id };
                        }
                        Some(BalancerCommand::Movement(command)) => {
                            spawn_command(&mut tasks, Arc::clone(&context), command);
                        }
                        None => {
                            info!(balancer_id = %context.balancer_id, "Command channel closed");
                            break ServiceExit::ChannelClosed;
                        }
                    }
                }

                event = pipeline_receiver.recv(), if pipeline_open => {
                    match event {
                        Some(event) => {
                            tasks.spawn(apply_pipeline_event(Arc::clone(&context), event));
                        }
                        None => {
                            debug!("Pipeline event channel closed");
                            pipeline_open = false;
                        }
                    }
                }

                waiter = wait_failure_receiver.recv(), if waiters_open => {
                    match waiter {
                        Some(waiter) => failure_waiters.push(waiter),
                        None => waiters_open = false,
                    }
                }

                _ = &mut peer_failure => {
                    warn!(balancer_id = %context.balancer_id, "Monitored peer failed, stopping");
                    break ServiceExit::PeerFailed;
                }

                Some(outcome) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(fault) = check_task_outcome(outcome) {
                        error!(
                            balancer_id = %context.balancer_id,
                            error = %fault,
                            "💥 BALANCER: Request task fault, stopping dispatcher"
                        );
                        tasks.shutdown().await;
                        return Err(fault);
                    }
                }
            }
        };

        // Stop accepting; anything already queued is told we are gone
        command_receiver.close();
        let mut rejected = 0usize;
        while let Ok(command) = command_receiver.try_recv() {
            debug!(command = command.name(), "Rejecting request buffered at shutdown");
            command.reject(BalancerError::ServiceHalted);
            rejected += 1;
        }

        drain_tasks(&context, &mut tasks, rejected).await?;

        info!(
            balancer_id = %context.balancer_id,
            exit = ?exit,
            waiters = failure_waiters.len(),
            "✅ BALANCER: Request dispatcher stopped"
        );
        Ok(exit)
    }
}

/// Let in-flight requests finish, bounded by the halt drain timeout
async fn drain_tasks(
    context: &BalancerContext,
    tasks: &mut JoinSet<BalancerResult<()>>,
    rejected: usize,
) -> BalancerResult<()> {
    let in_flight = tasks.len();
    debug!(in_flight = in_flight, rejected = rejected, "Draining request tasks");

    let deadline = Instant::now() + context.service_config.halt_drain_timeout();
    let drained = tokio::time::timeout_at(deadline, async {
        while let Some(outcome) = tasks.join_next().await {
            check_task_outcome(outcome)?;
        }
        Ok::<(), BalancerError>(())
    })
    .await;

    match drained {
        Ok(Ok(())) => Ok(()),
        Ok(Err(fault)) => {
            tasks.shutdown().await;
            Err(fault)
        }
        Err(_) => {
            warn!(
                remaining = tasks.len(),
                "Halt drain timed out, aborting remaining request tasks"
            );
            tasks.shutdown().await;
            Ok(())
        }
    }
}

fn check_task_outcome(outcome: Result<BalancerResult<()>, JoinError>) -> BalancerResult<()> {
    match outcome {
        Ok(result) => result,
        Err(join_error) if join_error.is_cancelled() => Ok(()),
        Err(join_error) => Err(BalancerError::internal(format!(
            "request task panicked: {join_error}"
        ))),
    }
}
