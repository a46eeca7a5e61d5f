//! Tenant Balancer Binary
//!
//! Runs one balancer instance against the configured registry store until
//! Ctrl-C, a halt request, or a fault.

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use tenant_balancer::config::BalancerConfig;
use tenant_balancer::logging::init_structured_logging;
use tenant_balancer::orchestration::{RequestDispatcher, ServiceExit};
use tenant_balancer::services::{InMemoryDataMover, NeverFailMonitor};
use tenant_balancer::system_context::BalancerContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BalancerConfig::load()?;
    init_structured_logging(&config.telemetry);

    info!(
        backend = ?config.storage.backend,
        local_cluster = %config.service.local_cluster_name,
        "Starting tenant balancer"
    );

    // No pipeline is wired in this binary; movements wait for progress
    let context = BalancerContext::from_config(&config, Arc::new(InMemoryDataMover::new())).await?;
    let balancer_id = context.balancer_id;
    let (dispatcher, handle, _reporter) =
        RequestDispatcher::new(Arc::new(context), Arc::new(NeverFailMonitor));
    let mut service = tokio::spawn(dispatcher.run());

    let outcome = tokio::select! {
        outcome = &mut service => outcome,
        signal = signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            handle.halt(balancer_id).await?;
            service.await
        }
    };

    match outcome? {
        Ok(ServiceExit::Halted { requester_id }) => {
            info!(requester_id = %requester_id, "Tenant balancer halted");
            Ok(())
        }
        Ok(exit) => {
            info!(exit = ?exit, "Tenant balancer stopped");
            Ok(())
        }
        Err(fault) => {
            error!(error = %fault, "Tenant balancer stopped on a fault");
            Err(fault.into())
        }
    }
}
