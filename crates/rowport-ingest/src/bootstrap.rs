//! Bootstrap publishing
//!
//! Seed payloads go out before any file is processed. They are selected per
//! connection, validated against the target's current schemas, and posted in
//! ascending agent processing order. The first failure stops everything.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rowport_common::logging::LogLevel;
use rowport_common::IngestionResult;
use rowport_map::{check_compatibility, CompatibilityLevel};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::catalog::{BootstrapData, Catalog};
use crate::client::Publisher;
use crate::ingestion_log::{IngestionLog, IngestionRecord, OPERATION_BOOTSTRAP};

/// A payload chosen for publishing, with the agents that reference it
#[derive(Debug, Clone)]
pub struct PendingBootstrap {
    pub data: BootstrapData,
    pub agent_names: Vec<String>,
    /// Lowest processing order among the referencing agent links
    pub order: i32,
}

/// Payloads linked to active agents of `connection` that are new or changed
pub fn select_payloads(catalog: &dyn Catalog, connection: &str) -> Result<Vec<PendingBootstrap>> {
    let agents: Vec<_> = catalog
        .agents()?
        .into_iter()
        .filter(|a| a.is_active_for(connection))
        .collect();

    let mut pending: Vec<PendingBootstrap> = catalog
        .bootstrap_data()?
        .into_iter()
        .filter(|data| data.needs_processing_for(connection))
        .filter_map(|data| {
            let links: Vec<_> = agents
                .iter()
                .filter_map(|agent| {
                    agent
                        .bootstrap
                        .iter()
                        .find(|link| link.bootstrap_id == data.id)
                        .map(|link| (agent.name.clone(), link.processing_order))
                })
                .collect();

            let order = links.iter().map(|(_, order)| *order).min()?;
            Some(PendingBootstrap {
                agent_names: links.into_iter().map(|(name, _)| name).collect(),
                order,
                data,
            })
        })
        .collect();

    pending.sort_by_key(|p| (p.order, p.data.id));
    Ok(pending)
}

/// Publishes bootstrap payloads for one connection
pub struct BootstrapPublisher<'a> {
    catalog: &'a dyn Catalog,
    publisher: &'a dyn Publisher,
    log: &'a dyn IngestionLog,
    check_metadata: bool,
}

impl<'a> BootstrapPublisher<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        publisher: &'a dyn Publisher,
        log: &'a dyn IngestionLog,
        check_metadata: bool,
    ) -> Self {
        Self {
            catalog,
            publisher,
            log,
            check_metadata,
        }
    }

    /// Publish everything pending; `false` means regular ingestion must not start
    pub async fn run(&self, cancel: &CancellationToken) -> bool {
        match self.publish_all(cancel).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error = %format!("{e:#}"),
                    "Error uploading bootstrap data. Data import cannot proceed."
                );
                false
            },
        }
    }

    async fn publish_all(&self, cancel: &CancellationToken) -> Result<()> {
        let connection = self.publisher.connection_name();

        // Step 1: select payloads
        let pending = select_payloads(self.catalog, connection)?;
        if pending.is_empty() {
            info!(connection, "No bootstrap data to process");
            return Ok(());
        }
        info!(connection, payloads = pending.len(), "Processing bootstrap data");

        // Step 2: check every payload before sending any
        if self.check_metadata {
            for payload in &pending {
                self.check_payload(connection, &payload.data)?;
            }
        }

        // Step 3: publish in order
        for payload in &pending {
            if cancel.is_cancelled() {
                return Err(anyhow!("bootstrap canceled"));
            }
            self.publish(connection, payload, cancel).await?;
            self.catalog
                .mark_bootstrap_processed(payload.data.id, connection, Utc::now())
                .context("Failed to record bootstrap processing")?;
            info!(
                connection,
                bootstrap = %payload.data.name,
                resource = %payload.data.resource_path,
                "Bootstrap data posted"
            );
        }

        Ok(())
    }

    fn check_payload(&self, connection: &str, data: &BootstrapData) -> Result<()> {
        let schema = self
            .catalog
            .resource_schema(connection, &data.resource_path)?;

        let details = match schema {
            Some(schema) => {
                match check_compatibility(
                    &data.resource_path,
                    &schema,
                    &data.data,
                    CompatibilityLevel::Bootstrap,
                ) {
                    Ok(()) => return Ok(()),
                    Err(e) => e.to_string(),
                }
            },
            None => format!("The target API does not describe '{}'.", data.resource_path),
        };

        Err(anyhow!(
            "Cannot insert bootstrap data for ID {} because its '{}' resource metadata differs from that of the target API. The bootstrap data may need to be redefined against this API version. {}",
            data.id,
            data.resource_path,
            details
        ))
    }

    async fn publish(
        &self,
        connection: &str,
        payload: &PendingBootstrap,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let endpoint = format!(
            "{}{}",
            self.publisher.api_url().trim_end_matches('/'),
            payload.data.resource_path
        );

        let elements: Vec<&Value> = match &payload.data.data {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        for element in elements {
            let body = element.to_string();
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(anyhow!("bootstrap canceled")),
                response = self.publisher.post(&endpoint, &body) => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    self.record_failure(connection, payload, &endpoint, &body, None, &e.to_string());
                    return Err(e).context("Failed to POST bootstrap data");
                },
            };

            if !response.status.is_success() {
                let message = format!(
                    "Failed to POST bootstrap data. HTTP Status Code: {}",
                    response.status
                );
                self.record_failure(
                    connection,
                    payload,
                    &endpoint,
                    &body,
                    Some(response.status.as_u16()),
                    &response.body,
                );
                return Err(anyhow!(message));
            }
        }

        Ok(())
    }

    fn record_failure(
        &self,
        connection: &str,
        payload: &PendingBootstrap,
        endpoint: &str,
        body: &str,
        status: Option<u16>,
        response: &str,
    ) {
        let mut record = IngestionRecord::new(IngestionResult::Error, LogLevel::Error, OPERATION_BOOTSTRAP)
            .row(0)
            .endpoint(endpoint)
            .data(body)
            .response(response)
            .file(format!("Bootstrap: {}", payload.data.name))
            .agent(payload.agent_names.join(", "))
            .connection(connection);
        if let Some(status) = status {
            record = record.status(status);
        }
        self.log.write(record);
    }
}
