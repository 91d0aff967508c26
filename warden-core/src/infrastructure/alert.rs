// warden-core/src/infrastructure/alert.rs
//
// Routes verdicts to configured sinks. The routing document maps a run
// status to the criticalities that warrant noise and the channels that
// receive it; channel delivery goes through the AlertTransport port.
// PASS runs are silent.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::lineage::Criticality;
use crate::domain::verdict::{RunStatus, VerdictReport};
use crate::ports::{AlertTransport, ChannelType};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub routing: HashMap<String, RoutingRule>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingRule {
    /// Only datasets at one of these criticalities alert. Empty = all.
    #[serde(default)]
    pub required_criticality: Vec<Criticality>,
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// Opaque destination (webhook URL, pager key, address).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

pub struct AlertRouter {
    config: AlertConfig,
    transport: Arc<dyn AlertTransport>,
}

impl AlertRouter {
    pub fn new(config: AlertConfig, transport: Arc<dyn AlertTransport>) -> Self {
        Self { config, transport }
    }

    /// Load the routing document; a missing or unparseable file disables
    /// alerting rather than failing runs.
    pub fn from_path(path: &Path, transport: Arc<dyn AlertTransport>) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = ?path, "Unparseable alert config, alerting disabled: {e}");
                    AlertConfig::default()
                }
            },
            Err(_) => {
                debug!(path = ?path, "No alert config found, alerting disabled");
                AlertConfig::default()
            }
        };
        Self::new(config, transport)
    }

    /// Dispatch a verdict. Returns the channels that received it.
    pub async fn dispatch(
        &self,
        report: &VerdictReport,
        criticality: Criticality,
        owner: Option<&str>,
    ) -> Vec<String> {
        // Clean runs stay silent
        if matches!(report.status, RunStatus::Pass | RunStatus::Unchanged) {
            return Vec::new();
        }
        let rule = match self
            .config
            .routing
            .get(report.status.as_str())
            .or_else(|| self.config.routing.get("DEFAULT"))
        {
            Some(rule) => rule,
            None => return Vec::new(),
        };

        if !rule.required_criticality.is_empty()
            && !rule.required_criticality.contains(&criticality)
        {
            debug!(
                table = %report.table_name,
                status = %report.status,
                %criticality,
                "Alert suppressed: dataset below required criticality"
            );
            return Vec::new();
        }

        let mut delivered = Vec::new();
        for channel_name in &rule.channels {
            let Some(channel) = self.config.channels.get(channel_name) else {
                warn!(channel = %channel_name, "Alert channel not configured, skipping");
                continue;
            };
            let payload = Self::build_payload(channel.channel_type, report, criticality, owner);
            match self
                .transport
                .deliver(channel_name, channel.channel_type, &payload)
                .await
            {
                Ok(()) => delivered.push(channel_name.clone()),
                Err(e) => warn!(channel = %channel_name, "Alert delivery failed: {e}"),
            }
        }
        delivered
    }

    /// Per-type payloads: pagers get an incident shape, webhooks and email
    /// get the summary shape.
    fn build_payload(
        channel_type: ChannelType,
        report: &VerdictReport,
        criticality: Criticality,
        owner: Option<&str>,
    ) -> serde_json::Value {
        let reason = report
            .critical_errors
            .first()
            .map(|e| e.message.clone())
            .or_else(|| report.warnings.first().map(|w| w.message.clone()))
            .unwrap_or_else(|| "No detail".to_string());

        match channel_type {
            ChannelType::Pager => json!({
                "event_action": "trigger",
                "severity": if report.status == RunStatus::Fail { "critical" } else { "warning" },
                "summary": format!("{}: {}", report.status, report.table_name),
                "source": report.file,
                "custom_details": {
                    "criticality": criticality,
                    "owner": owner,
                    "reason": reason,
                },
            }),
            ChannelType::Webhook => json!({
                "status": report.status,
                "table_name": report.table_name,
                "file": report.file,
                "criticality": criticality,
                "owner": owner,
                "reason": reason,
                "critical_errors": report.critical_errors,
                "warnings": report.warnings,
            }),
            ChannelType::Email => json!({
                "subject": format!("[{}] Data gate verdict for {}", report.status, report.table_name),
                "to_owner": owner,
                "body": format!(
                    "Status: {}\nTable: {}\nFile: {}\nCriticality: {}\nReason: {}",
                    report.status, report.table_name, report.file, criticality, reason
                ),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::lineage::TablePriority;
    use crate::domain::verdict::{ErrorKind, GateIssue, SchemaEvolution};
    use crate::error::WardenError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct RecordingTransport {
        delivered: Mutex<Vec<(String, ChannelType, serde_json::Value)>>,
    }

    #[async_trait]
    impl AlertTransport for RecordingTransport {
        async fn deliver(
            &self,
            channel_name: &str,
            channel_type: ChannelType,
            payload: &serde_json::Value,
        ) -> Result<(), WardenError> {
            self.delivered.lock().unwrap().push((
                channel_name.to_string(),
                channel_type,
                payload.clone(),
            ));
            Ok(())
        }
    }

    fn config() -> AlertConfig {
        serde_yaml::from_str(
            r#"
routing:
  FAIL:
    required_criticality: [HIGH, CRITICAL]
    channels: [oncall-pager, data-alerts]
  PASS_WITH_WARNINGS:
    channels: [data-alerts]
channels:
  oncall-pager:
    type: pager
    target: service-key
  data-alerts:
    type: webhook
    target: https://hooks.example.com/data
"#,
        )
        .unwrap()
    }

    fn report(status: RunStatus) -> VerdictReport {
        VerdictReport {
            timestamp: chrono::Utc::now(),
            file: "data/landing/transactions.csv".into(),
            table_name: "transactions".into(),
            status,
            execution_time: "0.1s".into(),
            critical_errors: if status == RunStatus::Fail {
                vec![GateIssue::new(ErrorKind::SchemaCritical, "missing column")]
            } else {
                vec![]
            },
            warnings: vec![],
            stats_summary: BTreeMap::new(),
            quarantine_indices: vec![],
            execution_log: vec![],
            quality_metrics: None,
            health_indicator: None,
            table_priority: TablePriority::default(),
            seasonal_analysis: None,
            consistency_result: None,
            schema_evolution: SchemaEvolution::default(),
            inferred_contract: None,
            active_contract: None,
        }
    }

    fn router() -> (Arc<RecordingTransport>, AlertRouter) {
        let transport = Arc::new(RecordingTransport {
            delivered: Mutex::new(Vec::new()),
        });
        let router = AlertRouter::new(config(), transport.clone());
        (transport, router)
    }

    #[tokio::test]
    async fn test_fail_on_high_criticality_pages() {
        let (transport, router) = router();
        let delivered = router
            .dispatch(&report(RunStatus::Fail), Criticality::High, Some("payments"))
            .await;
        assert_eq!(delivered, vec!["oncall-pager", "data-alerts"]);

        let recorded = transport.delivered.lock().unwrap();
        assert_eq!(recorded[0].1, ChannelType::Pager);
        assert_eq!(recorded[0].2["severity"], "critical");
    }

    #[tokio::test]
    async fn test_fail_on_low_criticality_is_suppressed() {
        let (transport, router) = router();
        let delivered = router
            .dispatch(&report(RunStatus::Fail), Criticality::Low, None)
            .await;
        assert!(delivered.is_empty());
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pass_is_silent() {
        let (transport, router) = router();
        let delivered = router
            .dispatch(&report(RunStatus::Pass), Criticality::Critical, None)
            .await;
        assert!(delivered.is_empty());
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warning_rule_without_criticality_filter() {
        let (_, router) = router();
        let delivered = router
            .dispatch(
                &report(RunStatus::PassWithWarnings),
                Criticality::Low,
                None,
            )
            .await;
        assert_eq!(delivered, vec!["data-alerts"]);
    }
}
