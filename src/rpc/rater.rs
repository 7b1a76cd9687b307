// src/rpc/rater.rs
//! RaterApi over JSON-RPC: charger fan-out plus account debits and
//! refunds against the rating engine.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::client::RpcClient;
use crate::error::SessionError;
use crate::models::event::{fields, DEFAULT_RUN_ID};
use crate::models::{CallDescriptor, Event};
use crate::traits::{BillingRun, DebitReply, RaterApi};

pub struct RaterClient {
    client: RpcClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChargerArgs<'a> {
    tenant: &'a str,
    event: &'a Event,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChargerReply {
    #[serde(rename = "ChargerSProfile", default)]
    charger_profile: String,
    #[serde(rename = "CGREvent")]
    cgr_event: ChargerEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChargerEvent {
    event: Event,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RefundArgs<'a> {
    #[serde(rename = "CD")]
    cd: &'a CallDescriptor,
    #[serde(rename = "RefundNs")]
    refund_ns: u64,
}

impl RaterClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        Ok(RaterClient {
            client: RpcClient::new(url, timeout)?,
        })
    }

    pub async fn ping(&self) -> Result<bool, SessionError> {
        let reply: String = self.client.call("CoreSv1.Ping", json!({})).await?;
        Ok(reply == "Pong")
    }
}

#[async_trait]
impl RaterApi for RaterClient {
    async fn billing_runs(
        &self,
        tenant: &str,
        event: &Event,
    ) -> Result<Vec<BillingRun>, SessionError> {
        let replies: Vec<ChargerReply> = self
            .client
            .call("ChargerSv1.ProcessEvent", ChargerArgs { tenant, event })
            .await
            .map_err(|e| SessionError::Charger(e.to_string()))?;

        Ok(replies
            .into_iter()
            .map(|r| {
                let run_id = r
                    .cgr_event
                    .event
                    .get_str(fields::RUN_ID)
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| {
                        if r.charger_profile.is_empty() {
                            DEFAULT_RUN_ID.to_string()
                        } else {
                            r.charger_profile.clone()
                        }
                    });
                BillingRun {
                    run_id,
                    event: r.cgr_event.event,
                }
            })
            .collect())
    }

    async fn max_session_time(&self, cd: &CallDescriptor) -> Result<Duration, SessionError> {
        let ns: u64 = self
            .client
            .call("RaterSv1.GetMaxSessionTime", cd)
            .await
            .map_err(|e| SessionError::Rater(e.to_string()))?;
        Ok(Duration::from_nanos(ns))
    }

    async fn max_debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError> {
        self.client
            .call("RaterSv1.MaxDebit", cd)
            .await
            .map_err(|e| match e {
                SessionError::InsufficientBalance => e,
                other => SessionError::Rater(other.to_string()),
            })
    }

    async fn debit(&self, cd: &CallDescriptor) -> Result<DebitReply, SessionError> {
        self.client
            .call("RaterSv1.Debit", cd)
            .await
            .map_err(|e| match e {
                SessionError::InsufficientBalance => e,
                other => SessionError::Rater(other.to_string()),
            })
    }

    async fn refund_increments(
        &self,
        cd: &CallDescriptor,
        refund: Duration,
    ) -> Result<Decimal, SessionError> {
        self.client
            .call(
                "RaterSv1.RefundIncrements",
                RefundArgs {
                    cd,
                    refund_ns: refund.as_nanos() as u64,
                },
            )
            .await
            .map_err(|e| SessionError::Rater(e.to_string()))
    }

    async fn refund_rounding(&self, cd: &CallDescriptor) -> Result<(), SessionError> {
        let _reply: String = self
            .client
            .call("RaterSv1.RefundRounding", cd)
            .await
            .map_err(|e| SessionError::Rater(e.to_string()))?;
        Ok(())
    }
}
