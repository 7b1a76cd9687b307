// src/rpc/cdrs.rs
//! CdrApi and ResourceApi over JSON-RPC against the CDR server.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::client::RpcClient;
use crate::error::SessionError;
use crate::models::Event;
use crate::traits::{CdrApi, ResourceApi};

pub struct CdrsClient {
    client: RpcClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CdrArgs<'a> {
    tenant: &'a str,
    event: &'a Event,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReleaseArgs<'a> {
    tenant: &'a str,
    #[serde(rename = "UsageID")]
    usage_id: &'a str,
}

impl CdrsClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        Ok(CdrsClient {
            client: RpcClient::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl CdrApi for CdrsClient {
    async fn process_cdr(&self, tenant: &str, event: &Event) -> Result<(), SessionError> {
        let _reply: String = self
            .client
            .call("CDRsV1.ProcessEvent", CdrArgs { tenant, event })
            .await
            .map_err(|e| SessionError::Cdrs(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ResourceApi for CdrsClient {
    async fn release_resource(&self, tenant: &str, usage_id: &str) -> Result<(), SessionError> {
        let _reply: String = self
            .client
            .call("ResourceSv1.ReleaseResources", ReleaseArgs { tenant, usage_id })
            .await
            .map_err(|e| SessionError::Resource(e.to_string()))?;
        Ok(())
    }
}
