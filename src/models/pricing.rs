//! Capability and pricing advertisement.
//!
//! Served verbatim at `GET /` for external billing collaborators. The shape
//! is fixed: a list with one service entry whose `pricing` array holds one
//! row per operation plus a default row marked with `"rpc": true`.

use serde::{Serialize, Serializer};

/// Operations exposed by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Put,
}

/// Which requests a price row applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcSelector {
    Operation(Operation),
    /// Fallback row used when no specific operation matches.
    Default,
}

impl Serialize for RpcSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RpcSelector::Operation(op) => op.serialize(serializer),
            RpcSelector::Default => serializer.serialize_bool(true),
        }
    }
}

/// Unit prices in satoshis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceEntry {
    pub rpc: RpcSelector,
    #[serde(rename = "per-req")]
    pub per_req: u64,
    /// Per 1000 bytes transferred.
    #[serde(rename = "per-kb")]
    pub per_kb: u64,
    /// Keep-alive fee, stores only.
    #[serde(rename = "per-hour", skip_serializing_if = "Option::is_none")]
    pub per_hour: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(rename = "pricing-type")]
    pub pricing_type: String,
    pub pricing: Vec<PriceEntry>,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "hashfs/1".into(),
            pricing_type: "per-rpc".into(),
            pricing: vec![
                PriceEntry {
                    rpc: RpcSelector::Operation(Operation::Get),
                    per_req: 1,
                    per_kb: 10,
                    per_hour: None,
                },
                PriceEntry {
                    rpc: RpcSelector::Operation(Operation::Put),
                    per_req: 1,
                    per_kb: 10,
                    per_hour: Some(2),
                },
                PriceEntry {
                    rpc: RpcSelector::Default,
                    per_req: 1,
                    per_kb: 10,
                    per_hour: None,
                },
            ],
        }
    }
}
