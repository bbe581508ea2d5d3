//! VerticalPodAutoscaler API types (autoscaling.k8s.io/v1).
//!
//! The VPA is a CRD, not part of the core API, so k8s-openapi does not ship
//! these types. Only the fields this operator reads or writes are declared:
//! target reference, update policy, and the status recommendation.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named resource quantities, e.g. `{"cpu": "25m", "memory": "64Mi"}`.
pub type ResourceList = BTreeMap<String, Quantity>;

// ── Spec ──────────────────────────────────────────────────────────────────────

/// VerticalPodAutoscalerSpec holds the configuration this operator manages:
/// which workload the VPA watches and how aggressively it may act.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "autoscaling.k8s.io",
    version = "v1",
    kind = "VerticalPodAutoscaler",
    shortname = "vpa",
    namespaced,
    status = "VerticalPodAutoscalerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerSpec {
    pub target_ref: CrossVersionObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<PodUpdatePolicy>,
}

/// PodUpdatePolicy wraps the update mode, mirroring the upstream API shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodUpdatePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
}

/// UpdateMode controls whether the VPA recommender may act on its
/// recommendation. `Off` collects recommendations without applying them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UpdateMode {
    #[default]
    Off,
    Initial,
    Recreate,
    Auto,
}

impl UpdateMode {
    /// Parse a user-supplied mode string, normalizing case to the API's
    /// convention (first letter upper, rest lower). Anything outside the
    /// closed enumeration is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let normalized = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect::<String>(),
            None => return None,
        };
        match normalized.as_str() {
            "Off" => Some(Self::Off),
            "Initial" => Some(Self::Initial),
            "Recreate" => Some(Self::Recreate),
            "Auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Off => "Off",
            Self::Initial => "Initial",
            Self::Recreate => "Recreate",
            Self::Auto => "Auto",
        };
        write!(f, "{s}")
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Observed state written by the external VPA recommender. Read-only from
/// this operator's perspective.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerticalPodAutoscalerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendedPodResources>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedPodResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_recommendations: Vec<RecommendedContainerResources>,
}

/// Per-container recommendation bounds as produced by the recommender.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedContainerResources {
    pub container_name: String,

    #[serde(default)]
    pub target: ResourceList,

    #[serde(default)]
    pub lower_bound: ResourceList,

    #[serde(default)]
    pub upper_bound: ResourceList,

    #[serde(default)]
    pub uncapped_target: ResourceList,
}
