//! Namespace and workload policy resolution.
//!
//! Decides, per namespace, whether this operator manages VPAs there, and
//! which update mode those VPAs should carry. Pure functions over labels and
//! annotations — all cluster reads happen in the callers.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tracing::warn;

use crate::crd::vpa::UpdateMode;

/// Namespace label that opts a namespace in or out of VPA management.
/// The key is matched case-insensitively; the value must parse as a boolean.
pub const ENABLED_LABEL: &str = "vpa.bemade.org/enabled";

/// Annotation (preferred) or label holding the requested VPA update mode.
/// Valid on namespaces (default for all workloads) and on workloads
/// (override for that workload alone).
pub const UPDATE_MODE_KEY: &str = "vpa.bemade.org/update-mode";

/// Process-wide management policy, injected from the CLI.
#[derive(Clone, Debug, Default)]
pub struct PolicyConfig {
    /// Manage namespaces that carry no enablement label.
    pub on_by_default: bool,
    /// Namespace names always managed (unless labeled otherwise).
    pub include_namespaces: Vec<String>,
    /// Namespace names never managed (unless labeled otherwise).
    pub exclude_namespaces: Vec<String>,
}

/// Resolve whether a namespace is managed. First match wins:
/// explicit enablement label, include-list, exclude-list, process default.
///
/// An enablement label that does not parse as a boolean disables the
/// namespace and is reported, never treated as fatal.
pub fn namespace_is_managed(namespace: &Namespace, cfg: &PolicyConfig) -> bool {
    let name = namespace.name_any();

    if let Some(labels) = &namespace.metadata.labels {
        for (key, value) in labels {
            if !key.eq_ignore_ascii_case(ENABLED_LABEL) {
                continue;
            }
            return match parse_bool(value) {
                Some(enabled) => enabled,
                None => {
                    warn!(
                        namespace = %name,
                        label = %key,
                        value = %value,
                        "unsupported enablement label value, defaulting to false"
                    );
                    false
                }
            };
        }
    }

    if cfg.include_namespaces.iter().any(|ns| *ns == name) {
        return true;
    }
    if cfg.exclude_namespaces.iter().any(|ns| *ns == name) {
        return false;
    }

    cfg.on_by_default
}

/// Resolve the update mode requested on an object via annotation (checked
/// first) or label. Returns the mode and whether it was explicitly set;
/// callers substitute their own fallback when it was not.
///
/// A value outside the `{Off, Initial, Recreate, Auto}` enumeration is
/// reported and treated as not explicit.
pub fn update_mode_for(
    annotations: Option<&BTreeMap<String, String>>,
    labels: Option<&BTreeMap<String, String>>,
) -> (UpdateMode, bool) {
    let requested = annotations
        .and_then(|a| a.get(UPDATE_MODE_KEY))
        .or_else(|| labels.and_then(|l| l.get(UPDATE_MODE_KEY)));

    match requested {
        None => (UpdateMode::default(), false),
        Some(value) => match UpdateMode::parse(value) {
            Some(mode) => (mode, true),
            None => {
                warn!(key = UPDATE_MODE_KEY, %value, "unsupported update mode, ignoring");
                (UpdateMode::default(), false)
            }
        },
    }
}

/// Parse a boolean the way Kubernetes tooling conventionally accepts them:
/// `1/t/T/TRUE/true/True` and `0/f/F/FALSE/false/False`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
