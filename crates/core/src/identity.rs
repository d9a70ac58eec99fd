// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic crew identity.
//!
//! The crew identity keys per-crew memory storage and log directories:
//! two runs with the same configuration in the same group reuse their
//! memory, two runs in different groups never share it. The hash input
//! is a canonical (sorted-key) JSON document over the configuration
//! fields that define "the same crew".

use crate::crew::CrewConfig;
use crate::id::GroupId;
use sha2::{Digest, Sha256};

/// Derive the stable crew identity for a configuration under a group.
///
/// Precedence:
/// 1. explicit `crew_id` in the config,
/// 2. `database_crew_id` as `crew_db_{id}`,
/// 3. derived `{group_id}_crew_{hash8}` over sorted agent roles, sorted
///    task identifiers, crew name, model, run name and group id.
pub fn crew_identity(config: &CrewConfig, group_id: &GroupId, run_name: Option<&str>) -> String {
    if let Some(explicit) = &config.crew_id {
        return explicit.clone();
    }
    if let Some(db_id) = config.database_crew_id {
        return format!("crew_db_{db_id}");
    }

    let mut agent_roles: Vec<&str> = config.agents.values().map(|a| a.role.as_str()).collect();
    agent_roles.sort_unstable();

    let mut task_names: Vec<String> = config.tasks.values().map(|t| t.identifier()).collect();
    task_names.sort_unstable();

    // serde_json's default map is sorted by key, which gives us the
    // canonical ordering for free.
    let identifier = serde_json::json!({
        "agent_roles": agent_roles,
        "task_names": task_names,
        "crew_name": config.name.as_deref().unwrap_or("unnamed_crew"),
        "model": config.model.as_deref().unwrap_or("default"),
        "run_name": run_name,
        "group_id": group_id.as_str(),
    });

    let canonical = identifier.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let hash8: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    format!("{group_id}_crew_{hash8}")
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
