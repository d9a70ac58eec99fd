// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant group context.
//!
//! Every operation in the core runs on behalf of exactly one resolved
//! [`GroupContext`]. The context is derived once at API entry from the
//! forwarded identity headers plus the user's group memberships, and is
//! immutable afterwards: it travels through async call chains as a
//! value, into background writers as envelope fields, and into worker
//! processes as the primitive-only [`WorkerGroupContext`].

use crate::error::CoreError;
use crate::id::GroupId;
use serde::{Deserialize, Serialize};

/// Role of a user within a group. Ordering: admin > editor > operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Admin,
    Editor,
    Operator,
}

crate::simple_display! {
    GroupRole {
        Admin => "admin",
        Editor => "editor",
        Operator => "operator",
    }
}

impl GroupRole {
    /// Strength for `highest_role` comparison; higher wins.
    pub fn rank(&self) -> u8 {
        match self {
            GroupRole::Admin => 3,
            GroupRole::Editor => 2,
            GroupRole::Operator => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "editor" => Some(Self::Editor),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// Derive a group ID from an email domain.
///
/// `acme-corp.com` → `acme_corp_com`: dots and dashes become
/// underscores, lowercased.
pub fn group_id_for_domain(domain: &str) -> GroupId {
    GroupId::new(domain.replace(['.', '-'], "_").to_lowercase())
}

/// Derive the personal-workspace group ID for an email.
///
/// `alice@company.com` → `user_alice_company_com`. The sanitization must
/// match exactly on every node: a requested `user_*` group is authorized
/// by string equality against this derivation.
pub fn personal_group_id(email: &str) -> GroupId {
    let sanitized = email.replace(['@', '.', '-', '+'], "_");
    GroupId::new(format!("user_{sanitized}").to_lowercase())
}

/// One group membership with the user's role in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub role: GroupRole,
}

/// Request-scoped tenant identity. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContext {
    /// All groups visible to this request; element 0 is primary and is
    /// the group stamped onto new rows.
    group_ids: Vec<GroupId>,
    group_email: String,
    email_domain: String,
    user_id: Option<String>,
    /// Forwarded identity token for user-on-behalf-of calls downstream.
    access_token: Option<String>,
    /// Role in the selected (primary) group.
    user_role: Option<GroupRole>,
    /// Strongest role across all memberships, used for authorization.
    highest_role: Option<GroupRole>,
}

impl GroupContext {
    /// Resolve a context from an email and the user's memberships.
    ///
    /// `requested` is the optional explicit group selector. It must be
    /// either one of the user's memberships or the user's own personal
    /// workspace ID; anything else is a hard authorization failure.
    ///
    /// When the personal workspace is selected, authorization uses
    /// `highest_role` while data filtering uses the workspace ID, so an
    /// admin can browse their private workspace without escalating any
    /// other group.
    pub fn resolve(
        email: &str,
        memberships: &[Membership],
        requested: Option<&GroupId>,
    ) -> Result<Self, CoreError> {
        let Some((_, domain)) = email.split_once('@') else {
            return Err(CoreError::forbidden("valid user email required"));
        };

        let highest_role = memberships.iter().map(|m| m.role).max_by_key(GroupRole::rank);
        let personal = personal_group_id(email);

        let (group_ids, user_role) = if memberships.is_empty() {
            // No memberships: private data space regardless of selector.
            if let Some(req) = requested {
                if *req != personal {
                    return Err(CoreError::forbidden(format!(
                        "user does not have access to group {req}"
                    )));
                }
            }
            (vec![personal], None)
        } else {
            match requested {
                Some(req) => {
                    if let Some(m) = memberships.iter().find(|m| m.group_id == *req) {
                        let mut ids = vec![m.group_id.clone()];
                        ids.extend(
                            memberships
                                .iter()
                                .filter(|o| o.group_id != *req)
                                .map(|o| o.group_id.clone()),
                        );
                        (ids, Some(m.role))
                    } else if req.starts_with("user_") {
                        if *req != personal {
                            return Err(CoreError::forbidden(format!(
                                "user does not have access to group {req}"
                            )));
                        }
                        let mut ids = vec![personal];
                        ids.extend(memberships.iter().map(|m| m.group_id.clone()));
                        (ids, highest_role)
                    } else {
                        return Err(CoreError::forbidden(format!(
                            "user does not have access to group {req}"
                        )));
                    }
                }
                None => {
                    let ids = memberships.iter().map(|m| m.group_id.clone()).collect();
                    (ids, memberships.first().map(|m| m.role))
                }
            }
        };

        Ok(Self {
            group_ids,
            group_email: email.to_string(),
            email_domain: domain.to_string(),
            user_id: None,
            access_token: None,
            user_role,
            highest_role,
        })
    }

    /// Attach the resolved user id. Named `with_` to avoid colliding
    /// with the [`GroupContext::user_id`] accessor.
    pub fn with_user_id(mut self, v: impl Into<String>) -> Self {
        self.user_id = Some(v.into());
        self
    }

    /// Attach the forwarded identity token. Named `with_` to avoid
    /// colliding with the [`GroupContext::access_token`] accessor.
    pub fn with_access_token(mut self, v: impl Into<String>) -> Self {
        self.access_token = Some(v.into());
        self
    }

    /// The group stamped onto rows created under this context.
    pub fn primary_group_id(&self) -> &GroupId {
        // Resolution never produces an empty list; index 0 is the
        // selected group.
        &self.group_ids[0]
    }

    pub fn group_ids(&self) -> &[GroupId] {
        &self.group_ids
    }

    pub fn group_email(&self) -> &str {
        &self.group_email
    }

    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn user_role(&self) -> Option<GroupRole> {
        self.user_role
    }

    pub fn highest_role(&self) -> Option<GroupRole> {
        self.highest_role
    }

    /// Whether the primary group is the user's personal workspace.
    pub fn is_personal_workspace(&self) -> bool {
        self.primary_group_id().starts_with("user_")
    }

    /// Whether a job owned by `group_id` is visible to this context.
    pub fn can_access(&self, group_id: &GroupId) -> bool {
        self.group_ids.iter().any(|g| g == group_id)
    }

    /// Primitive-only form handed to worker processes.
    ///
    /// Workers never reconstruct a context from headers (they have no
    /// HTTP); they get exactly these fields serialized into their init
    /// payload.
    pub fn to_worker(&self) -> WorkerGroupContext {
        WorkerGroupContext {
            group_id: self.primary_group_id().clone(),
            group_email: self.group_email.clone(),
            email_domain: self.email_domain.clone(),
            user_id: self.user_id.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// The subset of [`GroupContext`] that crosses the process boundary:
/// primitive fields only, no live references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerGroupContext {
    pub group_id: GroupId,
    pub group_email: String,
    pub email_domain: String,
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
