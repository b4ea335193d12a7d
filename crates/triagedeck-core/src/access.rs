//! Roles and the project authorization matrix.
//!
//! Membership itself is the visibility gate: a non-member sees `404` on every
//! project-scoped path (never `403`, to prevent enumeration). Within a
//! project the matrix below applies; the policy-dependent cells are driven by
//! [`OrgPolicy`], which is read from configuration rather than hardcoded.
//!
//! | Action | admin | reviewer | viewer |
//! |--------|-------|----------|--------|
//! | read project data | ✓ | ✓ | ✓ |
//! | write decision events | ✓ | ✓ | — |
//! | create export job | ✓ | ✓ | policy |
//! | read others' export jobs | ✓ | policy | — |
//! | cancel own queued/running export | ✓ | ✓ | policy |

use serde::{Deserialize, Serialize};

use crate::{Error, Result, project::ProjectConfig};

// ─── Role ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Reviewer,
  Viewer,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Admin => "admin",
      Self::Reviewer => "reviewer",
      Self::Viewer => "viewer",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "admin" => Ok(Self::Admin),
      "reviewer" => Ok(Self::Reviewer),
      "viewer" => Ok(Self::Viewer),
      other => Err(Error::UnknownValue(other.to_string())),
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// The configuration-driven cells of the matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrgPolicy {
  pub viewer_exports_enabled:        bool,
  pub reviewer_reads_others_exports: bool,
}

impl From<&ProjectConfig> for OrgPolicy {
  fn from(cfg: &ProjectConfig) -> Self {
    Self {
      viewer_exports_enabled:        cfg.viewer_exports_enabled,
      reviewer_reads_others_exports: cfg.reviewer_reads_others_exports,
    }
  }
}

// ─── Matrix ──────────────────────────────────────────────────────────────────

impl Role {
  pub fn can_write_events(self) -> bool {
    matches!(self, Self::Admin | Self::Reviewer)
  }

  pub fn can_create_export(self, policy: &OrgPolicy) -> bool {
    match self {
      Self::Admin | Self::Reviewer => true,
      Self::Viewer => policy.viewer_exports_enabled,
    }
  }

  pub fn can_read_others_exports(self, policy: &OrgPolicy) -> bool {
    match self {
      Self::Admin => true,
      Self::Reviewer => policy.reviewer_reads_others_exports,
      Self::Viewer => false,
    }
  }

  /// Cancel rights: admins may cancel any job in the project; everyone else
  /// may cancel only their own, and only if they could have created it.
  pub fn can_cancel_export(self, own: bool, policy: &OrgPolicy) -> bool {
    match self {
      Self::Admin => true,
      _ => own && self.can_create_export(policy),
    }
  }
}
