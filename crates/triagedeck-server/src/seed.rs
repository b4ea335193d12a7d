//! Dev seed: a demo org, three users, and a reviewable project.
//!
//! Mirrors what a fresh local checkout needs to exercise the whole flow:
//! PASS/FAIL schema with hotkeys, twenty images with before/after variants,
//! and one membership per role.

use anyhow::Result;
use triagedeck_core::{
  access::Role,
  clock::now_ms,
  item::{Item, ItemVariant, MediaType},
  project::{
    Choice, DecisionSchema, Project, ProjectConfig, VariantNavigationMode,
  },
  store::DeckStore,
};
use triagedeck_store_sqlite::SqliteStore;
use uuid::Uuid;

const USERS: [(&str, Role); 3] = [
  ("admin@example.com", Role::Admin),
  ("reviewer@example.com", Role::Reviewer),
  ("viewer@example.com", Role::Viewer),
];

/// Seed the demo data unless the admin user already sees a project.
pub async fn run(store: &SqliteStore) -> Result<()> {
  let existing = store.list_projects(USERS[0].0).await?;
  if !existing.is_empty() {
    tracing::info!("seed skipped; demo data already present");
    return Ok(());
  }

  let now = now_ms();
  let org_id = Uuid::new_v4();
  store.create_organization(org_id, "Local Org", now).await?;

  let project = Project {
    project_id:      Uuid::new_v4(),
    organization_id: org_id,
    name:            "Demo Project".into(),
    slug:            "demo-project".into(),
    decision_schema: DecisionSchema {
      version: 1,
      choices: vec![
        Choice {
          id:     "pass".into(),
          label:  "PASS".into(),
          hotkey: Some("p".into()),
        },
        Choice {
          id:     "fail".into(),
          label:  "FAIL".into(),
          hotkey: Some("f".into()),
        },
      ],
      allow_notes: true,
    },
    config:          ProjectConfig {
      media_types_supported:         vec![
        MediaType::Image,
        MediaType::Video,
        MediaType::Pdf,
      ],
      variants_enabled:              true,
      variant_navigation_mode:       VariantNavigationMode::Both,
      compare_mode_enabled:          true,
      max_compare_variants:          2,
      export_allowlist:              None,
      viewer_exports_enabled:        false,
      reviewer_reads_others_exports: false,
    },
    created_at:      now,
    deleted_at:      None,
  };
  project.decision_schema.validate()?;
  store.create_project(&project).await?;

  for (user, role) in USERS {
    store.upsert_membership(project.project_id, user, role).await?;
  }

  for n in 1..=20u32 {
    let external_id = format!("img_{n:04}");
    let item = Item {
      item_id:     Uuid::new_v4(),
      project_id:  project.project_id,
      external_id: external_id.clone(),
      media_type:  MediaType::Image,
      logical_uri: format!("/media/{external_id}.jpg"),
      sort_key:    format!("{n:08}"),
      metadata:    serde_json::json!({
        "subject_id": format!("subject-{}", (n % 3) + 1),
        "session_id": format!("s-{}", (n % 5) + 1),
      }),
      created_at:  now,
      deleted_at:  None,
    };
    store.create_item(&item).await?;

    for (key, label, order) in
      [("before", "Before", 10), ("after", "After", 20)]
    {
      store
        .create_variant(&ItemVariant {
          item_id:     item.item_id,
          variant_key: key.into(),
          label:       label.into(),
          logical_uri: format!("/media/{external_id}_{key}.jpg"),
          sort_order:  order,
          metadata:    serde_json::json!({}),
        })
        .await?;
    }
  }

  tracing::info!(project_id = %project.project_id, "demo project seeded");
  Ok(())
}
