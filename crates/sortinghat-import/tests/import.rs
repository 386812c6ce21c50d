//! End-to-end runs of the import engine against an in-memory store.

use std::{io::Write as _, sync::Arc};

use sortinghat_core::{
  record::{Export, Identity},
  stats::EntityStats,
  store::{IdentityStore, InsertOutcome},
};
use sortinghat_import::{Importer, Modes, RunOptions, RunReport, input::Batch};
use sortinghat_store_sqlite::SqliteStore;

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn batch(json: &str) -> Batch {
  let records = Export::from_json(json).expect("valid export").into_records();
  Batch { files: 1, records }
}

async fn import(store: &Arc<SqliteStore>, json: &str, options: RunOptions) -> RunReport {
  Importer::new(store.clone(), options)
    .run(batch(json))
    .await
    .expect("import succeeds")
}

fn modes(replace: bool, compare: bool) -> RunOptions {
  RunOptions {
    modes: Modes { replace, compare, orgs_read_only: false },
    ..Default::default()
  }
}

fn read_only() -> RunOptions {
  RunOptions {
    modes: Modes { orgs_read_only: true, ..Default::default() },
    ..Default::default()
  }
}

fn slugged(slug: &str, replace: bool) -> RunOptions {
  RunOptions {
    project_slug: Some(slug.to_owned()),
    ..modes(replace, false)
  }
}

fn stats(added: u64, found: u64, same: u64, deleted: u64, skipped: u64) -> EntityStats {
  EntityStats { added, found, same, deleted, skipped }
}

const ANN: &str = r#"{"uidentities": {"u1": {
  "profile": {"name": "Ann", "email": "ann@example.com",
              "country": {"code": "ES", "alpha3": "ESP", "name": "Spain"}},
  "identities": [{"id": "i1", "source": "git", "name": "Ann",
                  "email": "ann@example.com", "username": "ann"}],
  "enrollments": [{"organization": "Acme", "start": "2020-01-01T00:00:00", "end": null}]
}}}"#;

// ─── First import and idempotence ────────────────────────────────────────────

#[tokio::test]
async fn first_import_adds_everything() {
  let store = store().await;
  let report = import(&store, ANN, modes(false, false)).await;

  assert_eq!(report.records, 1);
  assert_eq!(report.organizations.total, 1);
  assert_eq!(report.organizations.added, 1);
  assert_eq!(report.countries.total, 1);
  assert_eq!(report.countries.added, 1);
  assert_eq!(report.stats.uidentities, stats(1, 0, 0, 0, 0));
  assert_eq!(report.stats.profiles, stats(1, 0, 0, 0, 0));
  assert_eq!(report.stats.identities, stats(1, 0, 0, 0, 0));
  assert_eq!(report.stats.enrollments, stats(1, 0, 0, 0, 0));

  let profile = store.get_profile("u1").await.unwrap().expect("profile stored");
  assert_eq!(profile.country_code.as_deref(), Some("ES"));
  assert_eq!(store.list_enrollments("u1", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_compare_run_changes_nothing() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;
  let report = import(&store, ANN, modes(false, true)).await;

  assert_eq!(report.organizations.added, 0);
  assert_eq!(report.countries.added, 0);
  assert_eq!(report.stats.uidentities, stats(0, 1, 0, 0, 0));
  assert_eq!(report.stats.profiles, stats(0, 1, 1, 0, 0));
  assert_eq!(report.stats.identities, stats(0, 1, 1, 0, 0));
  assert_eq!(report.stats.enrollments, stats(0, 1, 1, 0, 0));
}

#[tokio::test]
async fn compare_and_replace_leaves_identical_rows_alone() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;
  let report = import(&store, ANN, modes(true, true)).await;

  assert_eq!(report.stats.profiles, stats(0, 1, 1, 0, 0));
  assert_eq!(report.stats.identities, stats(0, 1, 1, 0, 0));
  assert_eq!(report.stats.enrollments, stats(0, 1, 1, 0, 0));
}

// ─── Decision table ──────────────────────────────────────────────────────────

#[tokio::test]
async fn differing_profile_is_replaced() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;

  let changed = ANN.replace(r#""name": "Ann", "email""#, r#""name": "Anne", "email""#);
  let report = import(&store, &changed, modes(true, true)).await;

  assert_eq!(report.stats.profiles, stats(1, 1, 0, 1, 0));
  assert_eq!(report.stats.identities, stats(0, 1, 1, 0, 0));
  let profile = store.get_profile("u1").await.unwrap().expect("profile stored");
  assert_eq!(profile.name.as_deref(), Some("Anne"));
}

#[tokio::test]
async fn differing_profile_is_kept_without_replace() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;

  let changed = ANN.replace(r#""name": "Ann", "email""#, r#""name": "Anne", "email""#);
  let report = import(&store, &changed, modes(false, true)).await;

  assert_eq!(report.stats.profiles, stats(0, 1, 0, 0, 0));
  let profile = store.get_profile("u1").await.unwrap().expect("profile stored");
  assert_eq!(profile.name.as_deref(), Some("Ann"));
}

#[tokio::test]
async fn found_profile_is_kept_without_replace_or_compare() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;

  let changed = ANN.replace(r#""name": "Ann", "email""#, r#""name": "Anne", "email""#);
  let report = import(&store, &changed, modes(false, false)).await;

  assert_eq!(report.stats.profiles, stats(0, 1, 0, 0, 0));
  assert_eq!(report.stats.identities, stats(0, 1, 0, 0, 0));
  assert_eq!(report.stats.enrollments, stats(0, 1, 0, 0, 0));
  let profile = store.get_profile("u1").await.unwrap().expect("profile stored");
  assert_eq!(profile.name.as_deref(), Some("Ann"));
}

#[tokio::test]
async fn replace_without_compare_rewrites_every_found_entity() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;
  let report = import(&store, ANN, modes(true, false)).await;

  assert_eq!(report.stats.uidentities, stats(0, 1, 0, 0, 0));
  assert_eq!(report.stats.profiles, stats(1, 1, 0, 1, 0));
  assert_eq!(report.stats.identities, stats(1, 1, 0, 1, 0));
  assert_eq!(report.stats.enrollments, stats(1, 1, 0, 1, 0));
  assert_eq!(store.list_enrollments("u1", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn identity_matched_by_content_tuple_counts_as_found() {
  let store = store().await;
  import(&store, ANN, modes(false, false)).await;

  // Same account content under a new external id.
  let renamed = ANN.replace(r#""id": "i1""#, r#""id": "i2""#);
  let report = import(&store, &renamed, modes(false, false)).await;
  assert_eq!(report.stats.identities, stats(0, 1, 0, 0, 0));

  let probe = Identity { id: "i2".into(), source: "nowhere".into(), ..Default::default() };
  assert_eq!(store.find_identity(&probe).await.unwrap(), None);
}

// ─── Enrollments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn project_slug_scopes_enrollments() {
  let store = store().await;
  import(&store, ANN, slugged("foundation/x", false)).await;

  let report = import(&store, ANN, slugged("foundation/y", false)).await;
  assert_eq!(report.stats.enrollments, stats(1, 0, 0, 0, 0));

  let report = import(&store, ANN, slugged("foundation/x", true)).await;
  assert_eq!(report.stats.enrollments, stats(1, 1, 0, 1, 0));

  let x = store.list_enrollments("u1", Some("foundation/x")).await.unwrap();
  let y = store.list_enrollments("u1", Some("foundation/y")).await.unwrap();
  assert_eq!(x.len(), 1);
  assert_eq!(y.len(), 1);
  assert!(store.list_enrollments("u1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn read_only_maps_unknown_names_through_rules() {
  let store = store().await;
  store.insert_organization("Acme Corporation").await.unwrap();

  let mut rules = tempfile::NamedTempFile::new().unwrap();
  writeln!(rules, "mappings:\n  - ['^acme', 'Acme Corporation']").unwrap();

  let options = RunOptions {
    orgs_map_file: Some(rules.path().to_path_buf()),
    ..read_only()
  };
  let json = ANN.replace(r#""organization": "Acme""#, r#""organization": "ACME Inc""#);
  let report = import(&store, &json, options).await;

  assert_eq!(report.organizations.added, 0);
  assert_eq!(report.organizations.missing, 0);
  assert_eq!(report.stats.enrollments, stats(1, 0, 0, 0, 0));
  assert_eq!(store.count_organizations().await.unwrap(), 1);

  let canonical = store.find_organization("Acme Corporation").await.unwrap();
  let rows = store.list_enrollments("u1", None).await.unwrap();
  assert_eq!(Some(rows[0].organization_id), canonical);
}

const ZOE: &str = r#"{"uidentities": {
  "u1": {"profile": {"name": "Ann"},
         "enrollments": [{"organization": "Zoë Corp", "start": null, "end": null}]},
  "u2": {"profile": {"name": "Bob"},
         "enrollments": [{"organization": "zoë corp", "start": null, "end": null}]}
}}"#;

#[tokio::test]
async fn accented_name_reuses_stored_organization() {
  let store = store().await;
  let existing = match store.insert_organization("Zoe Corp").await.unwrap() {
    InsertOutcome::Inserted(id) => id,
    InsertOutcome::Conflict => panic!("fresh store"),
  };

  let json = ZOE.replace(r#""zoë corp""#, r#""Zoë Corp""#);
  let report = import(&store, &json, modes(false, false)).await;

  assert_eq!(report.organizations.added, 0);
  assert_eq!(store.count_organizations().await.unwrap(), 1);
  for uuid in ["u1", "u2"] {
    let rows = store.list_enrollments(uuid, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].organization_id, existing);
  }
}

#[tokio::test]
async fn read_only_run_finds_organizations_stored_normalized() {
  let store = store().await;
  let report = import(&store, ZOE, modes(false, false)).await;
  assert_eq!(report.organizations.added, 2);
  assert!(store.find_organization("Zoe Corp").await.unwrap().is_some());

  let options = RunOptions {
    modes: Modes { replace: true, compare: true, orgs_read_only: true },
    ..Default::default()
  };
  let report = import(&store, ZOE, options).await;

  assert_eq!(report.organizations.missing, 0);
  assert_eq!(report.stats.enrollments, stats(0, 2, 2, 0, 0));
  for uuid in ["u1", "u2"] {
    assert_eq!(store.list_enrollments(uuid, None).await.unwrap().len(), 1);
  }
}

#[tokio::test]
async fn read_only_skips_unknown_organizations() {
  let store = store().await;
  let dir = tempfile::tempdir().unwrap();
  let csv_path = dir.path().join("missing.csv");

  let options = RunOptions {
    missing_orgs_csv: Some(csv_path.clone()),
    ..read_only()
  };
  let report = import(&store, ANN, options).await;

  assert_eq!(report.organizations.missing, 1);
  assert_eq!(report.stats.enrollments, stats(0, 0, 0, 0, 1));
  assert_eq!(report.stats.profiles, stats(1, 0, 0, 0, 0));
  assert_eq!(store.count_organizations().await.unwrap(), 0);
  assert!(store.list_enrollments("u1", None).await.unwrap().is_empty());

  let written = std::fs::read_to_string(csv_path).unwrap();
  assert_eq!(written, "Organization Name,Enrollments\nAcme,1\n");
}

// ─── Run-level behavior ──────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_writes_nothing() {
  let store = store().await;
  let options = RunOptions { dry_run: true, ..Default::default() };
  let report = import(&store, ANN, options).await;

  assert!(report.dry_run);
  assert_eq!(report.records, 1);
  assert!(!store.uidentity_exists("u1").await.unwrap());
  assert_eq!(store.count_organizations().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_sum_their_statistics() {
  let records: Vec<String> = (0..25)
    .map(|i| {
      format!(
        r#""u{i}": {{
          "profile": {{"name": "Person {i}"}},
          "identities": [{{"id": "id{i}", "source": "git", "username": "p{i}"}}],
          "enrollments": [{{"organization": "Org {}", "start": null, "end": null}}]
        }}"#,
        i % 3
      )
    })
    .collect();
  let json = format!(r#"{{"uidentities": {{{}}}}}"#, records.join(","));

  let store = store().await;
  let options = RunOptions { concurrency: 4, ..Default::default() };
  let report = import(&store, &json, options).await;

  assert_eq!(report.organizations.added, 3);
  assert_eq!(report.stats.uidentities.added, 25);
  assert_eq!(report.stats.profiles.added, 25);
  assert_eq!(report.stats.identities.added, 25);
  assert_eq!(report.stats.enrollments.added, 25);
  assert_eq!(store.count_organizations().await.unwrap(), 3);
}
