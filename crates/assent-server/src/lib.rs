//! Process wiring for the Assent consent server: configuration, event
//! seeding and router assembly. The binary in `src/bin/server.rs` is a thin
//! shell over this.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use assent_api::AppState;
use assent_core::{clock::SystemClock, event::Event, workflow::FlowConfig};
use assent_store_sqlite::SqliteStore;
use axum::Router;
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ASSENT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  /// JSON array of events upserted into the store at startup.
  #[serde(default)]
  pub seed_path:  Option<PathBuf>,
  /// Submission flow per event kind.
  #[serde(default)]
  pub flows:      FlowConfig,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

impl ServerConfig {
  /// Layer `path` (optional) under the environment and deserialise.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ASSENT"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Startup ──────────────────────────────────────────────────────────────────

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

/// Parse a seed file: a JSON array of [`Event`]s.
pub fn parse_seed(raw: &str) -> anyhow::Result<Vec<Event>> {
  serde_json::from_str(raw).context("seed file is not a JSON array of events")
}

/// Upsert every event in the seed file at `path` into `store`.
pub async fn seed_events(store: &SqliteStore, path: &Path) -> anyhow::Result<usize> {
  let raw = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read seed file {path:?}"))?;
  let events = parse_seed(&raw)?;
  for event in &events {
    store
      .put_event(event)
      .await
      .with_context(|| format!("failed to store event {}", event.event_id))?;
  }
  tracing::info!(count = events.len(), path = ?path, "seeded events");
  Ok(events.len())
}

/// Open the store named by `cfg`, seed it, and build the HTTP router.
pub async fn build(cfg: &ServerConfig) -> anyhow::Result<Router> {
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(seed) = &cfg.seed_path {
    seed_events(&store, &expand_tilde(seed)).await?;
  }

  let state = AppState::new(Arc::new(store), Arc::new(SystemClock), cfg.flows);
  Ok(assent_api::api_router(state))
}

#[cfg(test)]
mod tests {
  use assent_core::{
    event::{EventKind, EventLifecycleState},
    repository::EventDirectory as _,
    workflow::{AgreeStatus, SubmissionFlow},
  };
  use chrono::{TimeZone, Utc};

  use super::*;

  fn from_toml(raw: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(raw, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn minimal_config_uses_defaults() {
    let cfg = from_toml(r#"store_path = "~/assent.db""#);
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert!(cfg.seed_path.is_none());
    assert_eq!(cfg.flows, FlowConfig::default());
  }

  #[test]
  fn flows_are_configured_per_kind() {
    let cfg = from_toml(
      r#"
      store_path = "assent.db"
      port = 9000

      [flows.health_check]
      mode = "update_stub"

      [flows.vaccination]
      mode = "create"
      agree_status = "approved"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.flows.for_kind(EventKind::HealthCheck), SubmissionFlow::UpdateStub);
    assert_eq!(
      cfg.flows.for_kind(EventKind::Vaccination),
      SubmissionFlow::Create { agree_status: AgreeStatus::Approved },
    );
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/data/assent.db")),
      PathBuf::from(home).join("data/assent.db"),
    );
    assert_eq!(expand_tilde(Path::new("/var/assent.db")), PathBuf::from("/var/assent.db"));
  }

  #[test]
  fn seed_file_parses_events() {
    let events = parse_seed(
      r#"[{
        "event_id": "hc-2025",
        "kind": "health_check",
        "school_year": "2024-2025",
        "location": "Phòng y tế",
        "event_date": "2025-03-10T01:00:00Z",
        "registration_window": {
          "start": "2025-02-20T00:00:00Z",
          "end": "2025-03-05T00:00:00Z"
        },
        "lifecycle_override": "completed"
      }]"#,
    )
    .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::HealthCheck);
    assert_eq!(events[0].event_date, Utc.with_ymd_and_hms(2025, 3, 10, 1, 0, 0).unwrap());
    assert_eq!(events[0].lifecycle_override, Some(EventLifecycleState::Completed));
  }

  #[test]
  fn malformed_seed_is_an_error() {
    assert!(parse_seed(r#"{"event_id": "x"}"#).is_err());
  }

  #[tokio::test]
  async fn build_seeds_the_store() {
    let dir = std::env::temp_dir().join(format!("assent-seed-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let seed = dir.join("events.json");
    std::fs::write(
      &seed,
      r#"[{
        "event_id": "vx-1",
        "kind": "vaccination",
        "school_year": "2024-2025",
        "location": "Sân trường",
        "event_date": "2025-04-01T01:00:00Z",
        "registration_window": {
          "start": "2025-03-01T00:00:00Z",
          "end": "2025-03-20T00:00:00Z"
        }
      }]"#,
    )
    .unwrap();

    let store = SqliteStore::open_in_memory().await.unwrap();
    assert_eq!(seed_events(&store, &seed).await.unwrap(), 1);

    let event = store.get_event("vx-1".into()).await.unwrap().unwrap();
    assert_eq!(event.kind, EventKind::Vaccination);
    std::fs::remove_dir_all(&dir).ok();
  }
}
