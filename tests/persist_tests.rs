//! Persistence tests: both backends, optimistic concurrency, and the
//! load/mutate/save cycle of `Tracker`.

use task_assign_mcp::error::{CoreError, ErrorCode};
use task_assign_mcp::persist::{
    BackendKind, JsonFileBackend, SnapshotBackend, SqliteBackend, open_backend,
};
use task_assign_mcp::service::Tracker;
use task_assign_mcp::snapshot::Snapshot;
use task_assign_mcp::store::{StoreEvent, StoreSettings};
use task_assign_mcp::templates::ProjectTemplate;
use task_assign_mcp::types::{
    AgentPatch, AgentStatus, NewAgent, NewTask, Priority, ProjectMeta, TaskStatus,
};
use tempfile::TempDir;

fn meta(name: &str) -> ProjectMeta {
    ProjectMeta {
        name: name.to_string(),
        ..Default::default()
    }
}

/// Helper to create a tracker over a fresh data directory.
fn setup_tracker(kind: BackendKind) -> (TempDir, Tracker) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = open_backend(kind, dir.path()).expect("Failed to open backend");
    let tracker = Tracker::new(backend, StoreSettings::default());
    tracker
        .init(meta("demo"), None, false)
        .expect("Failed to init project");
    (dir, tracker)
}

fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.downcast_ref::<CoreError>().map(|e| e.code)
}

mod backend_tests {
    use super::*;

    fn check_concurrency(backend: &dyn SnapshotBackend) {
        assert!(backend.load().expect("load").is_none());

        let first = Snapshot::new(meta("demo"));
        assert_eq!(backend.save(&first).expect("first save"), 1);

        // Two writers load version 1; only the first save wins.
        let mut writer_a = backend.load().unwrap().unwrap();
        let mut writer_b = backend.load().unwrap().unwrap();
        writer_a.project.name = "from a".to_string();
        writer_b.project.name = "from b".to_string();

        assert_eq!(backend.save(&writer_a).unwrap(), 2);
        let err = backend.save(&writer_b).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::StaleSnapshot));

        let stored = backend.load().unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.project.name, "from a");
    }

    #[test]
    fn json_backend_rejects_stale_saves() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("project.json"));
        check_concurrency(&backend);
    }

    #[test]
    fn gzip_json_backend_rejects_stale_saves() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("project.json.gz"));
        check_concurrency(&backend);
    }

    #[test]
    fn sqlite_backend_rejects_stale_saves() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("project.db")).unwrap();
        check_concurrency(&backend);
    }

    #[test]
    fn sqlite_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.save(&Snapshot::new(meta("durable"))).unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        let stored = backend.load().unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.project.name, "durable");
    }

    #[test]
    fn open_backend_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let backend = open_backend(BackendKind::Json, &nested).unwrap();
        assert!(nested.is_dir());
        assert!(backend.describe().ends_with("project.json"));
    }
}

mod tracker_tests {
    use super::*;

    #[test]
    fn mutations_persist_across_loads() {
        for kind in [BackendKind::Json, BackendKind::Sqlite] {
            let (_dir, tracker) = setup_tracker(kind);
            let task = tracker
                .mutate(|store| store.create_task(NewTask::titled("Persist me")))
                .expect("create");

            let loaded = tracker
                .read(|store| Ok(store.get_task(&task.id).cloned()))
                .unwrap()
                .expect("task survives reload");
            assert_eq!(loaded.title, "Persist me");
            assert_eq!(loaded.status, TaskStatus::Todo);
        }
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let (_dir, tracker) = setup_tracker(BackendKind::Json);
        let before = tracker.export().unwrap().version;

        let err = tracker
            .mutate(|store| store.start_task("task-42"))
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::NotFound));
        assert_eq!(tracker.export().unwrap().version, before);
        assert!(tracker.drain_events().iter().all(|e| !matches!(
            e,
            StoreEvent::StatusChanged { .. }
        )));
    }

    #[test]
    fn concurrent_trackers_detect_stale_state() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_backend(BackendKind::Json, dir.path()).unwrap();
        let tracker = Tracker::new(backend, StoreSettings::default());
        tracker.init(meta("demo"), None, false).unwrap();

        // A second process writes between our load and save.
        let other = Tracker::new(
            open_backend(BackendKind::Json, dir.path()).unwrap(),
            StoreSettings::default(),
        );
        let err = tracker
            .mutate(|store| {
                other
                    .mutate(|s| s.create_task(NewTask::titled("Sneaky")))
                    .map_err(|e| CoreError::internal(e.to_string()))?;
                store.create_task(NewTask::titled("Mine"))
            })
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::StaleSnapshot));

        let titles: Vec<String> = tracker
            .read(|store| {
                Ok(store
                    .sorted_tasks()
                    .into_iter()
                    .map(|t| t.title.clone())
                    .collect())
            })
            .unwrap();
        assert_eq!(titles, vec!["Sneaky".to_string()]);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let (_dir, tracker) = setup_tracker(BackendKind::Sqlite);
        tracker
            .mutate(|store| store.create_task(NewTask::titled("Keep")))
            .unwrap();

        let err = tracker.init(meta("again"), None, false).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::ValidationError));

        let report = tracker.init(meta("again"), None, true).unwrap();
        assert_eq!(report.status.name, "again");
        assert_eq!(report.status.total_tasks, 0);
    }

    #[test]
    fn uninitialised_tracker_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::new(
            open_backend(BackendKind::Json, dir.path()).unwrap(),
            StoreSettings::default(),
        );
        assert!(!tracker.is_initialized().unwrap());
        let err = tracker.read(|store| Ok(store.project_status())).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::NotFound));
    }

    #[test]
    fn events_are_queued_until_drained() {
        let (_dir, tracker) = setup_tracker(BackendKind::Json);
        tracker.drain_events();
        tracker
            .mutate(|store| store.add_agent(NewAgent::new("dev")))
            .unwrap();

        let events = tracker.drain_events();
        assert_eq!(
            events,
            vec![StoreEvent::AgentAdded {
                agent_id: "dev".to_string()
            }]
        );
        assert!(tracker.drain_events().is_empty());
    }

    #[test]
    fn check_in_of_active_agent_does_not_save() {
        let (dir, tracker) = setup_tracker(BackendKind::Json);
        tracker
            .mutate(|store| store.add_agent(NewAgent::new("dev")))
            .unwrap();
        let before = tracker.export().unwrap().version;

        for _ in 0..3 {
            tracker
                .mutate(|store| store.agent_check_in("dev", None))
                .unwrap();
        }
        assert_eq!(tracker.export().unwrap().version, before);

        // A check-in landing between another writer's load and save is harmless.
        let other = Tracker::new(
            open_backend(BackendKind::Json, dir.path()).unwrap(),
            StoreSettings::default(),
        );
        other
            .mutate(|store| {
                tracker
                    .mutate(|s| s.agent_check_in("dev", None))
                    .map_err(|e| CoreError::internal(e.to_string()))?;
                store.create_task(NewTask::titled("Polled"))
            })
            .unwrap();
        assert_eq!(tracker.export().unwrap().version, before + 1);
    }

    #[test]
    fn check_in_of_inactive_agent_saves() {
        let (_dir, tracker) = setup_tracker(BackendKind::Sqlite);
        tracker
            .mutate(|store| {
                store.add_agent(NewAgent::new("dev"))?;
                store.update_agent(
                    "dev",
                    AgentPatch {
                        status: Some(AgentStatus::Inactive),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        let before = tracker.export().unwrap().version;

        let check_in = tracker
            .mutate(|store| store.agent_check_in("dev", None))
            .unwrap();
        assert_eq!(check_in.agent.status, AgentStatus::Active);
        assert_eq!(tracker.export().unwrap().version, before + 1);
    }

    #[test]
    fn resolve_agent_falls_back_to_configured_identity() {
        let (_dir, tracker) = setup_tracker(BackendKind::Json);
        let err = tracker.resolve_agent(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let tracker = tracker.with_agent(Some("dev".to_string()));
        assert_eq!(tracker.resolve_agent(None).unwrap(), "dev");
        assert_eq!(
            tracker.resolve_agent(Some("other".to_string())).unwrap(),
            "other"
        );
    }
}

mod template_tests {
    use super::*;

    #[test]
    fn builtin_template_seeds_project() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::new(
            open_backend(BackendKind::Json, dir.path()).unwrap(),
            StoreSettings::default(),
        );
        let template = ProjectTemplate::load("software-project").unwrap();
        let report = tracker.init(meta("shop"), Some(&template), false).unwrap();

        let summary = report.template.expect("template summary");
        assert_eq!(summary.template, "software-project");
        assert_eq!(summary.phases, template.phases.len());
        assert_eq!(summary.agents, template.agents.len());
        assert_eq!(summary.tasks.len(), template.tasks.len());

        let violations = tracker.read(|store| Ok(store.check_invariants())).unwrap();
        assert!(violations.is_empty(), "{:?}", violations);

        // The first planning task is critical and has no dependencies.
        let recs = tracker
            .read(|store| store.recommendations_for_agent("lead", Some(1)))
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Priority::Critical);
    }

    #[test]
    fn template_dependencies_must_point_backwards() {
        let template = ProjectTemplate::from_yaml(
            r#"
name: broken
tasks:
  - key: first
    title: First
    depends_on: [second]
  - key: second
    title: Second
"#,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::new(
            open_backend(BackendKind::Json, dir.path()).unwrap(),
            StoreSettings::default(),
        );
        let err = tracker
            .init(meta("broken"), Some(&template), false)
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::ValidationError));
        assert!(!tracker.is_initialized().unwrap());
    }

    #[test]
    fn unknown_template_name_is_an_error() {
        assert!(ProjectTemplate::load("no-such-template").is_err());
    }
}

mod export_tests {
    use super::*;

    #[test]
    fn gzip_export_round_trips() {
        let (dir, tracker) = setup_tracker(BackendKind::Sqlite);
        tracker
            .mutate(|store| {
                store.add_agent(NewAgent::new("dev").with_capabilities(["all"]))?;
                store.create_task(NewTask::titled("Ship it"))
            })
            .unwrap();

        let snapshot = tracker.export().unwrap();
        let path = dir.path().join("export.json.gz");
        snapshot.write_file(&path).unwrap();

        let loaded = Snapshot::from_file(&path).unwrap();
        assert!(loaded.is_schema_compatible());
        assert_eq!(loaded.version, snapshot.version);
        assert_eq!(loaded.agents.len(), 1);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].title, "Ship it");
        assert_eq!(loaded.next_task_seq, 2);
    }

    #[test]
    fn exported_snapshot_seeds_another_backend() {
        let (_dir, tracker) = setup_tracker(BackendKind::Json);
        tracker
            .mutate(|store| {
                let a = store.create_task(NewTask::titled("A"))?;
                store.create_task(NewTask::titled("B").depends_on(&a.id))
            })
            .unwrap();

        let mut snapshot = tracker.export().unwrap();
        snapshot.version = 0;
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.save(&snapshot).unwrap();

        let copy = Tracker::new(Box::new(backend), StoreSettings::default());
        let blocked = copy
            .read(|store| Ok(store.get_task("task-2").map(|t| t.status)))
            .unwrap();
        assert_eq!(blocked, Some(TaskStatus::Blocked));
    }
}
