//! Integration tests for the in-memory engine.
//!
//! Every scenario checks the store-wide invariants after its mutations.

use std::sync::Arc;
use task_assign_mcp::error::ErrorCode;
use task_assign_mcp::recommend::capability::NoInference;
use task_assign_mcp::snapshot::Snapshot;
use task_assign_mcp::store::lifecycle::CancelPolicy;
use task_assign_mcp::store::{Store, StoreEvent, StoreSettings};
use task_assign_mcp::types::{
    AgentPatch, AgentStatus, AssigneeRole, BlockedReason, NewAgent, NewTask, Phase, PhaseStatus,
    Priority, ProjectMeta, RiskLevel, TaskFilter, TaskPatch, TaskStatus,
};

/// Helper to create an empty store with default settings.
fn setup_store() -> Store {
    setup_store_with(StoreSettings::default())
}

fn setup_store_with(settings: StoreSettings) -> Store {
    Store::new(
        ProjectMeta {
            name: "test".to_string(),
            ..Default::default()
        },
        settings,
    )
}

fn assert_healthy(store: &Store) {
    let violations = store.check_invariants();
    assert!(violations.is_empty(), "invariants violated: {:?}", violations);
}

/// Add an agent holding the wildcard capability.
fn add_lead(store: &mut Store) {
    store
        .add_agent(NewAgent::new("lead").with_capabilities(["all"]))
        .expect("Failed to add agent");
}

fn status_of(store: &Store, task_id: &str) -> TaskStatus {
    store.get_task(task_id).expect("task exists").status
}

mod scenario_tests {
    use super::*;

    #[test]
    fn completing_dependency_unlocks_recommendation() {
        let mut store = setup_store();
        add_lead(&mut store);

        let t1 = store
            .create_task(NewTask::titled("Alpha").priority(Priority::Critical))
            .unwrap();
        let t2 = store
            .create_task(
                NewTask::titled("Beta")
                    .priority(Priority::High)
                    .depends_on(&t1.id),
            )
            .unwrap();
        assert_eq!(t1.status, TaskStatus::Todo);
        assert_eq!(t2.status, TaskStatus::Blocked);
        assert_healthy(&store);

        let recs = store.recommendations_for_agent("lead", None).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec![t1.id.as_str()]);

        store.assign_agent(&t1.id, "lead", None).unwrap();
        store.start_task(&t1.id).unwrap();
        let completion = store.complete_task(&t1.id).unwrap();
        assert_eq!(completion.unblocked, vec![t2.id.clone()]);
        assert!(completion.task.completed_date.is_some());
        assert_healthy(&store);

        assert_eq!(status_of(&store, &t2.id), TaskStatus::Todo);
        let recs = store.recommendations_for_agent("lead", None).unwrap();
        assert!(recs.iter().any(|r| r.task_id == t2.id));
    }

    #[test]
    fn start_twice_is_an_invalid_transition() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("Alpha")).unwrap();

        store.assign_agent(&task.id, "lead", None).unwrap();
        let started = store.start_task(&task.id).unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(started.started_date.is_some());

        let err = store.start_task(&task.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_healthy(&store);
    }

    #[test]
    fn transfer_swaps_assignee_and_keeps_role() {
        let mut store = setup_store();
        add_lead(&mut store);
        store
            .add_agent(NewAgent::new("helper").with_capabilities(["all"]))
            .unwrap();
        let task = store.create_task(NewTask::titled("Alpha")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.start_task(&task.id).unwrap();
        store.take_events();

        let moved = store.transfer_task(&task.id, "lead", "helper").unwrap();
        assert!(moved.is_assigned_to("helper"));
        assert!(!moved.is_assigned_to("lead"));
        assert_eq!(moved.assignees.len(), 1);
        assert_eq!(moved.assignees[0].role, AssigneeRole::Primary);
        assert_eq!(moved.status, TaskStatus::InProgress);

        let events = store.take_events();
        assert_eq!(
            events,
            vec![StoreEvent::Transferred {
                task_id: task.id.clone(),
                from_agent: "lead".to_string(),
                to_agent: "helper".to_string(),
            }]
        );
        assert_healthy(&store);
    }
}

mod dependency_tests {
    use super::*;

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();

        let err = store.add_dependency(&a.id, &b.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::CyclicDependency);

        let a = store.get_task(&a.id).unwrap();
        let b = store.get_task(&b.id).unwrap();
        assert!(a.dependencies.is_empty());
        assert!(b.blocks.is_empty());
        assert!(a.blocks.contains(&b.id));
        assert_eq!(a.status, TaskStatus::Todo);
        assert_healthy(&store);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let err = store.add_dependency(&a.id, &a.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::CyclicDependency);
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        let c = store
            .create_task(NewTask::titled("C").depends_on(&b.id))
            .unwrap();

        let err = store.add_dependency(&a.id, &c.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::CyclicDependency);
        assert_healthy(&store);
    }

    #[test]
    fn unknown_dependency_is_a_validation_error() {
        let mut store = setup_store();
        let err = store
            .create_task(NewTask::titled("A").depends_on("task-99"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field.as_deref(), Some("dependencies"));
        assert!(store.sorted_tasks().is_empty());
    }

    #[test]
    fn adding_dependency_reblocks_and_removing_unblocks() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store.create_task(NewTask::titled("B")).unwrap();

        store.add_dependency(&b.id, &a.id).unwrap();
        let blocked = store.get_task(&b.id).unwrap();
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert_eq!(
            blocked.blocked_reason,
            Some(BlockedReason::WaitingOnDependencies)
        );
        assert_eq!(blocked.blocked_by, vec![a.id.clone()]);
        assert_healthy(&store);

        store.remove_dependency(&b.id, &a.id).unwrap();
        let freed = store.get_task(&b.id).unwrap();
        assert_eq!(freed.status, TaskStatus::Todo);
        assert!(freed.blocked_reason.is_none());
        assert_healthy(&store);
    }

    #[test]
    fn started_task_cannot_take_open_dependency() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store.create_task(NewTask::titled("B")).unwrap();
        store.assign_agent(&b.id, "lead", None).unwrap();
        store.start_task(&b.id).unwrap();

        let err = store.add_dependency(&b.id, &a.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEligible);
        assert_healthy(&store);
    }

    #[test]
    fn propagation_only_unblocks_fully_satisfied_dependents() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store.create_task(NewTask::titled("B")).unwrap();
        let c = store
            .create_task(NewTask::titled("C").depends_on(&a.id).depends_on(&b.id))
            .unwrap();
        let d = store
            .create_task(NewTask::titled("D").depends_on(&a.id))
            .unwrap();

        store.assign_agent(&a.id, "lead", None).unwrap();
        store.start_task(&a.id).unwrap();
        let completion = store.complete_task(&a.id).unwrap();

        assert_eq!(completion.unblocked, vec![d.id.clone()]);
        let c = store.get_task(&c.id).unwrap();
        assert_eq!(c.status, TaskStatus::Blocked);
        assert_eq!(c.blocked_by, vec![b.id.clone()]);
        assert_healthy(&store);
    }

    #[test]
    fn starting_blocked_task_is_not_eligible() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.assign_agent(&b.id, "lead", None).unwrap();

        let err = store.start_task(&b.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEligible);
        assert_eq!(status_of(&store, &b.id), TaskStatus::Blocked);
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn start_requires_an_assignee() {
        let mut store = setup_store();
        let task = store.create_task(NewTask::titled("A")).unwrap();
        let err = store.start_task(&task.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(status_of(&store, &task.id), TaskStatus::Todo);
    }

    #[test]
    fn review_round_trip_then_complete() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.start_task(&task.id).unwrap();

        assert_eq!(
            store.submit_for_review(&task.id).unwrap().status,
            TaskStatus::Review
        );
        assert_eq!(
            store.request_changes(&task.id).unwrap().status,
            TaskStatus::InProgress
        );
        store.submit_for_review(&task.id).unwrap();
        let done = store.complete_task(&task.id).unwrap();
        assert_eq!(done.task.status, TaskStatus::Completed);
        assert_healthy(&store);
    }

    #[test]
    fn pause_returns_task_to_todo() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.start_task(&task.id).unwrap();
        assert_eq!(store.pause_task(&task.id).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn complete_from_todo_is_invalid() {
        let mut store = setup_store();
        let task = store.create_task(NewTask::titled("A")).unwrap();
        let err = store.complete_task(&task.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn update_status_routes_through_lifecycle() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.assign_agent(&a.id, "lead", None).unwrap();

        let patch = |status| TaskPatch {
            status: Some(status),
            ..Default::default()
        };
        store.update_task(&a.id, patch(TaskStatus::InProgress)).unwrap();
        store.update_task(&a.id, patch(TaskStatus::Completed)).unwrap();
        assert_eq!(status_of(&store, &b.id), TaskStatus::Todo);

        let err = store
            .update_task(&b.id, patch(TaskStatus::Blocked))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);

        let err = store
            .update_task(&a.id, patch(TaskStatus::InProgress))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_healthy(&store);
    }

    #[test]
    fn failed_update_applies_nothing() {
        let mut store = setup_store();
        let task = store.create_task(NewTask::titled("A")).unwrap();

        // The title is valid, the status move is not; neither may stick.
        let err = store
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Renamed".to_string()),
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_eq!(store.get_task(&task.id).unwrap().title, "A");
    }

    #[test]
    fn reopen_resets_completion_and_reblocks_dependents() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.assign_agent(&a.id, "lead", None).unwrap();
        store.start_task(&a.id).unwrap();
        store.complete_task(&a.id).unwrap();
        assert_eq!(status_of(&store, &b.id), TaskStatus::Todo);

        let reopened = store.reopen_task(&a.id).unwrap();
        assert_eq!(reopened.status, TaskStatus::Todo);
        assert!(reopened.completed_date.is_none());
        assert!(reopened.started_date.is_none());
        assert_eq!(status_of(&store, &b.id), TaskStatus::Blocked);
        assert_healthy(&store);
    }

    #[test]
    fn reopen_refused_once_dependent_started() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.assign_agent(&a.id, "lead", None).unwrap();
        store.start_task(&a.id).unwrap();
        store.complete_task(&a.id).unwrap();
        store.assign_agent(&b.id, "lead", None).unwrap();
        store.start_task(&b.id).unwrap();

        let err = store.reopen_task(&a.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert_eq!(status_of(&store, &a.id), TaskStatus::Completed);
    }
}

mod cancellation_tests {
    use super::*;

    #[test]
    fn diagnose_policy_marks_dependents_blocked_by_cancellation() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.take_events();

        store.cancel_task(&a.id).unwrap();
        let b = store.get_task(&b.id).cloned().unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
        assert_eq!(b.blocked_reason, Some(BlockedReason::DependencyCancelled));
        assert_eq!(b.blocked_by, vec![a.id.clone()]);

        let events = store.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::BlockedByCancellation { task_id, .. } if *task_id == b.id
        )));
        assert_healthy(&store);
    }

    #[test]
    fn detach_policy_frees_dependents() {
        let mut store = setup_store_with(StoreSettings {
            cancel_policy: CancelPolicy::Detach,
            ..Default::default()
        });
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();

        store.cancel_task(&a.id).unwrap();
        let b = store.get_task(&b.id).unwrap();
        assert_eq!(b.status, TaskStatus::Todo);
        assert!(b.dependencies.is_empty());
        assert!(store.get_task(&a.id).unwrap().blocks.is_empty());
        assert_healthy(&store);
    }

    #[test]
    fn cancelled_task_cannot_be_cancelled_again() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        store.cancel_task(&a.id).unwrap();
        let err = store.cancel_task(&a.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn cancelled_dependents_do_not_add_fan_out() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();

        let before = store.recommendations_for_agent("lead", None).unwrap();
        assert_eq!(before[0].breakdown.dependents, 1);

        store.cancel_task(&b.id).unwrap();
        let after = store.recommendations_for_agent("lead", None).unwrap();
        assert_eq!(after[0].task_id, a.id);
        assert_eq!(after[0].breakdown.dependents, 0);
        assert!(after[0].score < before[0].score);
    }
}

mod assignment_tests {
    use super::*;

    #[test]
    fn first_assignee_is_primary_and_duplicates_rejected() {
        let mut store = setup_store();
        add_lead(&mut store);
        store.add_agent(NewAgent::new("helper")).unwrap();
        let task = store.create_task(NewTask::titled("A")).unwrap();

        store.assign_agent(&task.id, "lead", None).unwrap();
        let task = store.assign_agent(&task.id, "helper", None).unwrap();
        assert_eq!(task.assignees[0].role, AssigneeRole::Primary);
        assert_eq!(task.assignees[1].role, AssigneeRole::Secondary);

        let err = store.assign_agent(&task.id, "lead", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyAssigned);
        assert_healthy(&store);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();

        let err = store.assign_agent("task-99", "lead", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = store.assign_agent(&task.id, "ghost", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn inactive_agent_cannot_be_assigned() {
        let mut store = setup_store();
        add_lead(&mut store);
        store
            .update_agent(
                "lead",
                AgentPatch {
                    status: Some(AgentStatus::Inactive),
                    ..Default::default()
                },
            )
            .unwrap();
        let task = store.create_task(NewTask::titled("A")).unwrap();

        let err = store.assign_agent(&task.id, "lead", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(store.recommendations_for_agent("lead", None).unwrap().is_empty());
    }

    #[test]
    fn last_assignee_of_active_task_cannot_be_unassigned() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.start_task(&task.id).unwrap();

        let err = store.unassign_agent(&task.id, "lead").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferentialIntegrity);
        assert!(store.get_task(&task.id).unwrap().is_assigned_to("lead"));
    }

    #[test]
    fn unassigning_primary_promotes_next() {
        let mut store = setup_store();
        add_lead(&mut store);
        store.add_agent(NewAgent::new("helper")).unwrap();
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.assign_agent(&task.id, "helper", None).unwrap();

        let task = store.unassign_agent(&task.id, "lead").unwrap();
        assert_eq!(task.assignees.len(), 1);
        assert_eq!(task.assignees[0].agent_id, "helper");
        assert_eq!(task.assignees[0].role, AssigneeRole::Primary);
    }

    #[test]
    fn failed_transfer_leaves_assignees_untouched() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();

        let err = store.transfer_task(&task.id, "lead", "ghost").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let task = store.get_task(&task.id).unwrap();
        assert_eq!(task.assignees.len(), 1);
        assert!(task.is_assigned_to("lead"));
    }

    #[test]
    fn transfer_keeps_earlier_journal_entries() {
        let mut store = setup_store();
        add_lead(&mut store);
        store.add_agent(NewAgent::new("helper")).unwrap();
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.take_events();

        store
            .assign_agent(&task.id, "lead", Some(AssigneeRole::Primary))
            .unwrap();
        store.transfer_task(&task.id, "lead", "helper").unwrap();

        let events = store.take_events();
        assert_eq!(
            events,
            vec![
                StoreEvent::Assigned {
                    task_id: task.id.clone(),
                    agent_id: "lead".to_string(),
                    role: AssigneeRole::Primary,
                },
                StoreEvent::Transferred {
                    task_id: task.id.clone(),
                    from_agent: "lead".to_string(),
                    to_agent: "helper".to_string(),
                },
            ]
        );
    }

    #[test]
    fn remove_agent_needs_force_while_working() {
        let mut store = setup_store();
        add_lead(&mut store);
        let task = store.create_task(NewTask::titled("A")).unwrap();
        store.assign_agent(&task.id, "lead", None).unwrap();
        store.start_task(&task.id).unwrap();

        let err = store.remove_agent("lead", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferentialIntegrity);
        assert!(store.get_agent("lead").is_some());

        store.remove_agent("lead", true).unwrap();
        assert!(store.get_agent("lead").is_none());
        assert!(store.get_task(&task.id).unwrap().assignees.is_empty());
        assert_healthy(&store);
    }

    #[test]
    fn agent_id_is_derived_from_name() {
        let mut store = setup_store();
        let agent = store
            .add_agent(NewAgent {
                name: Some("Backend Bot".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(agent.id, "backend-bot");
        assert_eq!(agent.name, "Backend Bot");
    }
}

mod task_tests {
    use super::*;

    #[test]
    fn create_applies_defaults() {
        let mut store = setup_store();
        let task = store.create_task(NewTask::titled("  Alpha  ")).unwrap();
        assert_eq!(task.id, "task-1");
        assert_eq!(task.title, "Alpha");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.risk_level, RiskLevel::Low);
        assert_eq!(task.category, "general");
        assert!(task.created_date > 0);

        let next = store.create_task(NewTask::titled("Beta")).unwrap();
        assert_eq!(next.id, "task-2");
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut store = setup_store();
        let err = store.create_task(NewTask::titled("   ")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field.as_deref(), Some("title"));
    }

    #[test]
    fn list_filters_by_status_and_agent() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.assign_agent(&b.id, "lead", None).unwrap();

        let blocked = store.list_tasks(&TaskFilter {
            status: vec![TaskStatus::Blocked],
            ..Default::default()
        });
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, b.id);

        let mine = store.list_tasks(&TaskFilter {
            agent: Some("lead".to_string()),
            ..Default::default()
        });
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, b.id);
    }

    #[test]
    fn remove_task_needs_force_while_depended_on() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();

        let err = store.remove_task(&a.id, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferentialIntegrity);

        store.remove_task(&a.id, true).unwrap();
        assert!(store.get_task(&a.id).is_none());
        let b = store.get_task(&b.id).unwrap();
        assert_eq!(b.status, TaskStatus::Todo);
        assert!(b.dependencies.is_empty());
        assert_healthy(&store);
    }

    #[test]
    fn unknown_phase_is_rejected_once_phases_exist() {
        let mut store = setup_store();
        store
            .create_task(NewTask::titled("A").phase("anything"))
            .unwrap();

        store
            .add_phase(Phase {
                id: "build".to_string(),
                name: "Build".to_string(),
                status: PhaseStatus::Active,
                dependencies: vec![],
                deliverables: vec![],
            })
            .unwrap();
        let err = store
            .create_task(NewTask::titled("B").phase("nope"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}

mod recommendation_tests {
    use super::*;

    #[test]
    fn repeated_queries_are_identical() {
        let mut store = setup_store();
        add_lead(&mut store);
        for title in ["A", "B", "C", "D", "E"] {
            store.create_task(NewTask::titled(title)).unwrap();
        }

        let first = store.recommendations_for_agent("lead", Some(5)).unwrap();
        let second = store.recommendations_for_agent("lead", Some(5)).unwrap();
        assert_eq!(first, second);

        // Equal scores fall back to issue order.
        let ids: Vec<&str> = first.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["task-1", "task-2", "task-3", "task-4", "task-5"]);
    }

    #[test]
    fn default_limit_is_three() {
        let mut store = setup_store();
        add_lead(&mut store);
        for title in ["A", "B", "C", "D", "E"] {
            store.create_task(NewTask::titled(title)).unwrap();
        }
        assert_eq!(store.recommendations_for_agent("lead", None).unwrap().len(), 3);
    }

    #[test]
    fn priority_orders_recommendations() {
        let mut store = setup_store();
        add_lead(&mut store);
        store
            .create_task(NewTask::titled("Low").priority(Priority::Low))
            .unwrap();
        let critical = store
            .create_task(NewTask::titled("Critical").priority(Priority::Critical))
            .unwrap();

        let recs = store.recommendations_for_agent("lead", None).unwrap();
        assert_eq!(recs[0].task_id, critical.id);
        assert!(recs[0].reason.contains("critical"));
    }

    #[test]
    fn fan_out_breaks_equal_priority() {
        let mut store = setup_store();
        add_lead(&mut store);
        store.create_task(NewTask::titled("Leaf")).unwrap();
        let hub = store.create_task(NewTask::titled("Hub")).unwrap();
        for title in ["X", "Y"] {
            store
                .create_task(NewTask::titled(title).depends_on(&hub.id))
                .unwrap();
        }

        let recs = store.recommendations_for_agent("lead", None).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].task_id, hub.id);
        assert_eq!(recs[0].breakdown.dependents, 2);
    }

    #[test]
    fn active_phase_outranks_pending_phase() {
        let mut store = setup_store();
        add_lead(&mut store);
        for (id, status) in [("now", PhaseStatus::Active), ("later", PhaseStatus::Pending)] {
            store
                .add_phase(Phase {
                    id: id.to_string(),
                    name: id.to_string(),
                    status,
                    dependencies: vec![],
                    deliverables: vec![],
                })
                .unwrap();
        }
        store
            .create_task(NewTask::titled("Future").phase("later"))
            .unwrap();
        let current = store
            .create_task(NewTask::titled("Current").phase("now"))
            .unwrap();

        let recs = store.recommendations_for_agent("lead", None).unwrap();
        assert_eq!(recs[0].task_id, current.id);
        assert!(recs[0].breakdown.phase > 0);
    }

    #[test]
    fn explicit_capability_filters_agents() {
        let mut store = setup_store();
        store
            .add_agent(NewAgent::new("fe").with_capabilities(["frontend"]))
            .unwrap();
        store
            .add_agent(NewAgent::new("be").with_capabilities(["backend"]))
            .unwrap();
        add_lead(&mut store);
        let task = store
            .create_task(NewTask::titled("Anything").requires("backend"))
            .unwrap();

        assert!(store.eligible_tasks("fe").unwrap().is_empty());
        assert_eq!(store.eligible_tasks("be").unwrap()[0].id, task.id);
        assert_eq!(store.eligible_tasks("lead").unwrap()[0].id, task.id);
    }

    #[test]
    fn category_keywords_infer_capability() {
        let mut store = setup_store();
        store
            .add_agent(NewAgent::new("fe").with_capabilities(["frontend"]))
            .unwrap();
        store
            .add_agent(NewAgent::new("be").with_capabilities(["backend"]))
            .unwrap();
        let task = store
            .create_task(NewTask::titled("Build settings page").category("frontend"))
            .unwrap();

        assert_eq!(store.eligible_tasks("fe").unwrap()[0].id, task.id);
        assert!(store.eligible_tasks("be").unwrap().is_empty());
    }

    #[test]
    fn disabled_inference_lets_anyone_take_untagged_tasks() {
        let mut store = setup_store_with(StoreSettings {
            matcher: Arc::new(NoInference),
            ..Default::default()
        });
        store
            .add_agent(NewAgent::new("be").with_capabilities(["backend"]))
            .unwrap();
        store
            .create_task(NewTask::titled("Build settings page").category("frontend"))
            .unwrap();
        assert_eq!(store.eligible_tasks("be").unwrap().len(), 1);
    }

    #[test]
    fn scores_are_stored_on_tasks() {
        let mut store = setup_store();
        let task = store
            .create_task(NewTask::titled("A").priority(Priority::Critical))
            .unwrap();
        // critical 40 + high risk 15
        assert_eq!(store.get_task(&task.id).unwrap().recommendation_score, 55);
    }
}

mod workload_tests {
    use super::*;

    #[test]
    fn workload_is_derived_from_tasks() {
        let mut store = setup_store();
        add_lead(&mut store);
        let a = store.create_task(NewTask::titled("A")).unwrap();
        let b = store.create_task(NewTask::titled("B")).unwrap();
        let c = store.create_task(NewTask::titled("C")).unwrap();
        for id in [&a.id, &b.id, &c.id] {
            store.assign_agent(id, "lead", None).unwrap();
        }
        store.start_task(&a.id).unwrap();
        store.start_task(&b.id).unwrap();
        store.complete_task(&b.id).unwrap();

        let workload = store.workload("lead").unwrap();
        assert_eq!(workload.active_tasks, 1);
        assert_eq!(workload.completed_tasks, 1);
        assert_eq!(workload.todo_tasks, 1);
        assert_eq!(
            workload.total_score,
            store.get_task(&b.id).unwrap().recommendation_score
        );
    }

    #[test]
    fn check_in_reactivates_and_recommends() {
        let mut store = setup_store();
        add_lead(&mut store);
        store
            .update_agent(
                "lead",
                AgentPatch {
                    status: Some(AgentStatus::Inactive),
                    ..Default::default()
                },
            )
            .unwrap();
        store.create_task(NewTask::titled("A")).unwrap();

        let check_in = store.agent_check_in("lead", None).unwrap();
        assert_eq!(check_in.agent.status, AgentStatus::Active);
        assert_eq!(check_in.recommendations.len(), 1);
        assert!(check_in.current_tasks.is_empty());
    }

    #[test]
    fn project_status_reports_blocked_reasons() {
        let mut store = setup_store();
        let a = store.create_task(NewTask::titled("A")).unwrap();
        store
            .create_task(NewTask::titled("B").depends_on(&a.id))
            .unwrap();
        store.cancel_task(&a.id).unwrap();

        let status = store.project_status();
        assert_eq!(status.total_tasks, 2);
        assert_eq!(status.by_status["cancelled"], 1);
        assert_eq!(status.by_status["blocked"], 1);
        assert_eq!(status.blocked.len(), 1);
        assert_eq!(
            status.blocked[0].reason,
            Some(BlockedReason::DependencyCancelled)
        );
        assert_eq!(status.completion_percent, 0.0);
    }
}

mod snapshot_tests {
    use super::*;

    const HAND_EDITED: &str = r#"{
        "schema_version": 1,
        "version": 3,
        "project": { "name": "hand-edited" },
        "tasks": [
            { "id": "task-1", "seq": 1, "title": "Foundation", "status": "todo",
              "blocks": ["task-3"], "recommendation_score": 9999 },
            { "id": "task-2", "seq": 2, "title": "Walls", "status": "todo",
              "dependencies": ["task-1"] },
            { "id": "task-3", "seq": 3, "title": "Roof", "status": "blocked",
              "dependencies": ["task-9"], "blocked_reason": "waiting-on-dependencies" }
        ],
        "next_task_seq": 4
    }"#;

    fn load(json: &str) -> Result<Store, task_assign_mcp::error::CoreError> {
        let snapshot = Snapshot::from_json(json).expect("valid snapshot json");
        Store::from_snapshot(snapshot, StoreSettings::default())
    }

    #[test]
    fn derived_fields_are_rebuilt_on_load() {
        let store = load(HAND_EDITED).unwrap();
        assert_eq!(store.base_version(), 3);

        let foundation = store.get_task("task-1").unwrap();
        let expected: Vec<&str> = vec!["task-2"];
        assert_eq!(
            foundation.blocks.iter().map(String::as_str).collect::<Vec<_>>(),
            expected
        );

        let walls = store.get_task("task-2").unwrap();
        assert_eq!(walls.status, TaskStatus::Blocked);
        assert_eq!(
            walls.blocked_reason,
            Some(BlockedReason::WaitingOnDependencies)
        );
        assert_eq!(walls.blocked_by, vec!["task-1".to_string()]);

        let roof = store.get_task("task-3").unwrap();
        assert_eq!(roof.status, TaskStatus::Blocked);
        assert_eq!(roof.blocked_reason, Some(BlockedReason::MissingDependency));
        assert_eq!(roof.blocked_by, vec!["task-9".to_string()]);

        assert_healthy(&store);
    }

    #[test]
    fn stored_scores_are_ignored() {
        let store = load(HAND_EDITED).unwrap();
        let clean = load(&HAND_EDITED.replace("9999", "0")).unwrap();

        let score = store.get_task("task-1").unwrap().recommendation_score;
        assert_ne!(score, 9999);
        assert_eq!(
            score,
            clean.get_task("task-1").unwrap().recommendation_score
        );
    }

    #[test]
    fn load_records_no_events() {
        let mut store = load(HAND_EDITED).unwrap();
        assert!(store.take_events().is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn cyclic_snapshot_is_rejected() {
        let err = load(
            r#"{
                "schema_version": 1,
                "project": { "name": "loop" },
                "tasks": [
                    { "id": "task-1", "title": "A", "dependencies": ["task-2"] },
                    { "id": "task-2", "title": "B", "dependencies": ["task-1"] }
                ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CyclicDependency);
    }

    #[test]
    fn started_task_with_open_dependency_is_rejected() {
        let err = load(
            r#"{
                "schema_version": 1,
                "project": { "name": "early" },
                "tasks": [
                    { "id": "task-1", "title": "A", "status": "todo" },
                    { "id": "task-2", "title": "B", "status": "in-progress",
                      "dependencies": ["task-1"] }
                ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEligible);
        assert!(err.message.contains("task-2"));
    }

    #[test]
    fn completed_task_with_missing_dependency_is_rejected() {
        let err = load(
            r#"{
                "schema_version": 1,
                "project": { "name": "orphan" },
                "tasks": [
                    { "id": "task-1", "title": "A", "status": "completed",
                      "dependencies": ["task-7"] }
                ]
            }"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEligible);
    }
}
