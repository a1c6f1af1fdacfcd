//! End-to-end document lifecycle behavior against the in-memory store.

use docflow_engine::{WorkflowEngine, WorkflowRegistry};
use docflow_store::{bootstrap, DocStore, StoreConfig};
use docflow_types::{
    DocActionId, DocEvent, DocStateId, DocTypeId, EventStatus, FlowError, GroupId, NodeKind,
    TransitionTable, Workflow,
};
use proptest::prelude::*;
use std::sync::Arc;

async fn setup() -> (Arc<dyn DocStore>, WorkflowRegistry, WorkflowEngine) {
    let store = bootstrap(StoreConfig::memory()).await.expect("store");
    let registry = WorkflowRegistry::with_store(Arc::clone(&store));
    let engine = WorkflowEngine::with_store(Arc::clone(&store));
    (store, registry, engine)
}

/// Workflow "acme.invoice": document type 1 begins at state 10, where
/// action 1 leads to state 20. States 20 and beyond carry no node here.
async fn seed_invoice(registry: &WorkflowRegistry) -> Workflow {
    let id = registry
        .create(None, "acme.invoice", DocTypeId(1), DocStateId(10))
        .await
        .expect("workflow should be created");
    let table = TransitionTable::from_pairs([(DocActionId(1), DocStateId(20))])
        .expect("table should build");
    registry
        .add_node(
            None,
            DocTypeId(1),
            DocStateId(10),
            id,
            "draft",
            NodeKind::Start,
            &table,
        )
        .await
        .expect("node should be added");
    registry.get(id).await.expect("workflow should exist")
}

async fn new_event(
    store: &Arc<dyn DocStore>,
    doctype: DocTypeId,
    state: DocStateId,
    action: DocActionId,
) -> DocEvent {
    let mut tx = store.begin().await.expect("begin");
    let id = tx
        .insert_event(doctype, state, action)
        .await
        .expect("event should insert");
    tx.commit().await.expect("commit");
    store
        .event(id)
        .await
        .expect("event read")
        .expect("event should exist")
}

#[tokio::test]
async fn applying_an_event_advances_state_and_records_one_intent() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    let new_state = engine
        .apply_event(None, &workflow, &event, &[GroupId(7)])
        .await
        .expect("application should succeed");
    assert_eq!(new_state, DocStateId(20));

    let stored = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    assert_eq!(stored.status, EventStatus::Applied);

    let intents = store
        .notifications_for_event(event.id)
        .await
        .expect("intent read");
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].event, event.id);
    assert_eq!(intents[0].group, GroupId(7));
    assert_eq!(intents[0].new_state, DocStateId(20));
}

#[tokio::test]
async fn an_event_applies_at_most_once() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    engine
        .apply_event(None, &workflow, &event, &[GroupId(7)])
        .await
        .expect("first application should succeed");

    // A refreshed snapshot is rejected up front.
    let refreshed = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    let second = engine
        .apply_event(None, &workflow, &refreshed, &[GroupId(7)])
        .await;
    assert!(matches!(second, Err(FlowError::AlreadyApplied(id)) if id == event.id));

    // A stale Created snapshot is caught by the conditional status flip.
    let stale = engine.apply_event(None, &workflow, &event, &[GroupId(7)]).await;
    assert!(matches!(stale, Err(FlowError::AlreadyApplied(id)) if id == event.id));

    let intents = store
        .notifications_for_event(event.id)
        .await
        .expect("intent read");
    assert_eq!(intents.len(), 1, "repeat attempts must not add intents");
}

#[tokio::test]
async fn unmapped_actions_are_rejected_without_effects() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(99)).await;

    let err = engine
        .apply_event(None, &workflow, &event, &[GroupId(7)])
        .await
        .expect_err("disabled action must be rejected");
    assert!(err.is_rejection());
    assert!(matches!(
        err,
        FlowError::IllegalAction {
            state: DocStateId(10),
            action: DocActionId(99),
        }
    ));

    let stored = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    assert_eq!(stored.status, EventStatus::Created);
    assert!(store
        .notifications_for_event(event.id)
        .await
        .expect("intent read")
        .is_empty());
}

#[tokio::test]
async fn type_mismatch_leaves_the_event_untouched() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(2), DocStateId(10), DocActionId(1)).await;

    let result = engine
        .apply_event(None, &workflow, &event, &[GroupId(7)])
        .await;
    assert!(matches!(
        result,
        Err(FlowError::TypeMismatch {
            workflow: DocTypeId(1),
            event: DocTypeId(2),
        })
    ));

    let stored = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    assert_eq!(stored.status, EventStatus::Created);
}

#[tokio::test]
async fn events_at_nodeless_states_report_node_not_found() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(55), DocActionId(1)).await;

    let result = engine
        .apply_event(None, &workflow, &event, &[GroupId(7)])
        .await;
    assert!(matches!(
        result,
        Err(FlowError::NodeNotFound {
            doctype: DocTypeId(1),
            state: DocStateId(55),
        })
    ));
}

#[tokio::test]
async fn duplicate_recipient_groups_collapse() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    engine
        .apply_event(
            None,
            &workflow,
            &event,
            &[GroupId(7), GroupId(7), GroupId(9)],
        )
        .await
        .expect("application should succeed");

    let mut groups: Vec<GroupId> = store
        .notifications_for_event(event.id)
        .await
        .expect("intent read")
        .into_iter()
        .map(|intent| intent.group)
        .collect();
    groups.sort();
    assert_eq!(groups, vec![GroupId(7), GroupId(9)]);
}

#[tokio::test]
async fn engine_never_settles_a_caller_unit_of_work() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    let mut tx = store.begin().await.expect("begin");
    let new_state = engine
        .apply_event(Some(tx.as_mut()), &workflow, &event, &[GroupId(7)])
        .await
        .expect("application should succeed");
    assert_eq!(new_state, DocStateId(20));
    tx.rollback().await.expect("rollback");

    let stored = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    assert_eq!(
        stored.status,
        EventStatus::Created,
        "a caller rollback must discard the engine's effects"
    );
    assert!(store
        .notifications_for_event(event.id)
        .await
        .expect("intent read")
        .is_empty());
}

#[tokio::test]
async fn caller_commit_publishes_engine_effects() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    let mut tx = store.begin().await.expect("begin");
    engine
        .apply_event(Some(tx.as_mut()), &workflow, &event, &[GroupId(7)])
        .await
        .expect("application should succeed");
    tx.commit().await.expect("commit");

    let stored = store
        .event(event.id)
        .await
        .expect("event read")
        .expect("event should exist");
    assert_eq!(stored.status, EventStatus::Applied);
    assert_eq!(
        store
            .notifications_for_event(event.id)
            .await
            .expect("intent read")
            .len(),
        1
    );
}

#[tokio::test]
async fn concurrent_applications_agree_on_one_winner() {
    let (store, registry, engine) = setup().await;
    let workflow = seed_invoice(&registry).await;
    let event = new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(1)).await;

    let (left, right) = tokio::join!(
        engine.apply_event(None, &workflow, &event, &[GroupId(7)]),
        engine.apply_event(None, &workflow, &event, &[GroupId(8)]),
    );

    let successes = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one application may win");
    for result in [left, right] {
        match result {
            Ok(state) => assert_eq!(state, DocStateId(20)),
            Err(err) => assert!(matches!(err, FlowError::AlreadyApplied(id) if id == event.id)),
        }
    }

    let intents = store
        .notifications_for_event(event.id)
        .await
        .expect("intent read");
    assert_eq!(intents.len(), 1, "only the winner records intents");
}

proptest! {
    #[test]
    fn legal_actions_apply_exactly_once_and_illegal_ones_never(
        actions in proptest::collection::vec(
            prop_oneof![Just(1i64), Just(2i64), Just(99i64)],
            1..12,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async move {
            let (store, registry, engine) = setup().await;
            let workflow = seed_invoice(&registry).await;

            for raw in actions {
                let event =
                    new_event(&store, DocTypeId(1), DocStateId(10), DocActionId(raw)).await;
                let result = engine
                    .apply_event(None, &workflow, &event, &[GroupId(7)])
                    .await;

                let stored = store
                    .event(event.id)
                    .await
                    .expect("event read")
                    .expect("event should exist");
                let intents = store
                    .notifications_for_event(event.id)
                    .await
                    .expect("intent read");

                if raw == 1 {
                    assert_eq!(result.expect("enabled action"), DocStateId(20));
                    assert_eq!(stored.status, EventStatus::Applied);
                    assert_eq!(intents.len(), 1);

                    let again = engine
                        .apply_event(None, &workflow, &stored, &[GroupId(7)])
                        .await;
                    assert!(matches!(again, Err(FlowError::AlreadyApplied(_))));
                } else {
                    assert!(matches!(result, Err(FlowError::IllegalAction { .. })));
                    assert_eq!(stored.status, EventStatus::Created);
                    assert!(intents.is_empty());
                }
            }
        });
    }
}
