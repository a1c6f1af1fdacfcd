//! Docflow lifecycle walkthrough.
//!
//! Defines an invoice workflow, applies document events through the engine,
//! and prints the notification intents recorded after each hop. Runs
//! entirely against the in-memory store.

use docflow_engine::{WorkflowEngine, WorkflowRegistry};
use docflow_store::{bootstrap, DocStore, StoreConfig};
use docflow_types::{
    DocActionId, DocEvent, DocStateId, DocTypeId, GroupId, NodeKind, TransitionTable,
};
use std::sync::Arc;

const DT_INVOICE: DocTypeId = DocTypeId(1);

const ST_DRAFT: DocStateId = DocStateId(10);
const ST_REVIEW: DocStateId = DocStateId(20);
const ST_APPROVED: DocStateId = DocStateId(30);
const ST_DISCARDED: DocStateId = DocStateId(90);

const ACT_SUBMIT: DocActionId = DocActionId(1);
const ACT_APPROVE: DocActionId = DocActionId(2);
const ACT_DISCARD: DocActionId = DocActionId(9);

const FINANCE_TEAM: GroupId = GroupId(7);
const AUDIT_TEAM: GroupId = GroupId(8);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("══════════════════════════════════════════════════");
    println!("  Docflow lifecycle demo: acme.invoice");
    println!("══════════════════════════════════════════════════");
    println!();

    let store = bootstrap(StoreConfig::memory()).await.unwrap();
    let registry = WorkflowRegistry::with_store(Arc::clone(&store));
    let engine = WorkflowEngine::with_store(Arc::clone(&store));

    let workflow_id = define_invoice_workflow(&registry).await;
    let workflow = registry.get(workflow_id).await.unwrap();

    println!("Scenario 1: the definition");
    println!(
        "  workflow {} '{}' governs document type {} from state {}",
        workflow.id, workflow.name, workflow.doctype, workflow.begin_state
    );
    for node in registry.nodes(workflow_id).await.unwrap() {
        let routes: Vec<String> = node
            .transitions
            .iter()
            .map(|(action, to_state)| format!("action {action} -> state {to_state}"))
            .collect();
        println!(
            "  node '{}' ({}) holds state {}: {}",
            node.name,
            node.kind,
            node.state,
            routes.join(", ")
        );
    }
    println!("  states {ST_APPROVED} and {ST_DISCARDED} have no node: terminal");
    println!();

    println!("Scenario 2: submitting a draft invoice");
    let submit = new_event(&store, DT_INVOICE, ST_DRAFT, ACT_SUBMIT).await;
    let new_state = engine
        .apply_event(None, &workflow, &submit, &[FINANCE_TEAM, AUDIT_TEAM, FINANCE_TEAM])
        .await
        .unwrap();
    println!("  event {} moved the document to state {new_state}", submit.id);
    print_intents(&store, &submit).await;
    println!();

    println!("Scenario 3: replaying the same event");
    let refreshed = store.event(submit.id).await.unwrap().unwrap();
    match engine
        .apply_event(None, &workflow, &refreshed, &[FINANCE_TEAM])
        .await
    {
        Ok(state) => println!("  unexpected second application to state {state}"),
        Err(err) => println!(
            "  rejected: {err} (business rejection: {})",
            err.is_rejection()
        ),
    }
    println!();

    println!("Scenario 4: an action the review state does not enable");
    let resubmit = new_event(&store, DT_INVOICE, ST_REVIEW, ACT_SUBMIT).await;
    match engine
        .apply_event(None, &workflow, &resubmit, &[FINANCE_TEAM])
        .await
    {
        Ok(state) => println!("  unexpected transition to state {state}"),
        Err(err) => println!(
            "  rejected: {err} (business rejection: {})",
            err.is_rejection()
        ),
    }
    println!();

    println!("Scenario 5: approving the invoice into a terminal state");
    let approve = new_event(&store, DT_INVOICE, ST_REVIEW, ACT_APPROVE).await;
    let new_state = engine
        .apply_event(None, &workflow, &approve, &[FINANCE_TEAM])
        .await
        .unwrap();
    println!("  event {} moved the document to state {new_state}", approve.id);
    print_intents(&store, &approve).await;

    let stray = new_event(&store, DT_INVOICE, ST_APPROVED, ACT_SUBMIT).await;
    match engine
        .apply_event(None, &workflow, &stray, &[FINANCE_TEAM])
        .await
    {
        Ok(state) => println!("  unexpected transition to state {state}"),
        Err(err) => println!("  nothing moves out of state {ST_APPROVED}: {err}"),
    }

    println!();
    println!("Demo complete.");
}

/// Invoice lifecycle: draft -> review -> approved, with a discard edge to
/// a closed state from both working states.
async fn define_invoice_workflow(registry: &WorkflowRegistry) -> docflow_types::WorkflowId {
    let id = registry
        .create(None, "acme.invoice", DT_INVOICE, ST_DRAFT)
        .await
        .unwrap();

    let draft_routes = TransitionTable::from_pairs([
        (ACT_SUBMIT, ST_REVIEW),
        (ACT_DISCARD, ST_DISCARDED),
    ])
    .unwrap();
    registry
        .add_node(None, DT_INVOICE, ST_DRAFT, id, "draft", NodeKind::Start, &draft_routes)
        .await
        .unwrap();

    let review_routes = TransitionTable::from_pairs([
        (ACT_APPROVE, ST_APPROVED),
        (ACT_DISCARD, ST_DISCARDED),
    ])
    .unwrap();
    registry
        .add_node(
            None,
            DT_INVOICE,
            ST_REVIEW,
            id,
            "review",
            NodeKind::Normal,
            &review_routes,
        )
        .await
        .unwrap();

    id
}

async fn new_event(
    store: &Arc<dyn DocStore>,
    doctype: DocTypeId,
    state: DocStateId,
    action: DocActionId,
) -> DocEvent {
    let mut tx = store.begin().await.unwrap();
    let id = tx.insert_event(doctype, state, action).await.unwrap();
    tx.commit().await.unwrap();
    store.event(id).await.unwrap().unwrap()
}

async fn print_intents(store: &Arc<dyn DocStore>, event: &DocEvent) {
    for intent in store.notifications_for_event(event.id).await.unwrap() {
        println!(
            "  intent {}: notify group {} that event {} reached state {}",
            intent.id, intent.group, intent.event, intent.new_state
        );
    }
}
