//! End-to-end submission, async completion, and binding tests

mod common;

use censor_client::{
    Client, ClientConfig, CompletionSource, DecisionInput, FnHooks, MergePolicy, Poller,
    PollerConfig, SubmitInput,
};
use censor_core::{
    BizContext, BizType, Decision, Error, HistorySource, Reason, ReplacePolicy, Resource,
};
use censor_store::{MemoryStore, Store};
use common::{client_with, client_with_hooks, MockProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn bio(biz_id: &str) -> BizContext {
    BizContext::new(BizType::USER_BIO, biz_id).with_field("bio")
}

fn blocking(name: &str) -> MockProvider {
    MockProvider::new(name)
        .with_decision(Decision::Block)
        .with_reason(Reason::new("abuse", "abusive language").with_hit_tags(["idiot"]))
}

#[tokio::test]
async fn test_pass_submission() {
    let provider = Arc::new(MockProvider::new("mock"));
    let client = client_with(provider.clone(), ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "hello there")]))
        .await
        .unwrap();

    assert_eq!(result.overall_decision(), Decision::Pass);
    assert!(!result.pending_async);
    assert_eq!(provider.call_count(), 1);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert!(query.all_complete);
    assert_eq!(query.biz_review.decision, Decision::Pass);
    assert_eq!(query.final_outcome.map(|o| o.decision), Some(Decision::Pass));

    // A clean result never creates a binding
    assert!(client
        .get_binding(&BizType::USER_BIO, "u1", "bio")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_empty_submission_rejected() {
    let client = client_with(Arc::new(MockProvider::new("mock")), ClientConfig::default());
    let err = client
        .submit(SubmitInput::new(bio("u1"), Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoResources));
}

#[tokio::test]
async fn test_violation_binds_field_and_saves_snapshot() {
    let provider = Arc::new(blocking("mock"));
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();
    assert_eq!(result.overall_decision(), Decision::Block);

    let binding = client
        .get_binding(&BizType::USER_BIO, "u1", "bio")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(binding.decision, Decision::Block);
    assert_eq!(binding.review_revision, 1);

    let snapshot_id = binding.violation_ref_id.clone().unwrap();
    let snapshot = client.get_violation_snapshot(&snapshot_id).await.unwrap().unwrap();
    assert_eq!(snapshot.content_text, "you idiot");
    assert_eq!(snapshot.field, "bio");

    let history = client
        .get_binding_history(&BizType::USER_BIO, "u1", "bio", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, HistorySource::Auto);
    assert_eq!(history[0].review_revision, 1);

    let violations = client.list_violations(&BizType::USER_BIO, "u1", 10).await.unwrap();
    assert_eq!(violations.len(), 1);
}

#[tokio::test]
async fn test_dedup_reuses_bound_decision() {
    let provider = Arc::new(blocking("mock"));
    let client = client_with(provider.clone(), ClientConfig::default());

    let first = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();
    let second = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_ne!(first.biz_review_id, second.biz_review_id);
    assert_eq!(second.overall_decision(), Decision::Block);

    let query = client.query(&second.biz_review_id, None).await.unwrap();
    assert!(query.all_complete);
    assert_eq!(query.biz_review.decision, Decision::Block);

    // Nothing was sent to a provider, so nothing waits on one
    let pending = client
        .store()
        .list_pending_async_tasks("mock", 10)
        .await
        .unwrap();
    assert!(pending.is_empty());

    // Changed content is reviewed again
    client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "another idiot")]))
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_dedup_disabled_always_reviews() {
    let provider = Arc::new(blocking("mock"));
    let client = client_with(provider.clone(), ClientConfig::default().without_dedup());

    for _ in 0..2 {
        client
            .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
            .await
            .unwrap();
    }
    assert_eq!(provider.call_count(), 2);

    // Each review keeps its own evidence, so the binding moves to the new snapshot
    let binding = client
        .get_binding(&BizType::USER_BIO, "u1", "bio")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(binding.review_revision, 2);
    let violations = client.list_violations(&BizType::USER_BIO, "u1", 10).await.unwrap();
    assert_eq!(violations.len(), 2);
    assert_eq!(binding.violation_ref_id.as_deref(), Some(violations[0].id.as_str()));
}

#[tokio::test]
async fn test_provider_failure_becomes_error_outcome() {
    let provider = Arc::new(MockProvider::new("mock").failing());
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "hello")]))
        .await
        .unwrap();

    let outcome = &result.immediate_results["r1"];
    assert_eq!(outcome.decision, Decision::Error);
    assert!(!outcome.reasons.is_empty());

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert_eq!(query.biz_review.decision, Decision::Error);
}

#[tokio::test]
async fn test_aggregate_across_resources() {
    let provider = Arc::new(blocking("mock").with_trigger("idiot"));
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(
            BizContext::new(BizType::NOTE_BODY, "n1"),
            vec![
                Resource::text("p1", "a fine paragraph"),
                Resource::text("p2", "written by an idiot"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.immediate_results["p1"].decision, Decision::Pass);
    assert_eq!(result.immediate_results["p2"].decision, Decision::Block);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert_eq!(query.resource_reviews.len(), 2);
    assert_eq!(query.biz_review.decision, Decision::Block);

    let p1 = &result.resource_review_ids["p1"];
    let narrowed = client.query(&result.biz_review_id, Some(p1.as_str())).await.unwrap();
    assert_eq!(narrowed.resource_reviews.len(), 1);
    assert_eq!(narrowed.final_outcome.map(|o| o.decision), Some(Decision::Pass));
}

#[tokio::test]
async fn test_text_merge_submits_once() {
    let provider = Arc::new(MockProvider::new("mock"));
    let client = client_with(provider.clone(), ClientConfig::default());

    let result = client
        .submit(
            SubmitInput::new(
                BizContext::new(BizType::NOTE_BODY, "n1"),
                vec![
                    Resource::text("a", "first"),
                    Resource::text("b", "second"),
                    Resource::text("c", "third"),
                ],
            )
            .with_text_merge(),
        )
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(result.immediate_results.len(), 1);
    assert!(result.immediate_results.contains_key("a_merged"));
}

#[tokio::test]
async fn test_query_unknown_review() {
    let client = client_with(Arc::new(MockProvider::new("mock")), ClientConfig::default());
    let err = client.query("missing", None).await.unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}

#[tokio::test]
async fn test_secondary_merge_policies() {
    let cases = [
        (MergePolicy::MostStrict, Decision::Block),
        (MergePolicy::Any, Decision::Block),
        (MergePolicy::All, Decision::Pass),
    ];

    for (policy, expected) in cases {
        let primary = Arc::new(blocking("primary"));
        let secondary = Arc::new(MockProvider::new("secondary"));
        let client = Client::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_provider(primary.clone())
            .with_provider(secondary.clone())
            .with_config(
                ClientConfig::default()
                    .with_primary("primary")
                    .with_secondary("secondary")
                    .with_merge_policy(policy),
            )
            .build()
            .unwrap();

        let result = client
            .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
            .await
            .unwrap();

        assert_eq!(secondary.call_count(), 1, "{:?}", policy);
        assert_eq!(result.immediate_results["r1"].decision, expected, "{:?}", policy);
    }
}

#[tokio::test]
async fn test_secondary_not_triggered_on_pass() {
    let primary = Arc::new(MockProvider::new("primary"));
    let secondary = Arc::new(blocking("secondary"));
    let client = Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(primary)
        .with_provider(secondary.clone())
        .with_config(
            ClientConfig::default()
                .with_primary("primary")
                .with_secondary("secondary"),
        )
        .build()
        .unwrap();

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "hello")]))
        .await
        .unwrap();
    assert_eq!(secondary.call_count(), 0);
    assert_eq!(result.overall_decision(), Decision::Pass);
}

/// Client with providers registered as "primary" and "secondary"
fn with_secondary(primary: Arc<MockProvider>, secondary: Arc<MockProvider>) -> Client {
    Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(primary.clone())
        .with_provider(secondary.clone())
        .with_config(
            ClientConfig::default()
                .with_primary("primary")
                .with_secondary("secondary")
                .with_merge_policy(MergePolicy::MostStrict),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_failing_secondary_keeps_primary_result() {
    let primary = Arc::new(blocking("primary"));
    let secondary = Arc::new(MockProvider::new("secondary").failing());
    let client = with_secondary(primary, secondary.clone());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    assert_eq!(secondary.call_count(), 1);
    assert_eq!(result.immediate_results["r1"].decision, Decision::Block);
    assert_eq!(result.overall_decision(), Decision::Block);

    // The failure is kept with the primary task
    let task = client
        .store()
        .get_provider_task_by_remote_id("primary", "primary_r1_0")
        .await
        .unwrap()
        .unwrap();
    assert!(task.done);
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&task.raw_json).unwrap();
    let pipeline = &raw["pipeline"];
    assert!(pipeline["secondary_error"].as_str().unwrap().contains("mock provider unavailable"));
    assert!(pipeline["provider_results"].get("primary").is_some());
    assert!(pipeline.get("secondary_task_id").is_none());
}

#[tokio::test]
async fn test_async_secondary_does_not_override_primary() {
    let primary = Arc::new(blocking("primary"));
    let secondary = Arc::new(MockProvider::new("secondary").with_async());
    let client = with_secondary(primary, secondary.clone());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();
    assert_eq!(secondary.call_count(), 1);
    assert_eq!(result.overall_decision(), Decision::Block);
    assert!(!result.pending_async);

    let task = client
        .store()
        .get_provider_task_by_remote_id("secondary", "secondary_r1_0")
        .await
        .unwrap()
        .unwrap();
    assert!(task.done);

    let stats = Poller::new(client.clone()).poll_now().await.unwrap();
    assert_eq!(stats.completed, 0);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert!(query.all_complete);
    assert_eq!(query.biz_review.decision, Decision::Block);
    assert_eq!(query.final_outcome.map(|o| o.decision), Some(Decision::Block));
    let outcome = query.resource_reviews[0].outcome().unwrap().unwrap();
    assert_eq!(outcome.decision, Decision::Block);

    let binding = client
        .get_binding(&BizType::USER_BIO, "u1", "bio")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(binding.decision, Decision::Block);
    assert_eq!(binding.review_revision, 1);
}

#[tokio::test]
async fn test_async_completion_via_poller() {
    let provider = Arc::new(blocking("mock").with_async());
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();
    assert!(result.pending_async);
    assert!(result.immediate_results.is_empty());
    assert_eq!(result.overall_decision(), Decision::Pending);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert!(!query.all_complete);
    assert!(query.final_outcome.is_none());

    let poller = Poller::new(client.clone());
    let stats = poller.poll_now().await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.completed, 1);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert!(query.all_complete);
    assert_eq!(query.biz_review.decision, Decision::Block);
    assert!(client
        .get_binding(&BizType::USER_BIO, "u1", "bio")
        .await
        .unwrap()
        .is_some());

    // Nothing left to poll
    let stats = poller.poll_now().await.unwrap();
    assert_eq!(stats.checked, 0);
}

#[tokio::test]
async fn test_callback_and_poller_complete_once() {
    let provider = Arc::new(blocking("mock").with_async());
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    client
        .handle_callback("mock", &HashMap::new(), b"mock_r1_0")
        .await
        .unwrap();
    // A repeated delivery is accepted and ignored
    client
        .handle_callback("mock", &HashMap::new(), b"mock_r1_0")
        .await
        .unwrap();

    let stats = Poller::new(client.clone()).poll_now().await.unwrap();
    assert_eq!(stats.checked, 0);

    let task = client
        .store()
        .get_provider_task_by_remote_id("mock", "mock_r1_0")
        .await
        .unwrap()
        .unwrap();
    assert!(task.done);
    let again = client
        .complete_provider_task(&task, true, None, &HashMap::new(), CompletionSource::Poller)
        .await
        .unwrap();
    assert!(!again);

    let history = client
        .get_binding_history(&BizType::USER_BIO, "u1", "bio", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert_eq!(query.biz_review.decision, Decision::Block);
}

#[tokio::test]
async fn test_callback_errors() {
    let client = client_with(Arc::new(MockProvider::new("mock").with_async()), ClientConfig::default());

    let err = client
        .handle_callback("nobody", &HashMap::new(), b"t1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderNotFound(_)));

    let err = client
        .handle_callback("mock", &HashMap::new(), b"unknown_task")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_poller_background_loop() {
    let provider = Arc::new(blocking("mock").with_async());
    let client = client_with(provider, ClientConfig::default());

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    let poller = Poller::with_config(
        client.clone(),
        PollerConfig::default().with_interval(Duration::from_secs(1)),
    );
    assert_eq!(poller.providers().len(), 1);
    poller.start();
    assert!(poller.is_running());

    tokio::time::sleep(Duration::from_secs(3)).await;

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert!(query.all_complete);
    assert_eq!(query.biz_review.decision, Decision::Block);

    poller.stop().await;
    assert!(!poller.is_running());
}

#[tokio::test]
async fn test_poller_provider_selection() {
    let sync = Arc::new(MockProvider::new("sync"));
    let client = client_with(sync, ClientConfig::default());

    // Sync-only providers are not polled
    assert!(Poller::new(client.clone()).providers().is_empty());

    let configured = Poller::with_config(
        client,
        PollerConfig::default().with_providers(["sync", "unregistered"]),
    );
    let names: Vec<String> = configured
        .providers()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["sync"]);
}

#[tokio::test]
async fn test_review_goes_to_manual_provider() {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let hooks = FnHooks::new().on_manual_review_required(move |event| {
        seen.lock().unwrap().push(event.manual_task_id.clone());
        Ok(())
    });

    let primary = Arc::new(MockProvider::new("auto").with_decision(Decision::Review));
    let manual = Arc::new(MockProvider::new("manual").with_decision(Decision::Block).with_async());
    let client = Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(primary)
        .with_provider(manual.clone())
        .with_hooks(Arc::new(hooks))
        .with_config(
            ClientConfig::default()
                .with_primary("auto")
                .with_manual_provider("manual"),
        )
        .build()
        .unwrap();

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "borderline")]))
        .await
        .unwrap();
    assert!(result.pending_async);
    assert_eq!(result.immediate_results["r1"].decision, Decision::Review);
    assert_eq!(manual.call_count(), 1);

    let task_id = requests.lock().unwrap().first().cloned().unwrap();
    assert_eq!(task_id, "manual_r1_0");

    // The reviewer confirms a block
    client
        .handle_callback("manual", &HashMap::new(), task_id.as_bytes())
        .await
        .unwrap();

    let query = client.query(&result.biz_review_id, None).await.unwrap();
    assert_eq!(query.biz_review.decision, Decision::Block);

    let history = client
        .get_binding_history(&BizType::USER_BIO, "u1", "bio", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].source, HistorySource::Manual);
    assert_eq!(history[0].review_revision, 2);
    assert_eq!(history[0].decision, Decision::Block);
}

#[tokio::test]
async fn test_manual_provider_must_be_registered() {
    let result = Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(Arc::new(MockProvider::new("auto")))
        .with_config(
            ClientConfig::default()
                .with_primary("auto")
                .with_manual_provider("manual"),
        )
        .build();
    assert!(matches!(result, Err(Error::ProviderNotFound(_))));
}

#[tokio::test]
async fn test_hooks_fire_on_violation() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c) = (events.clone(), events.clone(), events.clone());
    let hooks = FnHooks::new()
        .on_resource_reviewed(move |_| {
            a.lock().unwrap().push("reviewed");
            Ok(())
        })
        .on_violation_detected(move |e| {
            assert!(!e.snapshot_id.is_empty());
            b.lock().unwrap().push("violation");
            Ok(())
        })
        .on_biz_decision_changed(move |e| {
            assert_eq!(e.previous_decision, Decision::Pending);
            assert_eq!(e.outcome.decision, Decision::Block);
            c.lock().unwrap().push("biz_changed");
            Ok(())
        });

    let client = client_with_hooks(Arc::new(blocking("mock")), ClientConfig::default(), Arc::new(hooks));
    client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["violation", "reviewed", "biz_changed"]
    );
}

#[tokio::test]
async fn test_failing_hook_does_not_fail_submission() {
    let hooks = FnHooks::new().on_resource_reviewed(|_| Err(Error::internal("hook down")));
    let client = client_with_hooks(
        Arc::new(MockProvider::new("mock")),
        ClientConfig::default(),
        Arc::new(hooks),
    );

    let result = client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "hello")]))
        .await
        .unwrap();
    assert_eq!(result.overall_decision(), Decision::Pass);
}

#[tokio::test]
async fn test_apply_decision_appeal() {
    let client = client_with(Arc::new(blocking("mock")), ClientConfig::default());
    client
        .submit(SubmitInput::new(bio("u1"), vec![Resource::text("r1", "you idiot")]))
        .await
        .unwrap();

    let binding = client
        .apply_decision(DecisionInput {
            biz_type: BizType::USER_BIO,
            biz_id: "u1".into(),
            field: "bio".into(),
            decision: Decision::Pass,
            replace_policy: ReplacePolicy::None,
            replace_value: String::new(),
            source: HistorySource::Appeal,
            reviewer_id: "reviewer_7".into(),
            comment: "context was a quote".into(),
            reasons: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(binding.decision, Decision::Pass);
    assert_eq!(binding.review_revision, 2);

    let history = client
        .get_binding_history(&BizType::USER_BIO, "u1", "bio", 10)
        .await
        .unwrap();
    assert_eq!(history[0].source, HistorySource::Appeal);
    assert_eq!(history[0].reviewer_id, "reviewer_7");
    assert_eq!(history[1].source, HistorySource::Auto);

    let bindings = client.get_bindings(&BizType::USER_BIO, "u1").await.unwrap();
    assert_eq!(bindings.len(), 1);
}

#[tokio::test]
async fn test_apply_decision_without_binding() {
    let client = client_with(Arc::new(MockProvider::new("mock")), ClientConfig::default());
    let input: DecisionInput = serde_json::from_value(serde_json::json!({
        "biz_type": "user_bio",
        "biz_id": "nobody",
        "field": "bio",
        "decision": "block",
        "source": "manual"
    }))
    .unwrap();
    let err = client.apply_decision(input).await.unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}
