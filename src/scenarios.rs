//! End-to-end behavior of client, handles and participant over in-memory channels

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::testing::{
    init_tracing, CollectingMessages, KeyValueHandler, ListenerEvent, LoopbackChannel, OnPrepared,
    RecordingChannel, RecordingListener,
};
use crate::*;

fn client_on(channel: &Arc<RecordingChannel>) -> TransactionalClient {
    TransactionalClient::connect(channel.clone(), ClientConfig::default(), Arc::new(NoOpObserver)).unwrap()
}

fn request(name: &str) -> ModelValue {
    ModelValue::object().with("operation", "write").with("name", name)
}

fn result(tag: &str) -> ModelValue {
    ModelValue::object().with("outcome", "success").with("result", tag)
}

/// Observer that keeps protocol violations
#[derive(Default)]
struct ViolationLog {
    violations: Mutex<Vec<ProtocolViolation>>,
}

impl OperationObserver for ViolationLog {
    fn on_submitted(&self, _id: OperationId) {}
    fn on_prepared(&self, _id: OperationId, _elapsed_millis: u64) {}
    fn on_decision_sent(&self, _id: OperationId, _decision: Decision) {}
    fn on_completed(&self, _id: OperationId, _elapsed_millis: u64) {}
    fn on_failed(&self, _id: OperationId, _failure: &FailureDescription) {}
    fn on_protocol_violation(&self, violation: &ProtocolViolation) {
        self.violations.lock().push(violation.clone());
    }
    fn on_channel_closed(&self, _pending: usize) {}
}

#[test]
fn test_prepare_commit_complete() {
    init_tracing();
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    assert_eq!(id, OperationId::new(1));
    assert!(matches!(channel.sent().as_slice(), [OutboundMessage::Execute { id: sent, .. }] if *sent == id));
    assert_eq!(client.phase_of(id), Some(OperationPhase::Submitted));

    channel.deliver(InboundMessage::Prepared { id, result: result("r1") });
    assert_eq!(client.phase_of(id), Some(OperationPhase::Prepared));
    let handle = listener.prepared().unwrap();
    assert_eq!(handle.prepared_result(), &result("r1"));
    assert!(!handle.is_done());

    handle.commit().unwrap();
    assert_eq!(channel.sent().last(), Some(&OutboundMessage::Commit { id }));

    channel.deliver(InboundMessage::Completed { id, result: result("r1-final") });
    assert_eq!(
        listener.events(),
        vec![
            ListenerEvent::Prepared(id, result("r1")),
            ListenerEvent::Complete(id, result("r1-final")),
        ]
    );
    assert_eq!(client.phase_of(id), None);
    assert_eq!(client.pending_count(), 0);
    assert_eq!(
        handle.final_outcome_now(),
        Some(OperationOutcome::Completed(result("r1-final")))
    );

    let stats = client.stats();
    assert_eq!(stats.operations_submitted, 1);
    assert_eq!(stats.operations_prepared, 1);
    assert_eq!(stats.commits_sent, 1);
    assert_eq!(stats.operations_completed, 1);
}

#[test]
fn test_failed_before_prepare() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    let id = client.execute(listener.clone(), Operation::new(request("b"))).unwrap();
    assert_eq!(id, OperationId::new(2));

    channel.deliver(InboundMessage::Failed {
        id,
        failure: FailureDescription::rejected("bad request"),
    });

    assert_eq!(
        listener.events(),
        vec![ListenerEvent::Failed(id, FailureDescription::rejected("bad request"))]
    );
    assert!(listener.prepared().is_none());
    assert_eq!(client.pending_count(), 1);
}

#[test]
fn test_channel_close_fails_pending_operations_in_order() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let first = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    let second = client.execute(listener.clone(), Operation::new(request("b"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id: second, result: result("r2") });

    channel.close();

    assert_eq!(
        listener.events(),
        vec![
            ListenerEvent::Prepared(second, result("r2")),
            ListenerEvent::Failed(first, FailureDescription::channel_closed()),
            ListenerEvent::Failed(second, FailureDescription::channel_closed()),
        ]
    );
    assert_eq!(client.pending_count(), 0);
    assert!(client.is_closed());

    // A decision raced with the sweep is refused, not silently dropped
    let handle = listener.prepared().unwrap();
    assert!(matches!(handle.commit(), Err(ClientError::AlreadyFinalized(id)) if id == second));
    assert_eq!(channel.decisions_sent(second), 0);

    assert!(matches!(
        client.execute(listener.clone(), Operation::new(request("c"))),
        Err(ClientError::ChannelUnavailable(_))
    ));
    assert_eq!(client.stats().channel_closed_sweeps, 1);
}

#[test]
fn test_interleaved_operations_stay_isolated() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let first = Arc::new(RecordingListener::new());
    let second = Arc::new(RecordingListener::new());

    let a = client.execute(first.clone(), Operation::new(request("a"))).unwrap();
    let b = client.execute(second.clone(), Operation::new(request("b"))).unwrap();

    channel.deliver(InboundMessage::Prepared { id: b, result: result("b1") });
    channel.deliver(InboundMessage::Prepared { id: a, result: result("a1") });
    second.prepared().unwrap().rollback().unwrap();
    first.prepared().unwrap().commit().unwrap();
    channel.deliver(InboundMessage::Completed { id: a, result: result("a2") });
    channel.deliver(InboundMessage::Completed { id: b, result: result("b2") });

    assert_eq!(
        first.events(),
        vec![ListenerEvent::Prepared(a, result("a1")), ListenerEvent::Complete(a, result("a2"))]
    );
    assert_eq!(
        second.events(),
        vec![ListenerEvent::Prepared(b, result("b1")), ListenerEvent::Complete(b, result("b2"))]
    );
    assert_eq!(channel.sent().last(), Some(&OutboundMessage::Commit { id: a }));
    assert_eq!(client.stats().rollbacks_sent, 1);
}

#[test]
fn test_concurrent_notifications_across_threads() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);

    let submitted: Vec<(OperationId, Arc<RecordingListener>)> = (0..32)
        .map(|i| {
            let listener = Arc::new(RecordingListener::with_policy(OnPrepared::Commit));
            let id = client
                .execute(listener.clone(), Operation::new(request(&format!("k{}", i))))
                .unwrap();
            (id, listener)
        })
        .collect();

    let workers: Vec<_> = submitted
        .iter()
        .map(|(id, _)| {
            let channel = channel.clone();
            let id = *id;
            thread::spawn(move || {
                let tag = id.to_string();
                channel.deliver(InboundMessage::Prepared { id, result: result(&tag) });
                channel.deliver(InboundMessage::Completed { id, result: result(&tag) });
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for (id, listener) in &submitted {
        let tag = id.to_string();
        assert_eq!(
            listener.events(),
            vec![
                ListenerEvent::Prepared(*id, result(&tag)),
                ListenerEvent::Complete(*id, result(&tag)),
            ]
        );
        assert_eq!(channel.decisions_sent(*id), 1);
    }
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.stats().commits_sent, 32);
}

#[test]
fn test_second_decision_is_refused() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    let handle = listener.prepared().unwrap();
    let clone = handle.clone();

    handle.commit().unwrap();
    assert!(matches!(handle.commit(), Err(ClientError::AlreadyFinalized(_))));
    assert!(matches!(clone.rollback(), Err(ClientError::AlreadyFinalized(_))));
    assert_eq!(channel.decisions_sent(id), 1);
}

#[test]
fn test_decision_send_failure_fails_operation() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    channel.set_fail_sends(true);

    let handle = listener.prepared().unwrap();
    let err = handle.commit().unwrap_err();
    assert!(matches!(err, ClientError::SendFailed { id: failed, decision: Decision::Commit, .. } if failed == id));

    assert!(matches!(
        listener.events().last(),
        Some(ListenerEvent::Failed(failed, failure)) if *failed == id && failure.kind == FailureKind::SendFailed
    ));
    assert_eq!(client.pending_count(), 0);
    assert!(handle
        .final_outcome_now()
        .and_then(|outcome| outcome.failure().map(|f| f.kind))
        .is_some_and(|kind| kind == FailureKind::SendFailed));
    assert_eq!(client.stats().send_failures, 1);
}

#[test]
fn test_execute_send_failure_leaves_no_entry() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    channel.set_fail_sends(true);

    let listener = Arc::new(RecordingListener::new());
    let err = client.execute(listener.clone(), Operation::new(request("a"))).unwrap_err();
    assert!(matches!(err, ClientError::ChannelUnavailable(_)));
    assert_eq!(client.pending_count(), 0);
    assert!(listener.events().is_empty());
}

#[test]
fn test_non_finite_request_is_refused_before_sending() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let err = client
        .execute(listener.clone(), Operation::new(request("a").with("ratio", f64::INFINITY)))
        .unwrap_err();
    assert!(matches!(err, ClientError::Serialization(_)));
    assert!(channel.sent().is_empty());
    assert_eq!(client.pending_count(), 0);
    assert!(listener.events().is_empty());
}

#[test]
fn test_unopened_channel_refuses_submission() {
    let channel = Arc::new(RecordingChannel::unopened());
    let client = client_on(&channel);
    let err = client
        .execute(Arc::new(RecordingListener::new()), Operation::new(request("a")))
        .unwrap_err();
    assert!(matches!(err, ClientError::ChannelUnavailable(_)));
    assert!(channel.sent().is_empty());
}

#[test]
fn test_oversized_operation_is_refused() {
    let channel = Arc::new(RecordingChannel::new());
    let config = ClientConfig {
        max_frame_bytes: 16,
        ..ClientConfig::default()
    };
    let client = TransactionalClient::connect(channel.clone(), config, Arc::new(NoOpObserver)).unwrap();

    let err = client
        .execute(Arc::new(RecordingListener::new()), Operation::new(request("a")))
        .unwrap_err();
    assert!(matches!(err, ClientError::Serialization(_)));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_second_client_on_channel_is_refused() {
    let channel = Arc::new(RecordingChannel::new());
    let _client = client_on(&channel);
    assert!(matches!(
        create_client(channel.clone()),
        Err(ClientError::Registration(ChannelError::HandlerAlreadyRegistered))
    ));
}

#[test]
fn test_unknown_operation_is_a_violation() {
    let channel = Arc::new(RecordingChannel::new());
    let observer = Arc::new(ViolationLog::default());
    let client = TransactionalClient::connect(channel.clone(), ClientConfig::default(), observer.clone()).unwrap();

    channel.deliver(InboundMessage::Prepared {
        id: OperationId::new(99),
        result: result("r"),
    });

    assert_eq!(
        observer.violations.lock().clone(),
        vec![ProtocolViolation::UnknownOperation {
            id: OperationId::new(99),
            kind: "prepared"
        }]
    );
    assert_eq!(client.stats().protocol_violations, 1);
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_late_notifications_are_ignored() {
    let channel = Arc::new(RecordingChannel::new());
    let observer = Arc::new(ViolationLog::default());
    let client = TransactionalClient::connect(channel.clone(), ClientConfig::default(), observer.clone()).unwrap();
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    channel.deliver(InboundMessage::Prepared { id, result: result("again") });
    listener.prepared().unwrap().commit().unwrap();
    channel.deliver(InboundMessage::Completed { id, result: result("done") });
    channel.deliver(InboundMessage::Completed { id, result: result("done") });
    channel.deliver(InboundMessage::Failed {
        id,
        failure: FailureDescription::rejected("late"),
    });

    assert_eq!(listener.events().len(), 2);
    assert_eq!(listener.terminal_count(), 1);
    assert!(observer.violations.lock().is_empty());
    assert_eq!(client.stats().duplicate_notifications, 3);
}

#[test]
fn test_completed_before_prepared_is_dropped() {
    let channel = Arc::new(RecordingChannel::new());
    let observer = Arc::new(ViolationLog::default());
    let client = TransactionalClient::connect(channel.clone(), ClientConfig::default(), observer.clone()).unwrap();
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Completed { id, result: result("early") });

    assert!(listener.events().is_empty());
    assert_eq!(client.phase_of(id), Some(OperationPhase::Submitted));
    assert_eq!(
        observer.violations.lock().clone(),
        vec![ProtocolViolation::CompletedBeforePrepared { id }]
    );

    // The operation is still usable
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    assert_eq!(client.phase_of(id), Some(OperationPhase::Prepared));
}

#[test]
fn test_messages_reach_the_operation_sink() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let sink = Arc::new(CollectingMessages::new());
    let listener = Arc::new(RecordingListener::new());

    let operation = wrap(request("a"), sink.clone(), OperationAttachments::empty());
    let id = client.execute(listener.clone(), operation).unwrap();
    channel.deliver(InboundMessage::Message {
        id,
        severity: MessageSeverity::Warn,
        text: "disk almost full".into(),
    });
    channel.deliver(InboundMessage::Failed {
        id,
        failure: FailureDescription::rejected("no"),
    });
    // Finished: dropped
    channel.deliver(InboundMessage::Message {
        id,
        severity: MessageSeverity::Info,
        text: "late".into(),
    });

    assert_eq!(sink.reports(), vec![(MessageSeverity::Warn, "disk almost full".to_owned())]);
}

#[test]
fn test_close_then_execute_is_refused() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());
    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();

    client.close();
    client.close();

    assert_eq!(
        listener.events(),
        vec![ListenerEvent::Failed(id, FailureDescription::channel_closed())]
    );
    assert!(matches!(
        client.execute(listener.clone(), Operation::new(request("b"))),
        Err(ClientError::ChannelUnavailable(_))
    ));
    assert_eq!(client.stats().channel_closed_sweeps, 1);
}

#[test]
fn test_dropping_client_fails_pending_operations() {
    let channel = Arc::new(RecordingChannel::new());
    let listener = Arc::new(RecordingListener::new());
    let id = {
        let client = client_on(&channel);
        client.execute(listener.clone(), Operation::new(request("a"))).unwrap()
    };
    assert_eq!(
        listener.events(),
        vec![ListenerEvent::Failed(id, FailureDescription::channel_closed())]
    );
    // Notifications after the client is gone are ignored
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    assert_eq!(listener.events().len(), 1);
}

#[test]
fn test_await_final_outcome_after_commit() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    let handle = listener.prepared().unwrap();
    handle.commit().unwrap();

    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    handle.on_final_outcome(move |outcome| *slot.lock() = Some(outcome.clone()));

    assert!(matches!(
        handle.await_final_outcome(Duration::from_millis(5)),
        Err(WaitError::Timeout(_))
    ));

    let notifier = {
        let channel = channel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            channel.deliver(InboundMessage::Completed { id, result: result("done") });
        })
    };
    let outcome = handle.await_final_outcome(Duration::from_secs(5)).unwrap();
    notifier.join().unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.result(), Some(&result("done")));
    assert_eq!(seen.lock().clone(), Some(outcome));
}

#[tokio::test]
async fn test_final_outcome_async() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    let handle = listener.prepared().unwrap();
    handle.rollback().unwrap();

    let notifier = {
        let channel = channel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            channel.deliver(InboundMessage::Completed { id, result: result("rolled back") });
        })
    };
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.final_outcome())
        .await
        .unwrap();
    notifier.join().unwrap();
    assert_eq!(outcome, OperationOutcome::Completed(result("rolled back")));
}

#[test]
fn test_execute_blocking_released_by_close() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);

    let closer = {
        let channel = channel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            channel.close();
        })
    };
    let err = execute_blocking(Operation::new(request("a")), &client).unwrap_err();
    closer.join().unwrap();
    assert!(matches!(err, ClientError::ChannelClosed(id) if id == OperationId::new(1)));
}

#[test]
fn test_execute_blocking_returns_prepared_handle() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);

    let preparer = {
        let channel = channel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            channel.deliver(InboundMessage::Prepared {
                id: OperationId::new(1),
                result: result("r"),
            });
        })
    };
    let prepared = execute_blocking(Operation::new(request("a")), &client).unwrap();
    preparer.join().unwrap();

    assert!(!prepared.is_failed());
    assert_eq!(prepared.prepared_result(), &result("r"));
    prepared.commit().unwrap();
    assert_eq!(channel.decisions_sent(prepared.id()), 1);
}

#[test]
fn test_execute_blocking_times_out_when_configured() {
    let channel = Arc::new(RecordingChannel::new());
    let config = ClientConfig {
        prepare_timeout_millis: Some(10),
        ..ClientConfig::default()
    };
    let client = create_client_with_config(channel.clone(), config).unwrap();

    let err = execute_blocking(Operation::new(request("a")), &client).unwrap_err();
    assert!(matches!(err, ClientError::Wait(WaitError::Timeout(_))));
    // The operation itself is still pending
    assert_eq!(client.pending_count(), 1);
}

#[test]
fn test_loopback_round_trip() {
    init_tracing();
    let channel = Arc::new(LoopbackChannel::new(KeyValueHandler::new()));
    let client = create_client(channel.clone()).unwrap();
    let sink = Arc::new(CollectingMessages::new());

    let operation = wrap(KeyValueHandler::write("port", 8080), sink.clone(), OperationAttachments::empty());
    let prepared = execute_blocking(operation, &client).unwrap();
    assert_eq!(prepared.prepared_result().get("result"), Some(&ModelValue::Int(8080)));
    assert_eq!(channel.endpoint().prepared_ids(), vec![prepared.id()]);
    assert_eq!(channel.endpoint().handler().committed("port"), None);

    prepared.commit().unwrap();
    let outcome = prepared.await_default_final_outcome().unwrap();
    assert!(outcome.is_completed());
    assert_eq!(channel.endpoint().handler().committed("port"), Some(ModelValue::Int(8080)));
    assert!(channel.endpoint().prepared_ids().is_empty());
    assert_eq!(sink.reports(), vec![(MessageSeverity::Info, "staging port".to_owned())]);
}

#[test]
fn test_loopback_rejection_yields_failed_handle() {
    let channel = Arc::new(LoopbackChannel::new(KeyValueHandler::new()));
    let client = create_client(channel.clone()).unwrap();

    let prepared = execute_blocking(Operation::new(ModelValue::from("nope")), &client).unwrap();
    assert!(prepared.is_failed());
    assert_eq!(prepared.failure().map(|f| f.kind), Some(FailureKind::Rejected));
    assert!(matches!(prepared.commit(), Err(ClientError::AlreadyFinalized(_))));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_commit_from_inside_listener() {
    let channel = Arc::new(LoopbackChannel::new(KeyValueHandler::new()));
    let client = create_client(channel.clone()).unwrap();
    let listener = Arc::new(RecordingListener::with_policy(OnPrepared::Commit));

    let id = client
        .execute(listener.clone(), Operation::new(KeyValueHandler::write("mode", "fast")))
        .unwrap();

    // The completion arrives while operation_prepared is still running and is
    // delivered after it returns
    let events = listener.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ListenerEvent::Prepared(prepared, _) if *prepared == id));
    assert!(matches!(&events[1], ListenerEvent::Complete(completed, _) if *completed == id));
    assert_eq!(channel.endpoint().handler().committed("mode"), Some(ModelValue::from("fast")));
    assert!(listener.prepared().unwrap().is_done());
}

#[test]
fn test_loopback_close_fails_prepared_operation() {
    let channel = Arc::new(LoopbackChannel::new(KeyValueHandler::new()));
    let client = create_client(channel.clone()).unwrap();
    let listener = Arc::new(RecordingListener::new());

    let id = client
        .execute(listener.clone(), Operation::new(KeyValueHandler::write("port", 1)))
        .unwrap();
    channel.close();

    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::Failed(id, FailureDescription::channel_closed()))
    );
    // The participant still holds the change; recovery would find it
    assert_eq!(channel.endpoint().prepared_ids(), vec![id]);
}

#[test]
fn test_await_final_outcome_can_be_interrupted() {
    let channel = Arc::new(RecordingChannel::new());
    let client = client_on(&channel);
    let listener = Arc::new(RecordingListener::new());

    let id = client.execute(listener.clone(), Operation::new(request("a"))).unwrap();
    channel.deliver(InboundMessage::Prepared { id, result: result("r") });
    let handle = listener.prepared().unwrap();
    handle.commit().unwrap();

    let interrupter = {
        let handle = handle.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.interrupt();
        })
    };
    assert_eq!(
        handle.await_final_outcome(Duration::from_secs(5)),
        Err(WaitError::Interrupted)
    );
    interrupter.join().unwrap();

    // The operation carries on
    assert_eq!(client.phase_of(id), Some(OperationPhase::Prepared));
    channel.deliver(InboundMessage::Completed { id, result: result("done") });
    assert!(handle.is_done());
}

#[test]
fn test_maximal_configured_timeouts_wait_untimed() {
    let channel = Arc::new(RecordingChannel::new());
    let config = ClientConfig {
        prepare_timeout_millis: Some(u64::MAX),
        final_outcome_timeout_millis: u64::MAX,
        ..ClientConfig::default()
    };
    let client = create_client_with_config(channel.clone(), config).unwrap();

    let notifier = {
        let channel = channel.clone();
        thread::spawn(move || {
            let id = OperationId::new(1);
            thread::sleep(Duration::from_millis(20));
            channel.deliver(InboundMessage::Prepared { id, result: result("r") });
            while channel.decisions_sent(id) == 0 {
                thread::sleep(Duration::from_millis(5));
            }
            channel.deliver(InboundMessage::Completed { id, result: result("done") });
        })
    };

    let prepared = execute_blocking(Operation::new(request("a")), &client).unwrap();
    prepared.commit().unwrap();
    let outcome = prepared.await_default_final_outcome().unwrap();
    notifier.join().unwrap();
    assert_eq!(outcome, OperationOutcome::Completed(result("done")));

    assert!(matches!(
        prepared.await_final_outcome(Duration::MAX),
        Ok(OperationOutcome::Completed(_))
    ));
}
