//! SQS consumer batching and drain, against a recording client

use std::sync::Arc;

use modl_delivery::{
    Completion, Credentials, DeliveryClient, DeliveryOutcome, HttpMethod, ObservationConsumer, SignedRequest,
    SqsObservationConsumer,
};
use modl_runtime::Observation;
use parking_lot::Mutex;

struct Pending {
    task_id: u64,
    on_complete: Completion,
}

/// Records requests; the test decides when and how they complete
#[derive(Clone, Default)]
struct RecordingClient {
    pending: Arc<Mutex<Vec<Pending>>>,
    sent: Arc<Mutex<Vec<SignedRequest>>>,
}

impl RecordingClient {
    fn complete_all(&self, status: u16) {
        let pending: Vec<Pending> = std::mem::take(&mut *self.pending.lock());
        for task in pending {
            (task.on_complete)(DeliveryOutcome::status(task.task_id, status));
        }
    }

    fn complete_first(&self, status: u16) {
        let task = self.pending.lock().remove(0);
        (task.on_complete)(DeliveryOutcome::status(task.task_id, status));
    }

    fn sent(&self) -> Vec<SignedRequest> {
        self.sent.lock().clone()
    }
}

impl DeliveryClient for RecordingClient {
    fn dispatch(&self, task_id: u64, request: SignedRequest, on_complete: Completion) {
        self.sent.lock().push(request);
        self.pending.lock().push(Pending { task_id, on_complete });
    }
}

fn credentials() -> Credentials {
    Credentials {
        scheme: "https".into(),
        host: "sqs.eu-west-1.amazonaws.com".into(),
        region: "eu-west-1".into(),
        endpoint: "123456789012/observations".into(),
        access_key: "AKIDEXAMPLE".into(),
        secret_key: "secret".into(),
        session_id: "session-1".into(),
    }
}

/// Number of queue messages carried by a request
fn message_count(request: &SignedRequest) -> usize {
    match request.method {
        HttpMethod::Get => 1,
        HttpMethod::Post => {
            let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
            body["Entries"].as_array().unwrap().len()
        }
    }
}

#[test]
fn test_scenario_d_batches_then_drain() {
    let client = RecordingClient::default();
    let mut consumer = SqsObservationConsumer::new(client.clone(), credentials()).with_batch_size(3);
    assert!(consumer.initialize());

    for _ in 0..7 {
        consumer.on_observation(&Observation::new());
    }
    assert_eq!(client.sent().len(), 2);
    assert_eq!(consumer.current_buffer_size(), 1);
    assert!(!consumer.is_done());

    consumer.deinitialize();
    let sent = client.sent();
    let sizes: Vec<usize> = sent.iter().map(message_count).collect();
    assert_eq!(sizes, vec![3, 3, 1, 1]);
    assert_eq!(consumer.current_buffer_size(), 0);

    // The last task is the DONE message with the session total
    assert_eq!(sent[3].method, HttpMethod::Get);
    assert!(sent[3].url.contains("DONE"));
    assert!(sent[3].url.contains("total%22%3A7"));
    assert!(sent[2].url.contains("OBSERVATION"));

    // Batches carry the queue url and the batch target
    let body: serde_json::Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(
        body["QueueUrl"],
        "https://sqs.eu-west-1.amazonaws.com/123456789012/observations"
    );
    assert_eq!(body["Entries"][2]["Id"], "2");
    assert!(sent[0]
        .headers
        .iter()
        .any(|(name, value)| name == "x-amz-target" && value == "AmazonSQS.SendMessageBatch"));

    assert_eq!(consumer.outstanding_tasks(), 4);
    client.complete_first(200);
    assert!(!consumer.is_done());
    client.complete_all(200);
    assert!(consumer.is_done());
    assert!(!consumer.was_any_message_refused());
}

#[test]
fn test_batch_size_one_sends_each_observation() {
    let client = RecordingClient::default();
    let mut consumer = SqsObservationConsumer::new(client.clone(), credentials());
    assert_eq!(consumer.batch_size(), 1);
    consumer.initialize();

    consumer.on_observation(&Observation::new());
    consumer.on_observation(&Observation::new());
    let sent = client.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.method == HttpMethod::Get && r.url.contains("Action=SendMessage&")));
    assert_eq!(consumer.current_buffer_size(), 0);
}

#[test]
fn test_refused_flag_set_by_non_200() {
    let client = RecordingClient::default();
    let mut consumer = SqsObservationConsumer::new(client.clone(), credentials());
    consumer.initialize();

    consumer.on_observation(&Observation::new());
    client.complete_all(403);

    assert!(consumer.is_done());
    assert!(consumer.was_any_message_refused());
}

#[test]
fn test_invalid_batch_size_ignored() {
    let client = RecordingClient::default();
    let mut consumer = SqsObservationConsumer::new(client, credentials()).with_batch_size(4);
    consumer.set_batch_size(0);
    assert_eq!(consumer.batch_size(), 4);
}

#[test]
fn test_incomplete_credentials_fail_initialize() {
    let mut consumer = SqsObservationConsumer::new(RecordingClient::default(), Credentials::default());
    assert!(!consumer.initialize());
}
