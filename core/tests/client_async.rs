//! Asynchronous requests against the stub engine, whose completions arrive on
//! engine-owned threads in whatever order the routes dictate.

use std::time::Duration;

use httpc_core::{Client, EngineSymbols, HttpRequest, NativeEngine, SubmissionError};
use httpc_stub::StubResponse;

fn client() -> Client {
    let engine = unsafe { NativeEngine::resolve(&EngineSymbols::default(), httpc_stub::symbol) }.unwrap();
    Client::new(engine)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scripted_response_resolves() {
    init_tracing();
    let url = "http://example.com/async-page";
    httpc_stub::script(url, StubResponse::new(200).body("Example Domain").content_type("text/html"));

    let resp = client().request_async("GET", url, (), ()).await.unwrap().unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_deref(), Some("Example Domain"));
    assert_eq!(httpc_stub::freed(url), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_requests_do_not_cross() {
    init_tracing();
    let c = client();
    let slow = c.request_async("GET", "stub://delay/150/slow", (), ());
    let fast = c.request_async("GET", "stub://delay/10/fast", (), ());
    assert_ne!(slow.call_id(), fast.call_id());

    let (slow, fast) = tokio::join!(slow, fast);
    let (slow, fast) = (slow.unwrap().unwrap(), fast.unwrap().unwrap());
    assert_eq!(slow.body.as_deref(), Some("slow"));
    assert_eq!(slow.header("x-tag"), Some("slow"));
    assert_eq!(fast.body.as_deref(), Some("fast"));
    assert_eq!(fast.header("x-tag"), Some("fast"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn faster_request_finishes_first() {
    let c = client();
    let slow = c.request_async("GET", "stub://delay/200/first-submitted", (), ());
    let fast = c.request_async("GET", "stub://delay/5/second-submitted", (), ());

    let winner = tokio::select! {
        r = slow => r.unwrap().unwrap().body,
        r = fast => r.unwrap().unwrap().body,
    };
    assert_eq!(winner.as_deref(), Some("second-submitted"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffers_survive_until_completion() {
    init_tracing();
    let request = HttpRequest::new("POST", "stub://echo")
        .header("X-Trace", "abc123")
        .body("late read");
    // The stub reads its arguments on the worker thread, after this returns.
    let pending = client().send_async(&request);
    drop(request);

    let resp = pending.await.unwrap().unwrap();
    assert_eq!(resp.body.as_deref(), Some("late read"));
    assert_eq!(resp.header("x-trace"), Some("abc123"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn null_completion_resolves_to_absent() {
    let resp = client().request_async("GET", "stub://null", (), ()).await.unwrap();
    assert_eq!(resp, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_completion_resolves_to_absent_and_frees() {
    let url = "http://async.test/bad-utf8";
    httpc_stub::script(url, StubResponse::new(200).content_type(vec![0xff]));

    let resp = client().request_async("GET", url, (), ()).await.unwrap();
    assert_eq!(resp, None);
    assert_eq!(httpc_stub::freed(url), 1);
    assert_eq!(httpc_stub::live(url), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_submission_is_an_error() {
    init_tracing();
    let pending = client().request_async("GET", "stub://reject", (), ());
    assert!(pending.call_id().is_none());
    match pending.await {
        Err(SubmissionError::Rejected(reason)) => assert!(reason.contains("stub://reject"), "{reason}"),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encode_failure_is_an_error() {
    let pending = client().request_async("GET", "stub://echo", [("X-Bad", "a\0b")], ());
    assert!(matches!(pending.await, Err(SubmissionError::Encode(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_requests_each_complete_once() {
    let url = "http://async.test/many";
    httpc_stub::script(url, StubResponse::new(202).body("queued"));
    let c = client();

    let mut handles = Vec::new();
    for i in 0..64u64 {
        let c = c.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let tag = format!("t{i}");
                let resp = c
                    .request_async("GET", &format!("stub://delay/{}/{tag}", i % 7), (), ())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(resp.body, Some(tag));
            } else {
                let resp = c.request_async("GET", url, (), ()).await.unwrap().unwrap();
                assert_eq!(resp.status, 202);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(httpc_stub::freed(url), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_future_still_frees_response() {
    let url = "http://async.test/dropped";
    httpc_stub::script(url, StubResponse::new(200).body("unwanted"));

    drop(client().request_async("GET", url, (), ()));

    for _ in 0..100 {
        if httpc_stub::freed(url) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("response for dropped future was never freed");
}
