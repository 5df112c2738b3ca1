//! End-to-end responder behaviour over the in-memory signer and relay.

use bunker_core::mock::{journal, MockRelay, MockSigner};
use bunker_core::{
    CipherSuite, ConnectPolicy, Envelope, Identity, Request, Responder, ResponderOptions,
    Response,
};
use std::time::Duration;

const LOCAL: &str = "L";
const SECRET: &str = "s3cr3t";

async fn send(client: &MockSigner, id: &str, method: &str, params: &[&str]) -> Envelope {
    let request = Request::new(id, method, params.iter().map(|p| p.to_string()).collect());
    client
        .seal(CipherSuite::Nip44, &LOCAL.into(), &request.to_json().unwrap())
        .await
        .unwrap()
}

async fn reply(client: &MockSigner, envelope: &Envelope) -> Response {
    assert_eq!(envelope.recipient().as_ref(), Some(client.identity()));
    Response::from_json(&client.open(envelope).await.unwrap()).unwrap()
}

fn responder(relay: &MockRelay, options: ResponderOptions) -> Responder<MockSigner, MockRelay> {
    Responder::new(MockSigner::new(LOCAL), relay.clone(), options)
}

fn options() -> ResponderOptions {
    ResponderOptions::new(SECRET.to_string())
}

#[tokio::test]
async fn connect_then_introspect_then_stranger() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    let z = MockSigner::new("Z");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "2", "get_public_key", &[]).await);
    relay.deliver(send(&z, "3", "get_public_key", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, options());
    bunker.run().await.unwrap();
    assert_eq!(bunker.authorized(), Some(Identity::from("R")));

    let published = relay.published();
    assert_eq!(published.len(), 3);
    assert_eq!(reply(&r, &published[0]).await, Response::ok("1", "ack"));
    assert_eq!(reply(&r, &published[1]).await, Response::ok("2", LOCAL));
    assert_eq!(reply(&z, &published[2]).await, Response::error("3", "Unauthorized"));
}

#[tokio::test]
async fn wrong_secret_gets_no_reply() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, "guess"]).await);
    relay.deliver(send(&r, "2", "connect", &["someone-else", SECRET]).await);
    relay.deliver(send(&r, "3", "ping", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, options());
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 1);
    assert_eq!(reply(&r, &published[0]).await, Response::error("3", "Unauthorized"));
    assert_eq!(bunker.authorized(), None);
}

#[tokio::test]
async fn malformed_params_do_not_stop_the_loop() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "2", "nip04_encrypt", &["P"]).await);
    relay.deliver(send(&r, "3", "sign_event", &["{not json"]).await);
    relay.deliver(send(&r, "4", "ping", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, options());
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 4);
    assert_eq!(
        reply(&r, &published[1]).await,
        Response::error("2", "nip04_encrypt needs [peer, payload]")
    );
    let bad_template = reply(&r, &published[2]).await;
    assert_eq!(bad_template.id, "3");
    assert!(bad_template.is_error());
    assert_eq!(reply(&r, &published[3]).await, Response::ok("4", "pong"));
}

#[tokio::test]
async fn empty_secret_never_authorizes() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, ""]).await);
    relay.deliver(send(&r, "2", "connect", &[LOCAL]).await);
    relay.deliver(send(&r, "3", "ping", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, ResponderOptions::new(String::new()));
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 1);
    assert_eq!(reply(&r, &published[0]).await, Response::error("3", "Unauthorized"));
    assert_eq!(bunker.authorized(), None);
}

#[tokio::test]
async fn responses_are_published_before_next_request_is_read() {
    let calls = journal();
    let relay = MockRelay::with_journal(calls.clone());
    let r = MockSigner::new("R");

    relay.deliver(send(&r, "slow", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "fast", "ping", &[]).await);
    relay.finish();

    let signer = MockSigner::new(LOCAL)
        .with_sign_delay(Duration::from_millis(50))
        .with_journal(calls.clone());
    let mut bunker = Responder::new(signer, relay.clone(), options());
    bunker.run().await.unwrap();

    let calls = calls.lock().unwrap().clone();
    let first_publish = calls.iter().position(|c| c == "publish").unwrap();
    let second_decrypt = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| *c == "decrypt")
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    assert!(first_publish < second_decrypt, "{calls:?}");

    let published = relay.published();
    assert_eq!(reply(&r, &published[0]).await.id, "slow");
    assert_eq!(reply(&r, &published[1]).await.id, "fast");
}

#[tokio::test]
async fn undecodable_envelopes_are_skipped() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    let stranger = MockSigner::new("S");

    // Keyed to a different pair, so decryption fails.
    let mut forged = send(&stranger, "0", "connect", &[LOCAL, SECRET]).await;
    forged.pubkey = Identity::from("R");
    relay.deliver(forged);
    // Decrypts, but is not a valid request.
    relay.deliver(
        r.seal(CipherSuite::Nip44, &LOCAL.into(), r#"{"id":"x","method":"ping"}"#)
            .await
            .unwrap(),
    );
    // Legacy suite inbound is still understood.
    let legacy = Request::new("1", "connect", vec![LOCAL.into(), SECRET.into()]);
    relay.deliver(
        r.seal(CipherSuite::Nip04, &LOCAL.into(), &legacy.to_json().unwrap())
            .await
            .unwrap(),
    );
    relay.finish();

    let mut bunker = responder(&relay, options());
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 1);
    assert_eq!(reply(&r, &published[0]).await, Response::ok("1", "ack"));
}

#[tokio::test]
async fn replies_use_the_request_suite_unless_forced() {
    let r = MockSigner::new("R");
    let legacy = Request::new("1", "connect", vec![LOCAL.into(), SECRET.into()]);
    let legacy = r
        .seal(CipherSuite::Nip04, &LOCAL.into(), &legacy.to_json().unwrap())
        .await
        .unwrap();

    let relay = MockRelay::new();
    relay.deliver(legacy.clone());
    relay.deliver(send(&r, "2", "ping", &[]).await);
    relay.finish();
    responder(&relay, options()).run().await.unwrap();
    let published = relay.published();
    assert_eq!(CipherSuite::detect(&published[0].content), CipherSuite::Nip04);
    assert_eq!(CipherSuite::detect(&published[1].content), CipherSuite::Nip44);
    assert_eq!(reply(&r, &published[0]).await, Response::ok("1", "ack"));

    let relay = MockRelay::new();
    relay.deliver(legacy);
    relay.finish();
    responder(&relay, options().with_suite(CipherSuite::Nip44)).run().await.unwrap();
    let published = relay.published();
    assert_eq!(CipherSuite::detect(&published[0].content), CipherSuite::Nip44);
    assert_eq!(reply(&r, &published[0]).await, Response::ok("1", "ack"));
}

#[tokio::test]
async fn rebind_lets_the_newest_caller_take_over() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    let z = MockSigner::new("Z");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&z, "2", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "3", "ping", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, options().with_policy(ConnectPolicy::Rebind));
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 3);
    assert_eq!(reply(&z, &published[1]).await, Response::ok("2", "ack"));
    assert_eq!(reply(&r, &published[2]).await, Response::error("3", "Unauthorized"));
    assert_eq!(bunker.authorized(), Some(Identity::from("Z")));
}

#[tokio::test]
async fn exclusive_keeps_the_first_caller() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    let z = MockSigner::new("Z");

    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&z, "2", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "3", "ping", &[]).await);
    relay.finish();

    let mut bunker = responder(&relay, options().with_policy(ConnectPolicy::Exclusive));
    bunker.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 2);
    assert_eq!(reply(&r, &published[1]).await, Response::ok("3", "pong"));
    assert_eq!(bunker.authorized(), Some(Identity::from("R")));
}

#[tokio::test]
async fn host_observes_authorizations() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.finish();

    let mut bunker = responder(&relay, options());
    let mut authorizations = bunker.authorizations();
    bunker.run().await.unwrap();

    assert!(authorizations.has_changed().unwrap());
    assert_eq!(*authorizations.borrow_and_update(), Some(Identity::from("R")));
}

#[tokio::test]
async fn close_lets_the_in_flight_request_finish() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "2", "ping", &[]).await);
    // No finish(): only close() can end this run.

    let signer = MockSigner::new(LOCAL).with_sign_delay(Duration::from_millis(100));
    let mut bunker = Responder::new(signer, relay.clone(), options());
    let handle = bunker.close_handle();

    let (outcome, ()) = tokio::join!(bunker.run(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
    });
    outcome.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 1);
    assert_eq!(reply(&r, &published[0]).await, Response::ok("1", "ack"));
    assert_eq!(relay.unsubscribed(), vec!["mock-sub".to_string()]);
}

#[tokio::test]
async fn close_from_outside_stops_an_idle_loop() {
    let relay = MockRelay::new();
    let mut bunker = responder(&relay, options());
    let handle = bunker.close_handle();

    let (outcome, ()) = tokio::join!(bunker.run(), async {
        relay.deliver(send(&MockSigner::new("R"), "1", "connect", &[LOCAL, SECRET]).await);
        relay.wait_for_published(1).await;
        handle.close();
    });
    outcome.unwrap();
    assert!(handle.is_closed());
    assert_eq!(relay.published().len(), 1);
}

#[tokio::test]
async fn signer_failure_surfaces_from_run() {
    let relay = MockRelay::new();
    let r = MockSigner::new("R");
    relay.deliver(send(&r, "1", "connect", &[LOCAL, SECRET]).await);
    relay.deliver(send(&r, "2", "ping", &[]).await);
    relay.finish();

    let mut bunker = Responder::new(MockSigner::new(LOCAL).failing(), relay.clone(), options());
    let err = bunker.run().await.unwrap_err();
    assert!(matches!(err, bunker_core::BunkerError::Signer(_)));
    assert!(relay.published().is_empty());
}
