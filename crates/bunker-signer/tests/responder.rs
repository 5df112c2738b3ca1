//! The responder driven by real keys on both ends.

use bunker_core::mock::MockRelay;
use bunker_core::{
    CipherSuite, Envelope, EventTemplate, Identity, Request, Responder, ResponderOptions,
    Response, Signer,
};
use bunker_signer::{verify_event, Keys, LocalSigner};

async fn seal(client: &LocalSigner, bunker: &Identity, request: &Request) -> Envelope {
    let content = client
        .encrypt(CipherSuite::Nip44, bunker, &request.to_json().unwrap())
        .await
        .unwrap();
    client
        .sign_event(EventTemplate::nostr_connect(bunker, content))
        .await
        .unwrap()
}

async fn open(client: &LocalSigner, envelope: &Envelope) -> Response {
    verify_event(envelope).unwrap();
    let suite = CipherSuite::detect(&envelope.content);
    let plaintext = client
        .decrypt(suite, &envelope.pubkey, &envelope.content)
        .await
        .unwrap();
    Response::from_json(&plaintext).unwrap()
}

#[tokio::test]
async fn connect_and_sign_with_real_keys() {
    let bunker_keys = Keys::generate();
    let bunker_id = bunker_keys.identity();
    let bunker = LocalSigner::new(bunker_keys).with_relays(vec!["wss://relay.example".into()]);
    let client = LocalSigner::new(Keys::generate());
    let client_id = client.public_key().await.unwrap();

    let relay = MockRelay::new();
    let connect = Request::new("1", "connect", vec![bunker_id.to_string(), "s3cr3t".into()]);
    relay.deliver(seal(&client, &bunker_id, &connect).await);
    let template = r#"{"kind":1,"content":"signed remotely","tags":[["t","bunker"]]}"#;
    let sign = Request::new("2", "sign_event", vec![template.into()]);
    relay.deliver(seal(&client, &bunker_id, &sign).await);
    let relays = Request::new("3", "get_relays", vec![]);
    relay.deliver(seal(&client, &bunker_id, &relays).await);
    relay.finish();

    let mut responder = Responder::new(
        bunker,
        relay.clone(),
        ResponderOptions::new("s3cr3t".to_string()),
    );
    responder.run().await.unwrap();
    assert_eq!(responder.authorized(), Some(client_id.clone()));

    let published = relay.published();
    assert_eq!(published.len(), 3);
    for envelope in &published {
        assert_eq!(envelope.pubkey, bunker_id);
        assert_eq!(envelope.recipient(), Some(client_id.clone()));
    }

    assert_eq!(open(&client, &published[0]).await, Response::ok("1", "ack"));

    let signed = open(&client, &published[1]).await;
    let event: Envelope = serde_json::from_str(&signed.result).unwrap();
    verify_event(&event).unwrap();
    assert_eq!(event.pubkey, bunker_id);
    assert_eq!(event.content, "signed remotely");
    assert_eq!(event.tags, vec![vec!["t".to_string(), "bunker".to_string()]]);

    assert_eq!(
        open(&client, &published[2]).await,
        Response::ok("3", r#"["wss://relay.example"]"#)
    );
}

#[tokio::test]
async fn legacy_client_is_understood_and_remote_encryption_works() {
    let bunker_keys = Keys::generate();
    let bunker_id = bunker_keys.identity();
    let client = LocalSigner::new(Keys::generate());
    let client_id = client.public_key().await.unwrap();
    let peer = LocalSigner::new(Keys::generate());
    let peer_id = peer.public_key().await.unwrap();

    let relay = MockRelay::new();
    let connect = Request::new("1", "connect", vec![bunker_id.to_string(), "s3cr3t".into()]);
    let content = client
        .encrypt(CipherSuite::Nip04, &bunker_id, &connect.to_json().unwrap())
        .await
        .unwrap();
    relay.deliver(
        client
            .sign_event(EventTemplate::nostr_connect(&bunker_id, content))
            .await
            .unwrap(),
    );
    let encrypt = Request::new(
        "2",
        "nip44_encrypt",
        vec![peer_id.to_string(), "for the peer".into()],
    );
    relay.deliver(seal(&client, &bunker_id, &encrypt).await);
    relay.finish();

    let options = ResponderOptions::new("s3cr3t".to_string()).with_suite(CipherSuite::Nip04);
    let mut responder = Responder::new(LocalSigner::new(bunker_keys), relay.clone(), options);
    responder.run().await.unwrap();

    let published = relay.published();
    assert_eq!(published.len(), 2);
    assert_eq!(CipherSuite::detect(&published[0].content), CipherSuite::Nip04);
    assert_eq!(open(&client, &published[0]).await, Response::ok("1", "ack"));

    let ciphertext = open(&client, &published[1]).await.result;
    assert_eq!(
        peer.decrypt(CipherSuite::Nip44, &bunker_id, &ciphertext).await.unwrap(),
        "for the peer"
    );
    assert_ne!(client_id, peer_id);
}
