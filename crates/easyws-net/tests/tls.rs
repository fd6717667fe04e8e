//! `wss://` sessions with generated certificates: trust roots, hostname
//! checks, and listener setup.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use easyws_net::{
    ChannelSink, Client, ClientConfig, Event, EventKind, NetError, Server, ServerConfig,
    TlsIdentity, generate_self_signed,
};

use common::{
    RunningClient, RunningServer, assert_quiet, finish, next_event, next_message, start_client,
    start_server,
};

#[tokio::test]
async fn round_trip_over_tls_with_verification_skipped() {
    let identity = generate_self_signed("localhost").unwrap();
    let mut srv = start_server(
        "wss://127.0.0.1:0/",
        ServerConfig::default().with_tls(identity),
    )
    .await;
    let config = ClientConfig {
        skip_verify: true,
        ..ClientConfig::default()
    };
    let mut cli = start_client(format!("wss://{}/", srv.addr), config, Vec::new());

    let server_side = match next_event(&mut srv.queues.events).await {
        Event::Connect(id) => id,
        other => panic!("expected connect, got {other:?}"),
    };
    assert_eq!(
        next_event(&mut cli.queues.events).await.kind(),
        EventKind::Connect
    );

    cli.client.send_text("over tls").await.unwrap();
    let msg = next_message(&mut srv.queues.messages).await;
    assert_eq!(msg.as_text(), Some("over tls"));
    assert_eq!(msg.client_id(), Some(server_side));

    cli.client.disconnect().await.unwrap();
    assert_eq!(finish(cli.task).await, Ok(()));
    srv.server.close().await;
}

fn trusting(identity: &TlsIdentity) -> ClientConfig {
    ClientConfig {
        root_cas: vec![identity.cert_pem().to_vec()],
        ..ClientConfig::default()
    }
}

async fn tls_server(identity: &TlsIdentity) -> RunningServer {
    start_server(
        "wss://127.0.0.1:0/",
        ServerConfig::default().with_tls(identity.clone()),
    )
    .await
}

/// Connects, checks both sides saw it, then disconnects cleanly.
async fn assert_session(srv: &mut RunningServer, mut cli: RunningClient) {
    assert_eq!(
        next_event(&mut cli.queues.events).await.kind(),
        EventKind::Connect
    );
    assert_eq!(
        next_event(&mut srv.queues.events).await.kind(),
        EventKind::Connect
    );
    cli.client.disconnect().await.unwrap();
    assert_eq!(finish(cli.task).await, Ok(()));
}

#[tokio::test]
async fn configured_root_is_trusted() {
    let identity = generate_self_signed("localhost").unwrap();
    let mut srv = tls_server(&identity).await;

    let cli = start_client(
        format!("wss://localhost:{}/", srv.addr.port()),
        trusting(&identity),
        Vec::new(),
    );
    assert_session(&mut srv, cli).await;
    srv.server.close().await;
}

#[tokio::test]
async fn root_added_at_runtime_is_trusted() {
    let identity = generate_self_signed("localhost").unwrap();
    let mut srv = tls_server(&identity).await;

    let (sink, queues) = ChannelSink::bounded(16, 16);
    let client = Client::new(ClientConfig::default(), Arc::new(sink));
    assert_eq!(client.add_root_ca(identity.cert_pem()), 1);
    let url = format!("wss://localhost:{}/", srv.addr.port());
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.connect_and_serve(&url, &[]).await }
    });

    let cli = RunningClient {
        client,
        queues,
        task,
    };
    assert_session(&mut srv, cli).await;
    srv.server.close().await;
}

#[tokio::test]
async fn certificate_from_another_root_fails_the_dial() {
    let identity = generate_self_signed("localhost").unwrap();
    let stranger = generate_self_signed("localhost").unwrap();
    let mut srv = tls_server(&identity).await;

    let mut cli = start_client(
        format!("wss://localhost:{}/", srv.addr.port()),
        trusting(&stranger),
        Vec::new(),
    );

    assert_matches!(finish(cli.task).await, Err(NetError::Tls(_)));
    assert_eq!(
        next_event(&mut cli.queues.events).await.kind(),
        EventKind::FailureWithExit
    );
    assert_quiet(&mut srv.queues.events).await;
    srv.server.close().await;
}

#[tokio::test]
async fn hostname_mismatch_needs_skip_hostname_check() {
    let identity = generate_self_signed("localhost").unwrap();
    let mut srv = tls_server(&identity).await;
    let by_ip = format!("wss://{}/", srv.addr);

    let strict = start_client(by_ip.clone(), trusting(&identity), Vec::new());
    assert_matches!(finish(strict.task).await, Err(NetError::Tls(_)));

    let relaxed = ClientConfig {
        skip_hostname_check: true,
        ..trusting(&identity)
    };
    let cli = start_client(by_ip, relaxed, Vec::new());
    assert_session(&mut srv, cli).await;
    srv.server.close().await;
}

#[tokio::test]
async fn skip_hostname_check_still_verifies_the_chain() {
    let identity = generate_self_signed("localhost").unwrap();
    let stranger = generate_self_signed("localhost").unwrap();
    let srv = tls_server(&identity).await;

    let config = ClientConfig {
        skip_hostname_check: true,
        ..trusting(&stranger)
    };
    let cli = start_client(format!("wss://{}/", srv.addr), config, Vec::new());
    assert_matches!(finish(cli.task).await, Err(NetError::Tls(_)));
    srv.server.close().await;
}

#[tokio::test]
async fn listen_and_serve_binds_the_endpoint() {
    let identity = generate_self_signed("localhost").unwrap();
    let (sink, mut queues) = ChannelSink::bounded(8, 8);
    let server = Server::new(
        "wss://127.0.0.1:0/",
        ServerConfig::default().with_tls(identity),
        Arc::new(sink),
    )
    .unwrap();
    let task = tokio::spawn({
        let server = server.clone();
        async move { server.listen_and_serve().await }
    });

    let addr = loop {
        if let Some(addr) = server.local_addr() {
            break addr;
        }
        tokio::task::yield_now().await;
    };
    assert_ne!(addr.port(), 0);

    server.close().await;
    assert_eq!(finish(task).await, Ok(()));
    assert_eq!(
        next_event(&mut queues.events).await,
        Event::Failure {
            exited: true,
            error: NetError::ListenerClosed
        }
    );
}
