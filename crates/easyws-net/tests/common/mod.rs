//! Shared helpers for socket-level tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use easyws_core::Message;
use easyws_net::{
    ChannelSink, Client, ClientConfig, Event, EventQueues, NetError, Server, ServerConfig,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct RunningServer {
    pub server: Server,
    pub queues: EventQueues,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), NetError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }
}

pub async fn start_server(url: &str, config: ServerConfig) -> RunningServer {
    let (sink, queues) = ChannelSink::bounded(256, 256);
    let server = Server::new(url, config, Arc::new(sink)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });
    RunningServer {
        server,
        queues,
        addr,
        task,
    }
}

pub struct RunningClient {
    pub client: Client,
    pub queues: EventQueues,
    pub task: JoinHandle<Result<(), NetError>>,
}

pub fn start_client(
    url: String,
    config: ClientConfig,
    headers: Vec<(String, String)>,
) -> RunningClient {
    let (sink, queues) = ChannelSink::bounded(256, 256);
    let client = Client::new(config, Arc::new(sink));
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.connect_and_serve(&url, &headers).await }
    });
    RunningClient {
        client,
        queues,
        task,
    }
}

pub async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event queue closed")
}

pub async fn next_message(rx: &mut mpsc::Receiver<Message>) -> Message {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("message queue closed")
}

pub async fn finish<T>(task: JoinHandle<T>) -> T {
    tokio::time::timeout(WAIT, task)
        .await
        .expect("timed out waiting for task")
        .expect("task panicked")
}

/// Give in-flight notifications a moment, then assert the queue is empty.
pub async fn assert_quiet(rx: &mut mpsc::Receiver<Event>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event: {event:?}");
    }
}

pub fn header(name: &str, value: &str) -> Vec<(String, String)> {
    vec![(name.to_owned(), value.to_owned())]
}
