//! Socket client against a live server
//!
//! These tests run a real [`TcpSocketClient`] against either a [`TcpServer`]
//! or a hand-driven listener to check correlation, pushed requests and
//! failure states.

use std::sync::Arc;
use std::time::Duration;

use apirpc_metrics::PerfCounter;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::api::{ActionRegistry, ApiHandler};
use crate::protocol::{ApiRpcError, Encoder, JsonEncoder, Message};
use crate::transport::{FrameCodec, SocketClient, TcpServer, TcpSocketClient};

fn math_handler() -> Arc<ApiHandler> {
    let registry = Arc::new(ActionRegistry::new());
    registry.register("Math/Add", |_, args: Value| async move {
        Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
    });
    Arc::new(ApiHandler::new("server", registry, Arc::new(JsonEncoder::new())))
}

async fn spawn_server() -> String {
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handler = math_handler();
    tokio::spawn(async move { server.serve(handler).await });
    addr
}

fn client(addr: &str, timeout: Duration) -> TcpSocketClient {
    let mut client = TcpSocketClient::new(format!("tcp://{}", addr));
    client.set_timeout(timeout);
    client.add_codec(FrameCodec::new(timeout));
    client
}

#[tokio::test]
async fn test_request_reply_over_tcp() {
    let addr = spawn_server().await;
    let encoder = JsonEncoder::new();

    let send = Arc::new(PerfCounter::new());
    let receive = Arc::new(PerfCounter::new());
    let mut client = client(&addr, Duration::from_secs(5));
    client.set_stat_send(send.clone());
    client.set_stat_receive(receive.clone());
    client.open().await.unwrap();

    for i in 0..3 {
        let request = Message::new(encoder.encode_request("Math/Add", Some(&json!([i, 10]))).unwrap());
        let reply = client.send_message_async(&request).await.unwrap();
        assert_eq!(reply.sequence, request.sequence);
        assert_eq!(encoder.decode_result(&reply.payload).unwrap(), json!(i + 10));
    }

    assert!(client.is_active());
    assert_eq!(send.count(), 3);
    assert_eq!(receive.count(), 3);
}

#[tokio::test]
async fn test_receive_counter_records_reply_wait() {
    let registry = Arc::new(ActionRegistry::new());
    registry.register("Slow/Echo", |_, args: Value| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(args)
    });
    let handler = Arc::new(ApiHandler::new("server", registry, Arc::new(JsonEncoder::new())));
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(async move { server.serve(handler).await });

    let encoder = JsonEncoder::new();
    let receive = Arc::new(PerfCounter::new());
    let mut client = client(&addr, Duration::from_secs(5));
    client.set_stat_receive(receive.clone());
    client.open().await.unwrap();

    let request = Message::new(encoder.encode_request("Slow/Echo", Some(&json!(1))).unwrap());
    client.send_message_async(&request).await.unwrap();

    assert_eq!(receive.count(), 1);
    // The server held the reply for 20ms
    assert!(receive.total_us() >= 20_000);
    assert!(receive.snapshot().max_us >= 20_000);
}

#[tokio::test]
async fn test_one_way_then_request_on_same_connection() {
    let addr = spawn_server().await;
    let encoder = JsonEncoder::new();
    let mut client = client(&addr, Duration::from_secs(5));
    client.open().await.unwrap();

    let notify = Message::new(encoder.encode_request("Math/Add", Some(&json!([1, 1]))).unwrap()).into_one_way();
    client.send_message(&notify).await.unwrap();

    // The one-way request produced no reply, so the next reply is ours
    let request = Message::new(encoder.encode_request("Math/Add", Some(&json!([2, 2]))).unwrap());
    let reply = client.send_message_async(&request).await.unwrap();
    assert_eq!(reply.sequence, request.sequence);
}

#[tokio::test]
async fn test_pushed_request_and_stale_reply_handled() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let encoder = JsonEncoder::new();

    let server = tokio::spawn(async move {
        let codec = FrameCodec::default();
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = codec.read_frame(&mut stream).await.unwrap().unwrap();

        // Ask the client something before answering
        let pushed = Message::new(JsonEncoder::new().encode_request("Client/Ping", None).unwrap());
        codec.write_frame(&mut stream, &pushed).await.unwrap();
        let answer = codec.read_frame(&mut stream).await.unwrap().unwrap();

        let stale = Message::new(vec![]).create_reply(b"{}".to_vec());
        codec.write_frame(&mut stream, &stale).await.unwrap();

        let payload = br#"{"code":0,"data":"done"}"#.to_vec();
        codec.write_frame(&mut stream, &request.create_reply(payload)).await.unwrap();
        (pushed.sequence, answer)
    });

    let registry = Arc::new(ActionRegistry::new());
    registry.register("Client/Ping", |_, _| async { Ok(json!("pong")) });
    let handler = Arc::new(ApiHandler::new("client", registry, Arc::new(JsonEncoder::new())));

    let mut client = client(&addr, Duration::from_secs(5));
    client.set_handler(handler);
    client.open().await.unwrap();

    let request = Message::new(encoder.encode_request("Server/Work", None).unwrap());
    let reply = client.send_message_async(&request).await.unwrap();
    assert_eq!(encoder.decode_result(&reply.payload).unwrap(), json!("done"));

    let (pushed_sequence, answer) = server.await.unwrap();
    assert!(answer.reply);
    assert_eq!(answer.sequence, pushed_sequence);
    assert_eq!(encoder.decode_result(&answer.payload).unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_silent_server_times_out_and_breaks_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let mut client = client(&addr, Duration::from_millis(100));
    client.open().await.unwrap();

    let err = client.send_message_async(&Message::new(b"{}".to_vec())).await.unwrap_err();
    assert!(matches!(err, ApiRpcError::Timeout(100)));
    assert!(!client.is_active());
}

#[tokio::test]
async fn test_peer_close_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let codec = FrameCodec::default();
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = codec.read_frame(&mut stream).await;
        drop(stream);
    });

    let mut client = client(&addr, Duration::from_secs(5));
    client.open().await.unwrap();

    let err = client.send_message_async(&Message::new(b"{}".to_vec())).await.unwrap_err();
    assert!(err.is_transport());
    assert!(!client.is_active());

    client.close("test").await;
    assert!(!client.is_active());
}
