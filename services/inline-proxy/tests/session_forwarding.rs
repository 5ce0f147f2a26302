use std::sync::Arc;

use dbwire_bus::{Bus, BusBuilder};
use dbwire_log_listener::LogListener;
use dbwire_test_utils::{loopback, wire_message};
use inline_proxy::session::Session;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn bus() -> Arc<Bus<bson::Document>> {
    Arc::new(BusBuilder::new().register(Arc::new(LogListener::new())).build())
}

#[tokio::test]
async fn kill_cursors_is_forwarded_unchanged() {
    let (client, proxy_client_side) = loopback().await.unwrap();
    let (proxy_upstream_side, upstream) = loopback().await.unwrap();

    let session = Session::new(proxy_client_side, proxy_upstream_side, bus(), None).unwrap();
    tokio::spawn(session.run());

    let mut client = client;
    let mut upstream = upstream;

    let frame = wire_message(1, 0, 2007, b"arbitrary kill-cursors payload");
    client.write_all(&frame).await.unwrap();

    let mut received = vec![0u8; frame.len()];
    upstream.read_exact(&mut received).await.unwrap();

    assert_eq!(received, frame);
}

#[tokio::test]
async fn query_reply_round_trip_is_forwarded_both_ways() {
    let (client, proxy_client_side) = loopback().await.unwrap();
    let (proxy_upstream_side, upstream) = loopback().await.unwrap();

    let session = Session::new(proxy_client_side, proxy_upstream_side, bus(), None).unwrap();
    tokio::spawn(session.run());

    let mut client = client;
    let mut upstream = upstream;

    let mut query_body = Vec::new();
    query_body.extend_from_slice(&0u32.to_le_bytes()); // flags
    query_body.extend_from_slice(b"d.c\0"); // namespace
    query_body.extend_from_slice(&0u32.to_le_bytes()); // skip
    query_body.extend_from_slice(&0u32.to_le_bytes()); // to_return
    query_body.extend_from_slice(&empty_document()); // selector

    let query_frame = wire_message(42, 0, 2004, &query_body);
    client.write_all(&query_frame).await.unwrap();

    let mut received_query = vec![0u8; query_frame.len()];
    upstream.read_exact(&mut received_query).await.unwrap();
    assert_eq!(received_query, query_frame);

    let mut reply_body = Vec::new();
    reply_body.extend_from_slice(&0u32.to_le_bytes()); // flags
    reply_body.extend_from_slice(&0u64.to_le_bytes()); // cursor_id
    reply_body.extend_from_slice(&0u32.to_le_bytes()); // starting_from
    reply_body.extend_from_slice(&0u32.to_le_bytes()); // number_returned

    let reply_frame = wire_message(1000, 42, 1, &reply_body);
    upstream.write_all(&reply_frame).await.unwrap();

    let mut received_reply = vec![0u8; reply_frame.len()];
    client.read_exact(&mut received_reply).await.unwrap();
    assert_eq!(received_reply, reply_frame);
}

fn empty_document() -> Vec<u8> {
    vec![5, 0, 0, 0, 0]
}
