use bytes::Bytes;
use futures_util::SinkExt;
use rustie_mqtt_codec::{
    AckPacket, ConnAck, Connect, HandlerConfig, LastWill, MqttError, Packet, PacketHandler,
    PacketIdGenerator, PubAck, PubComp, PubRec, PubRel, Publish, QoS, SubAck, Subscribe,
    UnsubAck, Unsubscribe,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

type DuplexHandler = PacketHandler<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn handler_pair() -> (DuplexHandler, DuplexHandler) {
    let (client, server) = tokio::io::duplex(4096);
    (PacketHandler::new(client), PacketHandler::new(server))
}

/// Server handler plus the raw peer end, for feeding hand-written bytes.
fn raw_pair(config: HandlerConfig) -> (DuplexHandler, DuplexStream) {
    let (raw, server) = tokio::io::duplex(4096);
    (PacketHandler::with_config(server, config), raw)
}

async fn assert_peer_sees_eof(raw: &mut DuplexStream) {
    let mut buf = [0u8; 1];
    let n = timeout(Duration::from_secs(1), raw.read(&mut buf))
        .await
        .expect("peer read timed out")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_every_packet_type_crosses_the_wire() {
    let (client, mut server) = handler_pair();

    let mut packets = vec![
        Packet::Connect(
            Connect::new("device-7")
                .with_keep_alive(15)
                .with_clean_session(false)
                .with_will(LastWill::new("devices/7", &b"gone"[..], QoS::AtLeastOnce, false))
                .with_credentials("admin", &b"password"[..]),
        ),
        Packet::ConnAck(ConnAck::new(true, ConnAck::ACCEPTED)),
        Packet::Publish(Publish::new("sensors/temp", QoS::AtMostOnce, &b"21.5"[..]).with_retain(true)),
        Packet::Publish(Publish::new("sensors/hum", QoS::AtLeastOnce, &b"40"[..])),
        Packet::Publish(Publish::new("sensors/co2", QoS::ExactlyOnce, Bytes::new()).with_dup(true)),
        Packet::PubAck(PubAck::new(10)),
        Packet::PubRec(PubRec::new(11)),
        Packet::PubRel(PubRel::new(11)),
        Packet::PubComp(PubComp::new(11)),
        Packet::Subscribe(Subscribe::new(vec![
            ("sensors/#".to_string(), QoS::ExactlyOnce),
            ("alerts/+".to_string(), QoS::AtLeastOnce),
        ])),
        Packet::SubAck(SubAck::new(3, vec![2, 1, SubAck::FAILURE])),
        Packet::Unsubscribe(Unsubscribe::new(vec!["alerts/+".to_string()])),
        Packet::UnsubAck(UnsubAck::new(4)),
        Packet::PingReq,
        Packet::PingResp,
        Packet::Disconnect,
    ];

    for packet in packets.iter_mut() {
        client.send(packet).await.unwrap();
        let received = server.receive().await.unwrap();
        assert_eq!(received, *packet);
    }

    // Ids were allocated lazily, in send order.
    assert_eq!(packets[3].packet_id(), Some(1));
    assert_eq!(packets[4].packet_id(), Some(2));
    assert_eq!(packets[9].packet_id(), Some(3));
    assert_eq!(packets[11].packet_id(), Some(4));
}

#[tokio::test]
async fn test_connack_decoding_from_raw_bytes() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new());

    raw.write_all(&[0x20, 0x02, 0x01, 0x00, 0x20, 0x02, 0x00, 0x05])
        .await
        .unwrap();

    match server.receive().await.unwrap() {
        Packet::ConnAck(connack) => {
            assert!(connack.session_present);
            assert!(connack.accepted());
        }
        other => panic!("expected CONNACK, got {:?}", other),
    }
    match server.receive().await.unwrap() {
        Packet::ConnAck(connack) => {
            assert!(!connack.accepted());
            assert_eq!(connack.error_message(), Some("not authorized"));
        }
        other => panic!("expected CONNACK, got {:?}", other),
    }
}

#[tokio::test]
async fn test_suback_decoding_from_raw_bytes() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new());

    raw.write_all(&[0x90, 0x05, 0x00, 42, 0, 1, 2]).await.unwrap();

    match server.receive().await.unwrap() {
        Packet::SubAck(suback) => {
            assert_eq!(suback.packet_id, 42);
            assert_eq!(suback.granted_qos, vec![0, 1, 2]);
        }
        other => panic!("expected SUBACK, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_with_multibyte_remaining_length() {
    let (client, mut server) = handler_pair();

    // Large enough to need a 3-byte remaining length and to fill the duplex buffer.
    let payload = Bytes::from(vec![0xAB; 20_000]);
    let mut packet = Packet::Publish(Publish::new("bulk", QoS::AtLeastOnce, payload.clone()));

    let sender = tokio::spawn(async move {
        client.send(&mut packet).await.unwrap();
        packet
    });
    let received = server.receive().await.unwrap();
    let sent = sender.await.unwrap();

    assert_eq!(received, sent);
    match received {
        Packet::Publish(publish) => assert_eq!(publish.payload, payload),
        other => panic!("expected PUBLISH, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_packet_type_closes_stream() {
    for first_byte in [0x00u8, 0xF0] {
        let (mut server, mut raw) = raw_pair(HandlerConfig::new());
        raw.write_all(&[first_byte, 0x00]).await.unwrap();

        let code = first_byte >> 4;
        match server.receive().await {
            Err(MqttError::UnknownPacketType(c)) => assert_eq!(c, code),
            other => panic!("expected UnknownPacketType, got {:?}", other),
        }
        assert!(server.is_closed());
        assert!(matches!(server.receive().await, Err(MqttError::Closed)));
        assert_peer_sees_eof(&mut raw).await;
    }
}

#[tokio::test]
async fn test_overlong_remaining_length_closes_stream() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new());
    raw.write_all(&[0xC0, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]).await.unwrap();

    assert!(matches!(server.receive().await, Err(MqttError::Framing)));
    assert!(server.is_closed());
    assert!(matches!(
        server.send(&mut Packet::PingResp).await,
        Err(MqttError::Closed)
    ));
}

#[tokio::test]
async fn test_short_body_closes_stream() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new());

    // Declares 10 body bytes but delivers 3 before the peer stops writing.
    raw.write_all(&[0x30, 0x0A, 0x00, 0x01, b't']).await.unwrap();
    raw.shutdown().await.unwrap();

    match server.receive().await {
        Err(MqttError::ShortRead { expected, received }) => {
            assert_eq!(expected, 10);
            assert_eq!(received, 3);
        }
        other => panic!("expected ShortRead, got {:?}", other),
    }
    assert!(server.is_closed());
}

#[tokio::test]
async fn test_malformed_body_closes_stream() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new());

    // Topic length prefix claims 200 bytes in a 4-byte body.
    raw.write_all(&[0x30, 0x04, 0x00, 0xC8, b'a', b'b']).await.unwrap();

    assert!(matches!(
        server.receive().await,
        Err(MqttError::MalformedField(_))
    ));
    assert!(server.is_closed());
    assert_peer_sees_eof(&mut raw).await;
}

#[tokio::test]
async fn test_inbound_packet_over_configured_limit() {
    let (mut server, mut raw) = raw_pair(HandlerConfig::new().with_max_packet_size(16));
    raw.write_all(&[0x30, 0x80, 0x01]).await.unwrap();

    assert!(matches!(
        server.receive().await,
        Err(MqttError::PacketTooLarge { size: 128, max: 16 })
    ));
    assert!(server.is_closed());
}

#[tokio::test]
async fn test_concurrent_sends_never_interleave() {
    let (client, server) = tokio::io::duplex(64);
    let client = PacketHandler::new(client);
    let mut server = PacketHandler::new(server);

    const WRITERS: u8 = 8;
    const PER_WRITER: usize = 20;

    let reader = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..(WRITERS as usize * PER_WRITER) {
            received.push(server.receive().await.unwrap());
        }
        received
    });

    let mut writers = Vec::new();
    for marker in 0..WRITERS {
        let writer = client.writer();
        writers.push(tokio::spawn(async move {
            for _ in 0..PER_WRITER {
                let mut packet = Packet::Publish(Publish::new(
                    format!("writer/{}", marker),
                    QoS::AtLeastOnce,
                    vec![marker; 1000],
                ));
                writer.send(&mut packet).await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let received = timeout(Duration::from_secs(10), reader)
        .await
        .expect("reader timed out")
        .unwrap();

    let mut ids: Vec<u16> = Vec::new();
    for packet in received {
        match packet {
            Packet::Publish(publish) => {
                let marker = publish.payload[0];
                assert_eq!(publish.topic, format!("writer/{}", marker));
                assert_eq!(publish.payload.len(), 1000);
                assert!(publish.payload.iter().all(|b| *b == marker));
                ids.push(publish.packet_id.unwrap());
            }
            other => panic!("expected PUBLISH, got {:?}", other),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), WRITERS as usize * PER_WRITER);
}

#[tokio::test]
async fn test_split_reader_and_writer() {
    let (client, server) = handler_pair();
    let (mut reader, writer) = server.into_split();

    // Echo server: acknowledge every QoS 1 publish from a separate task.
    let echo = tokio::spawn(async move {
        loop {
            match reader.receive().await.unwrap() {
                Packet::Publish(publish) => {
                    let packet_id = publish.packet_id.unwrap();
                    let writer = reader.writer();
                    tokio::spawn(async move {
                        writer
                            .send(&mut Packet::PubAck(PubAck::new(packet_id)))
                            .await
                            .unwrap();
                    });
                }
                Packet::Disconnect => break,
                other => panic!("unexpected {:?}", other),
            }
        }
    });

    let (mut client_reader, client_writer) = client.into_split();
    let mut sent_ids = Vec::new();
    for i in 0..5 {
        let mut packet = Packet::Publish(Publish::new("jobs", QoS::AtLeastOnce, format!("job {}", i)));
        client_writer.send(&mut packet).await.unwrap();
        sent_ids.push(packet.packet_id().unwrap());
    }

    let mut acked = Vec::new();
    for _ in 0..5 {
        match client_reader.receive().await.unwrap() {
            Packet::PubAck(ack) => acked.push(ack.packet_id()),
            other => panic!("expected PUBACK, got {:?}", other),
        }
    }
    acked.sort_unstable();
    assert_eq!(acked, sent_ids);

    client_writer.send(&mut Packet::Disconnect).await.unwrap();
    echo.await.unwrap();
    drop(writer);
}

#[tokio::test]
async fn test_shared_packet_id_generator() {
    let ids = Arc::new(PacketIdGenerator::new());
    let (a, _a_peer) = tokio::io::duplex(1024);
    let (b, _b_peer) = tokio::io::duplex(1024);
    let first = PacketHandler::with_config(a, HandlerConfig::new().with_packet_ids(ids.clone()));
    let second = PacketHandler::with_config(b, HandlerConfig::new().with_packet_ids(ids.clone()));

    let mut p1 = Packet::Unsubscribe(Unsubscribe::new(vec!["x".to_string()]));
    let mut p2 = Packet::Unsubscribe(Unsubscribe::new(vec!["y".to_string()]));
    first.send(&mut p1).await.unwrap();
    second.send(&mut p2).await.unwrap();

    assert_eq!(p1.packet_id(), Some(1));
    assert_eq!(p2.packet_id(), Some(2));
    assert!(Arc::ptr_eq(first.packet_ids(), second.packet_ids()));
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut handler = PacketHandler::new(stream);
        let connect = match handler.receive().await.unwrap() {
            Packet::Connect(connect) => connect,
            other => panic!("expected CONNECT, got {:?}", other),
        };
        let return_code = if connect.username.as_deref() == Some("admin") {
            ConnAck::ACCEPTED
        } else {
            ConnAck::BAD_USERNAME_OR_PASSWORD
        };
        handler
            .send(&mut Packet::ConnAck(ConnAck::new(false, return_code)))
            .await
            .unwrap();
        assert_eq!(handler.receive().await.unwrap(), Packet::Disconnect);
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut client = PacketHandler::new(stream);
    client
        .send(&mut Packet::Connect(
            Connect::new("tcp-client").with_credentials("admin", &b"password"[..]),
        ))
        .await
        .unwrap();
    match client.receive().await.unwrap() {
        Packet::ConnAck(connack) => assert!(connack.accepted()),
        other => panic!("expected CONNACK, got {:?}", other),
    }
    client.send(&mut Packet::Disconnect).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut handler = PacketHandler::websocket(ws_stream, HandlerConfig::new());

        let subscribe = match handler.receive().await.unwrap() {
            Packet::Subscribe(subscribe) => subscribe,
            other => panic!("expected SUBSCRIBE, got {:?}", other),
        };
        let granted = subscribe.topics.iter().map(|(_, qos)| *qos as u8).collect();
        handler
            .send(&mut Packet::SubAck(SubAck::new(
                subscribe.packet_id.unwrap(),
                granted,
            )))
            .await
            .unwrap();
        assert_eq!(handler.receive().await.unwrap(), Packet::PingReq);
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (ws_stream, _) = tokio_tungstenite::client_async(format!("ws://{}/mqtt", addr), stream)
        .await
        .unwrap();
    let mut client = PacketHandler::websocket(ws_stream, HandlerConfig::new());

    let mut subscribe = Packet::Subscribe(Subscribe::new(vec![
        ("a/b".to_string(), QoS::AtLeastOnce),
        ("c/#".to_string(), QoS::AtMostOnce),
    ]));
    client.send(&mut subscribe).await.unwrap();
    match client.receive().await.unwrap() {
        Packet::SubAck(suback) => {
            assert_eq!(Some(suback.packet_id), subscribe.packet_id());
            assert_eq!(suback.granted_qos, vec![1, 0]);
        }
        other => panic!("expected SUBACK, got {:?}", other),
    }
    client.send(&mut Packet::PingReq).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_frame_split_across_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut handler = PacketHandler::websocket(ws_stream, HandlerConfig::new());
        handler.receive().await.unwrap()
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut ws_stream, _) = tokio_tungstenite::client_async(format!("ws://{}/mqtt", addr), stream)
        .await
        .unwrap();

    // PUBACK for id 5, delivered one byte per message with control frames between.
    for byte in [0x40u8, 0x02, 0x00, 0x05] {
        ws_stream.send(Message::Binary(vec![byte])).await.unwrap();
        ws_stream.send(Message::Ping(vec![])).await.unwrap();
    }

    assert_eq!(server.await.unwrap(), Packet::PubAck(PubAck::new(5)));
}

#[tokio::test]
async fn test_websocket_text_frame_closes_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws_stream = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut handler = PacketHandler::websocket(ws_stream, HandlerConfig::new());
        let result = handler.receive().await;
        (result, handler.is_closed())
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut ws_stream, _) = tokio_tungstenite::client_async(format!("ws://{}/mqtt", addr), stream)
        .await
        .unwrap();
    ws_stream.send(Message::Text("hello".to_string())).await.unwrap();

    let (result, closed) = server.await.unwrap();
    assert!(matches!(result, Err(MqttError::MalformedField(_))));
    assert!(closed);
}
