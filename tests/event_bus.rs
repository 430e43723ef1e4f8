use std::time::Duration;

use ipgre::event_bus::{ChannelSink, Event, EventBus, MemorySink};

#[tokio::test]
async fn memory_sink_captures_published_events() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sinks(vec![Box::new(sink.clone())]);
    bus.listen_for_events();

    let emitter = bus.get_emitter();
    emitter.emit(Event::node_message("chunk", "drafting chunk 1")).unwrap();
    emitter.emit(Event::diagnostic("scorer", "score 92")).unwrap();

    // give the sink's spawned worker a beat to drain the broadcast channel
    tokio::time::sleep(Duration::from_millis(50)).await;

    let captured = sink.snapshot();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].message(), "drafting chunk 1");
    assert_eq!(captured[1].scope_label(), Some("scorer"));

    sink.clear();
    assert!(sink.snapshot().is_empty());
}

#[tokio::test]
async fn channel_sink_forwards_events_to_flume_receiver() {
    let (tx, rx) = flume::unbounded();
    let bus = EventBus::with_sinks(vec![Box::new(ChannelSink::new(tx))]);
    bus.listen_for_events();

    bus.get_emitter().emit(Event::node_message("orchestrator", "agent a done")).unwrap();

    let received = tokio::time::timeout(Duration::from_millis(500), rx.recv_async())
        .await
        .expect("did not receive event in time")
        .expect("channel closed");
    assert_eq!(received.message(), "agent a done");
}

#[tokio::test]
async fn subscribe_receives_events_published_after_subscribing() {
    let bus = EventBus::default();
    let mut stream = bus.subscribe();

    bus.get_emitter().emit(Event::diagnostic("engine", "session started")).unwrap();

    let event = tokio::time::timeout(Duration::from_millis(500), stream.recv())
        .await
        .expect("timed out waiting for event")
        .expect("stream closed");
    assert_eq!(event.message(), "session started");
}

#[test]
fn event_json_round_trip_preserves_scope_and_message() {
    let event = Event::node_message_with_meta("router", 5, "routing", "processing request");
    let json = event.to_json_value();
    assert_eq!(json["type"], "node");
    assert_eq!(json["scope"], "routing");
    assert_eq!(json["message"], "processing request");
    assert_eq!(json["metadata"]["node_id"], "router");
    assert_eq!(json["metadata"]["step"], 5);

    let compact = event.to_json_string().unwrap();
    assert!(compact.contains("\"type\":\"node\""));
}
