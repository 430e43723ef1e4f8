use ipgre::channels::errors::{ErrorEvent, ErrorScope, LadderError, pretty_print_with_mode};
use ipgre::channels::{Channel, ErrorsChannel, ExtrasChannel};
use ipgre::telemetry::FormatterMode;
use ipgre::types::ChannelType;
use serde_json::json;

#[test]
fn ladder_error_chain_and_serde_roundtrip() {
    let base = LadderError::msg("root cause").with_details(json!({"k": "v"}));
    let wrapped = LadderError::msg("top").with_cause(base.clone());

    assert_eq!(wrapped.cause.as_deref(), Some(&base));

    let ser = serde_json::to_string(&wrapped).expect("serialize");
    let de: LadderError = serde_json::from_str(&ser).expect("deserialize");
    assert_eq!(de, wrapped);
}

#[test]
fn error_event_constructors_set_expected_scope() {
    let event = ErrorEvent::llm("sess-1", 3, LadderError::msg("rate limited")).with_tag("retryable");
    assert_eq!(event.scope, ErrorScope::Llm { session: "sess-1".to_string(), step: 3 });
    assert_eq!(event.tags, vec!["retryable".to_string()]);

    let ser = serde_json::to_string(&event).unwrap();
    let back: ErrorEvent = serde_json::from_str(&ser).unwrap();
    assert_eq!(event, back);
}

#[test]
fn pretty_print_plain_mode_has_no_ansi_but_colored_does() {
    let events = vec![ErrorEvent::engine(LadderError::msg("boom"))];
    let plain = pretty_print_with_mode(&events, FormatterMode::Plain);
    assert!(!plain.contains('\x1b'));

    let colored = pretty_print_with_mode(&events, FormatterMode::Colored);
    assert!(colored.contains('\x1b'));
}

#[test]
fn errors_channel_only_bumps_version_on_real_mutation() {
    let mut channel = ErrorsChannel::default();
    assert_eq!(channel.get_channel_type(), ChannelType::Errors);
    assert!(channel.persistent());
    assert!(channel.is_empty());

    channel.get_mut().push(ErrorEvent::engine(LadderError::msg("x")));
    channel.set_version(channel.version() + 1);
    assert_eq!(channel.len(), 1);
    assert_eq!(channel.version(), 1);
    assert_eq!(channel.snapshot().len(), 1);
}

#[test]
fn extras_channel_is_not_persistent() {
    let mut channel = ExtrasChannel::default();
    assert_eq!(channel.get_channel_type(), ChannelType::Extra);
    assert!(!channel.persistent());

    channel.get_mut().push(json!({"note": "intent ledger"}));
    assert_eq!(channel.len(), 1);
}
