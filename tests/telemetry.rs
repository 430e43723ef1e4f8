use ipgre::channels::errors::{ErrorEvent, LadderError};
use ipgre::event_bus::Event;
use ipgre::telemetry::{FormatterMode, PlainFormatter, TelemetryFormatter};

#[test]
fn plain_mode_render_event_has_no_ansi() {
    let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
    let render = formatter.render_event(&Event::node_message("chunk", "drafting"));
    let joined = render.join_lines();

    assert!(!joined.contains('\x1b'));
    assert!(joined.contains("drafting"));
    assert_eq!(render.context.as_deref(), Some("chunk"));
}

#[test]
fn colored_mode_render_event_includes_ansi_codes() {
    let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
    let render = formatter.render_event(&Event::node_message("chunk", "drafting"));
    assert!(render.join_lines().contains('\x1b'));
}

#[test]
fn render_errors_includes_cause_chain_and_tags() {
    let cause = LadderError::msg("rate limited");
    let error = LadderError::msg("llm call failed").with_cause(cause);
    let event = ErrorEvent::llm("sess-1", 2, error).with_tag("retryable");

    let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
    let renders = formatter.render_errors(&[event]);

    assert_eq!(renders.len(), 1);
    let joined = renders[0].join_lines();
    assert!(joined.contains("llm call failed"));
    assert!(joined.contains("cause: rate limited"));
    assert!(joined.contains("retryable"));
}

#[test]
fn render_errors_skips_tags_and_context_lines_when_absent() {
    let event = ErrorEvent::engine(LadderError::msg("boom"));
    let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
    let joined = formatter.render_errors(&[event])[0].join_lines();

    assert!(!joined.contains("tags:"));
    assert!(!joined.contains("context:"));
}
