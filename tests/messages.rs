use ipgre::message::Message;

#[test]
fn constructors_set_expected_roles() {
    assert_eq!(Message::user("hi").role, Message::USER);
    assert_eq!(Message::assistant("hi").role, Message::ASSISTANT);
    assert_eq!(Message::system("hi").role, Message::SYSTEM);
}

#[test]
fn manual_and_convenience_construction_are_equivalent() {
    let manual = Message {
        role: Message::USER.to_string(),
        content: "Hello, world!".to_string(),
    };
    assert_eq!(manual, Message::user("Hello, world!"));
}

#[test]
fn serde_round_trip_preserves_role_and_content() {
    let msg = Message::system("you are a careful editor");
    let json = serde_json::to_string(&msg).unwrap();
    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(msg, parsed);
}

#[test]
fn default_message_has_empty_role_and_content() {
    let msg = Message::default();
    assert_eq!(msg.role, "");
    assert_eq!(msg.content, "");
}
