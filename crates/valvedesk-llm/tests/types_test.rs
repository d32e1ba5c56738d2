use serde_json::json;
use valvedesk_llm::{Content, Message, Tool, ToolCall, ToolChoice};

#[test]
fn test_content_text_creation() {
    let content = Content::text("Hello, world!");
    assert_eq!(content.as_text(), "Hello, world!");
}

#[test]
fn test_message_roles() {
    assert_eq!(Message::system("instructions").role(), "system");
    assert_eq!(Message::human("Bonjour").role(), "user");
    assert_eq!(Message::ai("Réponse").role(), "assistant");
}

#[test]
fn test_message_serialization_human() {
    let msg = Message::human("Ma vanne fuit");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"role\":\"user\""));
    assert!(json.contains("Ma vanne fuit"));
}

#[test]
fn test_message_deserialization() {
    let json = r#"{"role":"user","content":"Test"}"#;
    let msg: Message = serde_json::from_str(json).unwrap();
    assert_eq!(msg.role(), "user");
}

#[test]
fn test_tool_creation() {
    let tool = Tool::new(
        "create_ticket",
        "Create a support ticket",
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"}
            }
        }),
    );

    assert_eq!(tool.function.name, "create_ticket");
    assert!(tool.function.description.is_some());
}

#[test]
fn test_tool_call_parse_arguments() {
    let call = ToolCall {
        id: "call_1".to_string(),
        tool_type: "function".to_string(),
        function: valvedesk_llm::FunctionCall {
            name: "create_ticket".to_string(),
            arguments: r#"{"summary":"Fuite V-12","priority":"High"}"#.to_string(),
        },
    };

    let args: serde_json::Value = call.parse_arguments().unwrap();
    assert_eq!(args["summary"], "Fuite V-12");
    assert_eq!(args["priority"], "High");
}

#[test]
fn test_tool_choice_serialization() {
    let auto = serde_json::to_string(&ToolChoice::auto()).unwrap();
    assert_eq!(auto, "\"auto\"");
}
