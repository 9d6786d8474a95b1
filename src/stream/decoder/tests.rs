use super::*;

#[test]
fn token_line() {
    let event = decode(r#"{"model":"llama2","response":"Hello","done":false}"#)
        .expect("token line should decode");
    assert_eq!(event, UpstreamEvent::Token("Hello".to_string()));
}

#[test]
fn done_line_carries_usage() {
    let event = decode(
        r#"{"response":"","done":true,"total_duration":5000,"eval_count":12,"prompt_eval_count":4,"eval_duration":3000}"#,
    )
    .expect("done line should decode");

    assert_eq!(
        event,
        UpstreamEvent::Done {
            tail: None,
            usage: UsageStats {
                total_duration: 5000,
                eval_count: 12,
                prompt_eval_count: 4,
                eval_duration: 3000,
            },
        }
    );
}

#[test]
fn done_line_with_final_fragment() {
    let event = decode(r#"{"response":"!","done":true}"#).expect("done line should decode");
    assert_eq!(
        event,
        UpstreamEvent::Done {
            tail: Some("!".to_string()),
            usage: UsageStats::default(),
        }
    );
}

#[test]
fn error_line_wins_over_other_fields() {
    let event = decode(r#"{"error":"model 'nope' not found","response":"x"}"#)
        .expect("error line should decode");
    assert_eq!(
        event,
        UpstreamEvent::Error("model 'nope' not found".to_string())
    );
}

#[test]
fn structured_error_payload_is_stringified() {
    let event = decode(r#"{"error":{"code":503}}"#).expect("error line should decode");
    assert_eq!(event, UpstreamEvent::Error(r#"{"code":503}"#.to_string()));
}

#[test]
fn null_error_is_not_a_failure() {
    let event = decode(r#"{"error":null,"response":"ok"}"#).expect("line should decode");
    assert_eq!(event, UpstreamEvent::Token("ok".to_string()));
}

#[test]
fn unrecognized_shapes_are_no_ops() {
    assert_eq!(decode("").expect("blank"), UpstreamEvent::NoOp);
    assert_eq!(decode("   ").expect("whitespace"), UpstreamEvent::NoOp);
    assert_eq!(
        decode(r#"{"status":"loading model"}"#).expect("status line"),
        UpstreamEvent::NoOp
    );
    assert_eq!(
        decode(r#"{"response":"","done":false}"#).expect("empty fragment"),
        UpstreamEvent::NoOp
    );
}

#[test]
fn malformed_lines_are_errors() {
    assert!(decode("{\"response\":\"unterminated").is_err());
    assert!(decode("not json at all").is_err());
    assert!(decode("[1,2,3]").is_err());
}
