use super::*;

fn store(capacity: usize, max_messages: usize) -> ConversationStore {
    ConversationStore::new(ConversationConfig {
        capacity,
        max_messages,
        ..ConversationConfig::default()
    })
}

#[tokio::test]
async fn append_and_read_history() {
    let store = store(10, 10);
    store.append("c1", ConversationTurn::user("Hi")).await;
    store
        .append("c1", ConversationTurn::assistant("Hello!"))
        .await;

    assert_eq!(
        store.history("c1").await,
        vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello!")
        ]
    );
    assert_eq!(store.len().await, 1);
    assert!(store.history("missing").await.is_empty());
}

#[tokio::test]
async fn oldest_messages_are_trimmed() {
    let store = store(10, 3);
    for i in 0..5 {
        store
            .append("c1", ConversationTurn::user(format!("message {i}")))
            .await;
    }

    let contents: Vec<String> = store
        .history("c1")
        .await
        .into_iter()
        .map(|turn| turn.content)
        .collect();
    assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
}

#[tokio::test]
async fn least_recently_updated_conversation_is_evicted() {
    let store = store(2, 10);
    store.append("a", ConversationTurn::user("first")).await;
    store.append("b", ConversationTurn::user("second")).await;
    store.append("a", ConversationTurn::user("again")).await;

    store.append("c", ConversationTurn::user("third")).await;

    assert_eq!(store.len().await, 2);
    assert!(store.get("b").await.is_none());
    assert!(store.get("a").await.is_some());
    assert!(store.get("c").await.is_some());
}

#[tokio::test]
async fn list_is_most_recent_first() {
    let store = store(10, 10);
    store.append("a", ConversationTurn::user("one")).await;
    store.append("b", ConversationTurn::user("two")).await;
    store.append("a", ConversationTurn::assistant("three")).await;

    let summaries = store.list().await;
    let ids: Vec<&str> = summaries.iter().map(|summary| summary.id.as_str()).collect();

    assert_eq!(ids, vec!["a", "b"]);
    let first = summaries.first().expect("should list conversations");
    assert_eq!(first.message_count, 2);
    assert_eq!(first.preview.as_deref(), Some("three"));
}

#[tokio::test]
async fn delete_removes_conversation() {
    let store = store(10, 10);
    store.append("a", ConversationTurn::user("one")).await;

    assert!(store.delete("a").await);
    assert!(!store.delete("a").await);
    assert!(store.is_empty().await);
}

#[test]
fn conversation_ids_are_unique() {
    assert_ne!(new_conversation_id(), new_conversation_id());
}
