use std::collections::HashSet;

use presales_core::session::sqlite::SqliteSessionBackend;
use presales_core::session::{MessageItem, SessionBackend, SessionStore};
use tempfile::TempDir;

fn backend() -> (TempDir, SqliteSessionBackend) {
    let dir = TempDir::new().unwrap();
    let backend = SqliteSessionBackend::open(dir.path().join("sessions.db")).unwrap();
    (dir, backend)
}

fn contents(items: &[MessageItem]) -> Vec<String> {
    items.iter().map(|i| i.text().unwrap().to_string()).collect()
}

#[tokio::test]
async fn items_come_back_in_insertion_order() {
    let (_dir, backend) = backend();
    let session = backend.session("order");

    session
        .add_items(&[MessageItem::new("user", "1"), MessageItem::new("assistant", "2")])
        .await
        .unwrap();
    session.add_items(&[MessageItem::new("user", "3")]).await.unwrap();
    session.add_items(&[]).await.unwrap();

    assert_eq!(contents(&session.get_items(None).await.unwrap()), ["1", "2", "3"]);
    assert_eq!(contents(&session.get_items(Some(2)).await.unwrap()), ["2", "3"]);
    assert_eq!(contents(&session.get_items(Some(10)).await.unwrap()), ["1", "2", "3"]);
}

#[tokio::test]
async fn pop_removes_newest_first() {
    let (_dir, backend) = backend();
    let session = backend.session("pop");
    session
        .add_items(&[MessageItem::new("user", "a"), MessageItem::new("user", "b")])
        .await
        .unwrap();

    assert_eq!(session.pop_item().await.unwrap().unwrap().text(), Some("b"));
    assert_eq!(session.pop_item().await.unwrap().unwrap().text(), Some("a"));
    assert!(session.pop_item().await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_pops_never_return_the_same_item() {
    let (_dir, backend) = backend();
    let items: Vec<MessageItem> = (0..20).map(|i| MessageItem::new("user", i.to_string())).collect();
    backend.session("race").add_items(&items).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let session = backend.session("race");
        tasks.push(tokio::spawn(async move {
            let mut popped = Vec::new();
            while let Some(item) = session.pop_item().await.unwrap() {
                popped.push(item.text().unwrap().to_string());
            }
            popped
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for content in task.await.unwrap() {
            assert!(seen.insert(content), "item popped twice");
        }
    }
    assert_eq!(seen.len(), 20);
}

#[tokio::test]
async fn racing_pops_on_single_item_have_one_winner() {
    let (_dir, backend) = backend();
    backend
        .session("single")
        .add_items(&[MessageItem::new("user", "only")])
        .await
        .unwrap();

    let first = backend.session("single");
    let second = backend.session("single");
    let (a, b) = tokio::join!(first.pop_item(), second.pop_item());
    let outcomes = [a.unwrap(), b.unwrap()];

    let winners: Vec<&MessageItem> = outcomes.iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].text(), Some("only"));
    assert!(backend.session("single").get_items(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_only_affects_one_session() {
    let (_dir, backend) = backend();
    let a = backend.session("a");
    let b = backend.session("b");
    a.add_items(&[MessageItem::new("user", "a1")]).await.unwrap();
    b.add_items(&[MessageItem::new("user", "b1")]).await.unwrap();

    a.clear_session().await.unwrap();
    a.clear_session().await.unwrap();

    assert!(a.get_items(None).await.unwrap().is_empty());
    assert_eq!(contents(&b.get_items(None).await.unwrap()), ["b1"]);
}

#[tokio::test]
async fn history_survives_reopening_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.db");
    {
        let backend = SqliteSessionBackend::open(&path).unwrap();
        let session = backend.open("persist").await.unwrap();
        session.add_items(&[MessageItem::new("user", "kept")]).await.unwrap();
        session.close();
    }

    let backend = SqliteSessionBackend::open(&path).unwrap();
    let items = backend.session("persist").get_items(None).await.unwrap();
    assert_eq!(contents(&items), ["kept"]);
}

#[tokio::test]
async fn unknown_session_reads_empty() {
    let (_dir, backend) = backend();
    let session = backend.session("nobody");
    assert!(session.get_items(None).await.unwrap().is_empty());
    assert!(session.pop_item().await.unwrap().is_none());
}
