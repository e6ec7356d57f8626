use super::*;

fn item(id: &str, priority: u8) -> WorkItem {
    WorkItem::new(id, id, "general-purpose", priority)
}

fn ids(items: Vec<WorkItem>) -> Vec<String> {
    items.into_iter().map(|i| i.id).collect()
}

#[test]
fn test_priority_order_with_fifo_ties() {
    let mut queue = WorkQueue::new();
    queue.push(item("low-1", 1));
    queue.push(item("high-1", 3));
    queue.push(item("mid-1", 2));
    queue.push(item("high-2", 3));
    queue.push(item("low-2", 1));

    assert_eq!(queue.len(), 5);
    assert_eq!(
        ids(queue.drain()),
        vec!["high-1", "high-2", "mid-1", "low-1", "low-2"]
    );
    assert!(queue.is_empty());
}

#[test]
fn test_remaining_items_keep_their_position() {
    let mut queue = WorkQueue::new();
    queue.push(item("a", 1));
    queue.push(item("b", 1));
    assert_eq!(queue.pop().map(|i| i.id).as_deref(), Some("a"));

    queue.push(item("c", 1));
    queue.push(item("d", 2));
    assert_eq!(ids(queue.drain()), vec!["d", "b", "c"]);
}

#[test]
fn test_pop_empty() {
    let mut queue = WorkQueue::new();
    assert!(queue.pop().is_none());
    assert!(queue.drain().is_empty());
}
