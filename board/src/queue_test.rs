use super::*;

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

#[test]
fn insert_and_peek_returns_newest() {
    let mut queue = TimestampQueue::new();
    assert!(queue.insert(id(1), 10));
    assert!(queue.insert(id(2), 30));
    assert!(queue.insert(id(3), 20));
    let top = queue.peek().expect("top");
    assert_eq!(top.id, id(2));
    assert_eq!(top.ts, 30);
}

#[test]
fn insert_rejects_duplicate_id() {
    let mut queue = TimestampQueue::new();
    assert!(queue.insert(id(1), 10));
    assert!(!queue.insert(id(1), 99));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.ts_of(&id(1)), Some(10));
}

#[test]
fn pop_drains_in_descending_order() {
    let mut queue = TimestampQueue::new();
    for (n, ts) in [(1, 50), (2, 10), (3, 40), (4, 30), (5, 20)] {
        queue.insert(id(n), ts);
    }
    let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|e| e.ts).collect();
    assert_eq!(order, vec![50, 40, 30, 20, 10]);
    assert!(queue.is_empty());
}

#[test]
fn equal_timestamps_break_ties_by_id() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(3), 10);
    queue.insert(id(7), 10);
    queue.insert(id(5), 10);
    let order: Vec<Uuid> = std::iter::from_fn(|| queue.pop()).map(|e| e.id).collect();
    assert_eq!(order, vec![id(7), id(5), id(3)]);
}

#[test]
fn remove_arbitrary_element_keeps_heap_order() {
    let mut queue = TimestampQueue::new();
    for (n, ts) in [(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)] {
        queue.insert(id(n), ts);
    }
    let removed = queue.remove(&id(3)).expect("removed");
    assert_eq!(removed.ts, 30);
    assert!(!queue.contains(&id(3)));

    let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|e| e.ts).collect();
    assert_eq!(order, vec![50, 40, 20, 10]);
}

#[test]
fn remove_unknown_id_returns_none() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    assert!(queue.remove(&id(2)).is_none());
    assert_eq!(queue.len(), 1);
}

#[test]
fn remove_last_element_leaves_empty_queue() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    assert!(queue.remove(&id(1)).is_some());
    assert!(queue.is_empty());
    assert!(queue.peek().is_none());
}

#[test]
fn update_ts_moves_element_up() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    queue.insert(id(2), 20);
    queue.insert(id(3), 30);
    assert!(queue.update_ts(&id(1), 99));
    let top = queue.peek().expect("top");
    assert_eq!(top.id, id(1));
    assert_eq!(top.ts, 99);
}

#[test]
fn update_ts_moves_element_down() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    queue.insert(id(2), 20);
    queue.insert(id(3), 30);
    assert!(queue.update_ts(&id(3), 5));
    assert_eq!(queue.peek().expect("top").id, id(2));
    let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|e| e.ts).collect();
    assert_eq!(order, vec![20, 10, 5]);
}

#[test]
fn update_ts_unknown_id_returns_false() {
    let mut queue = TimestampQueue::new();
    assert!(!queue.update_ts(&id(1), 10));
}

#[test]
fn pop_later_than_drains_strictly_newer() {
    let mut queue = TimestampQueue::new();
    for (n, ts) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        queue.insert(id(n), ts);
    }
    let later = queue.pop_later_than(20);
    let later_ts: Vec<i64> = later.iter().map(|e| e.ts).collect();
    assert_eq!(later_ts, vec![40, 30]);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.peek().expect("top").ts, 20);
}

#[test]
fn pop_later_than_boundary_is_exclusive() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    assert!(queue.pop_later_than(10).is_empty());
    assert_eq!(queue.len(), 1);
}

#[test]
fn clear_empties_index_too() {
    let mut queue = TimestampQueue::new();
    queue.insert(id(1), 10);
    queue.insert(id(2), 20);
    queue.clear();
    assert!(queue.is_empty());
    assert!(!queue.contains(&id(1)));
    assert!(queue.insert(id(1), 5));
}
