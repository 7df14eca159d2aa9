// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn capacity_is_clamped_to_at_least_one() {
    assert_eq!(Governor::new(0).capacity(), 1);
    assert_eq!(Governor::new(4).capacity(), 4);
}

#[tokio::test]
async fn permits_bound_concurrent_holders() {
    let governor = Governor::new(2);
    let first = governor.admit().await.unwrap();
    let _second = governor.admit().await.unwrap();
    assert_eq!(governor.available(), 0);

    // A third admit parks until a permit returns.
    let waiting = {
        let governor = governor.clone();
        tokio::spawn(async move { governor.admit().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    drop(first);
    let _third = waiting.await.unwrap().unwrap();
    assert_eq!(governor.available(), 0);
}

#[tokio::test]
async fn admission_is_fifo() {
    let governor = Governor::new(1);
    let held = governor.admit().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for n in 0..3 {
        let governor = governor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let permit = governor.admit().await.unwrap();
            let _ = tx.send(n);
            drop(permit);
        });
        // Ensure each waiter queues before the next spawns.
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    }

    drop(held);
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv().await.unwrap());
    }
    assert_eq!(order, vec![0, 1, 2]);
}

#[tokio::test]
async fn clones_share_the_same_pool() {
    let governor = Governor::new(1);
    let other = governor.clone();
    let _permit = governor.admit().await.unwrap();
    assert_eq!(other.available(), 0);
}
