use hybrid_extract::engine::pool::Pool;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn reuses_idle_items() {
    let made = Arc::new(AtomicUsize::new(0));
    let m = Arc::clone(&made);
    let pool = Pool::new(2, move || Ok(m.fetch_add(1, Ordering::SeqCst)));

    {
        let a = pool.get().unwrap();
        assert_eq!(*a, 0);
    }
    let b = pool.get().unwrap();
    assert_eq!(*b, 0);
    assert_eq!(made.load(Ordering::SeqCst), 1);
}

#[test]
fn never_exceeds_capacity() {
    let in_use = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let pool = Pool::new(2, || Ok(()));
    assert_eq!(pool.capacity(), 2);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let _g = pool.get().unwrap();
                let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(10));
                in_use.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn failed_creation_frees_its_slot() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let pool = Pool::new(1, move || {
        if c.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("first spawn fails")
        }
        Ok(7)
    });

    assert!(pool.get().is_err());
    assert_eq!(*pool.get().unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
