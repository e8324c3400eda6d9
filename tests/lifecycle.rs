use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_log::test;
use unique_observer::{stats, Observer, Owner, StatsDiff};

#[derive(Debug)]
struct Base {
    id: u32,
}

#[test]
fn owner_destroyed_observer_reports_invalid() {
    let owner = Owner::new(Base { id: 1 });
    let a = owner.observe();
    drop(owner);
    assert!(!a.is_valid());
    assert!(a.get().is_none());
}

#[test]
fn untouched_observer_still_notices() {
    // never looked at between creation and the owner's death
    let owner = Owner::new(Base { id: 2 });
    let a = owner.observe();
    drop(owner);
    assert!(a.get().is_none());
}

#[test]
fn copies_die_together() {
    let owner = Owner::new(Base { id: 3 });
    let a = owner.observe();
    let b = a.clone();
    assert_eq!(owner.attachment_count(), 2);
    owner.invalidate_observers();
    assert!(!a.is_valid());
    assert!(!b.is_valid());
    assert_eq!(owner.borrow().id, 3);
}

#[test]
fn dropping_one_copy_leaves_the_other() {
    let owner = Owner::new(Base { id: 4 });
    let a = owner.observe();
    let b = a.clone();
    drop(a);
    assert!(b.is_valid());
    assert_eq!(b.borrow().id, 4);
    assert_eq!(owner.attachment_count(), 1);
}

#[test]
fn fresh_observers_after_invalidate_observers() {
    let owner = Owner::new(Base { id: 5 });
    let old = owner.observe();
    owner.invalidate_observers();
    let new = owner.observe();
    assert!(!old.is_valid());
    assert!(new.is_valid());
    assert_eq!(owner.attachment_count(), 1);
}

#[test]
fn every_block_is_freed_once() {
    let before = stats();
    {
        let owner = Owner::new(Base { id: 6 });
        let a = owner.observe();
        let b = a.clone();
        let _c = b.clone();
        drop(owner);
        assert!(!a.is_valid());
    }
    let diff = stats() - before;
    assert_eq!(diff.blocks_created, 1);
    assert_eq!(diff.blocks_freed, 1);
    assert_eq!(diff.live_blocks, 0);
    assert_eq!(diff.attaches, diff.detaches);
}

#[test]
fn unobserved_owner_is_free() {
    let before = stats();
    let owner = Owner::new(Base { id: 7 });
    drop(owner);
    assert_eq!(stats() - before, StatsDiff::default());
}

/// Random interleavings of observe, clone, drop, check, replace and reset across a handful of
/// owners, checked against a model of which object each observer is watching.
#[test]
fn random_interleavings_match_the_model() {
    const OWNERS: usize = 4;
    let mut rng = StdRng::seed_from_u64(0x0b5e_7e7);
    let before = stats();

    {
        let mut owners: Vec<Owner<u64>> = (0..OWNERS as u64).map(Owner::new).collect();
        // The value each owner currently holds. Every object gets a unique value.
        let mut current: Vec<Option<u64>> = (0..OWNERS as u64).map(Some).collect();
        let mut next_value = OWNERS as u64;
        // Each observer, and the value it was watching when made.
        let mut observers: Vec<(Observer<u64>, Option<u64>)> = vec![];

        for _ in 0..2_000 {
            let i = rng.gen_range(0..OWNERS);
            match rng.gen_range(0..7) {
                0 | 1 => observers.push((owners[i].observe(), current[i])),
                2 if !observers.is_empty() => {
                    let k = rng.gen_range(0..observers.len());
                    let (obs, watched) = &observers[k];
                    let copy = obs.clone();
                    let watched = *watched;
                    observers.push((copy, watched));
                }
                3 if !observers.is_empty() => {
                    let k = rng.gen_range(0..observers.len());
                    observers.swap_remove(k);
                }
                4 => {
                    owners[i].replace(next_value);
                    current[i] = Some(next_value);
                    next_value += 1;
                }
                5 => {
                    owners[i].reset();
                    current[i] = None;
                }
                _ => owners[i].invalidate_observers(),
            }

            // An observer may only be valid while its object is alive, and must read it.
            for (obs, watched) in &observers {
                if let Ok(value) = obs.try_borrow().map(|v| *v) {
                    assert_eq!(Some(value), *watched);
                    assert!(current.contains(watched));
                } else {
                    assert_eq!(obs.attachment_count(), 0);
                }
            }
        }
    }

    let diff = stats() - before;
    tracing::info!("{diff:?}");
    assert_eq!(diff.blocks_created, diff.blocks_freed);
    assert_eq!(diff.live_blocks, 0);
    assert_eq!(diff.attaches, diff.detaches);
}
