use test_log::test;
use unique_observer::{impl_upcast, Downcast, Observer, Owner};

trait Shape: Downcast {
    fn sides(&self) -> u32;
}

#[derive(Debug)]
struct Triangle;
#[derive(Debug)]
struct Square {
    side: f32,
}

impl Shape for Triangle {
    fn sides(&self) -> u32 {
        3
    }
}
impl Shape for Square {
    fn sides(&self) -> u32 {
        4
    }
}

impl_upcast!(Triangle, Square => dyn Shape);

#[test]
fn observe_through_the_trait() {
    let owner = Owner::new(Square { side: 2.0 });
    let shape: Observer<dyn Shape> = Observer::from_owner(&owner);
    assert_eq!(shape.borrow().sides(), 4);
    drop(owner);
    assert!(!shape.is_valid());
}

#[test]
fn upcast_moves_the_attachment() {
    let owner = Owner::new(Triangle);
    let concrete = owner.observe();
    assert_eq!(owner.attachment_count(), 1);
    let shape: Observer<dyn Shape> = concrete.upcast();
    assert_eq!(owner.attachment_count(), 1);
    assert_eq!(shape.borrow().sides(), 3);
}

#[test]
fn downcast_to_unrelated_type_is_null_and_leaves_source_alone() {
    let owner = Owner::new(Triangle);
    let shape: Observer<dyn Shape> = owner.observe().upcast();
    let square = shape.downcast::<Square>();
    assert!(square.is_null());
    assert_eq!(square.attachment_count(), 0);
    assert!(shape.is_valid());
    assert_eq!(owner.attachment_count(), 1);
}

#[test]
fn downcast_shares_the_block() {
    let owner = Owner::new(Square { side: 1.0 });
    let shape: Observer<dyn Shape> = owner.observe().upcast();
    let square = shape.downcast::<Square>();
    assert_eq!(owner.attachment_count(), 2);
    square.borrow_mut().side = 5.0;
    assert_eq!(owner.borrow().side, 5.0);
    drop(owner);
    assert!(!square.is_valid());
    assert!(!shape.is_valid());
}

#[test]
fn owner_of_a_trait_object() {
    let owner: Owner<dyn Shape> = Owner::from_box(Box::new(Square { side: 3.0 }));
    let shape = owner.observe();
    assert_eq!(shape.borrow().sides(), 4);
    assert_eq!(shape.downcast::<Square>().borrow().side, 3.0);
}
