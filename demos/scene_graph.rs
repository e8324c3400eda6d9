//! A tiny scene graph. Nodes own their children outright, children and the editor's selection
//! only observe. Deleting a subtree leaves every stale selection reporting itself dead instead
//! of dangling.
//!
//! Run with `RUST_LOG=unique_observer=trace` to watch the control blocks come and go.

use tracing_subscriber::EnvFilter;
use unique_observer::{member, stats, Observer, Owner, Path};

struct Node {
    name: String,
    position: [f32; 3],
    parent: Observer<Node>,
    children: Vec<Owner<Node>>,
}

impl Node {
    fn new(name: &str) -> Self {
        Node {
            name: name.into(),
            position: [0.0; 3],
            parent: Observer::null(),
            children: vec![],
        }
    }
}

/// Adds a child under `parent` and returns an observer of it.
fn attach(parent: &Owner<Node>, name: &str) -> Observer<Node> {
    let child = Owner::new(Node {
        parent: parent.observe(),
        ..Node::new(name)
    });
    let handle = child.observe();
    parent.borrow_mut().children.push(child);
    handle
}

fn path_of(node: &Observer<Node>) -> String {
    let mut names = vec![];
    let mut cursor = node.clone();
    while let Ok(current) = cursor.try_borrow() {
        names.push(current.name.clone());
        let up = current.parent.clone();
        drop(current);
        cursor = up;
    }
    names.reverse();
    names.join("/")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let before = stats();

    let root = Owner::new(Node::new("root"));
    let arm = attach(&root, "arm");
    let hand = {
        let root_node = root.borrow();
        attach(&root_node.children[0], "hand")
    };
    let _leg = attach(&root, "leg");

    // The editor keeps pointing at the hand's x coordinate.
    let x = hand
        .point_into(&Path::new().field(member!(Node, position)).at::<0>())
        .expect("hand is alive");
    *x.borrow_mut() = 4.5;
    println!("selected {} (x = {})", path_of(&hand), x.borrow());

    // Delete the arm, and with it the hand.
    let removed = root.borrow_mut().children.remove(0);
    drop(removed);

    println!("arm alive: {}", arm.is_valid());
    println!("hand alive: {}", hand.is_valid());
    println!("x alive: {}", x.is_valid());
    assert!(x.try_borrow().is_err());

    drop(root);
    println!("{:#?}", stats() - before);
}
