#![forbid(unsafe_code)]

//! Property-based invariant tests for the scene stack.
//!
//! Random push / release operations are applied to a running sequence and
//! mirrored on a `Vec` model:
//!
//! 1. `depth()` equals the model length, and never drops below one.
//! 2. `current_scene` is always the model's top.
//! 3. Releasing anything but the removable top of a multi-entry stack is a
//!    no-op that does not call `will_remove`.
//! 4. A successful release calls `will_remove` exactly once.
//! 5. Every push runs its setup exactly once.

use std::cell::Cell;
use std::rc::Rc;

use kabu_runtime::{
    Attachment, Routes, Scene, SceneSequence, SceneTransition, Shared, Unreachable, shared,
};
use proptest::prelude::*;

struct Card {
    attachment: Attachment<u8>,
    pinned: bool,
    removals: Cell<u32>,
}

impl Card {
    fn new(pinned: bool) -> Shared<Self> {
        shared(Self {
            attachment: Attachment::new(),
            pinned,
            removals: Cell::new(0),
        })
    }
}

impl Scene<u8> for Card {
    type Router = Routes<Unreachable>;
    type Argument = ();

    fn router(&self) -> Self::Router {
        Routes::new()
    }

    fn attachment(&self) -> &Attachment<u8> {
        &self.attachment
    }

    fn is_removable(&self) -> bool {
        !self.pinned
    }

    fn will_remove(&mut self, _stage: &u8) {
        self.removals.set(self.removals.get() + 1);
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Push { pinned: bool },
    ReleaseTop,
    /// Release the entry `n` below the top.
    ReleaseBelow(usize),
    ReleaseCurrent,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Push { pinned: false }),
        1 => Just(Op::Push { pinned: true }),
        3 => Just(Op::ReleaseTop),
        2 => (1usize..4).prop_map(Op::ReleaseBelow),
        1 => Just(Op::ReleaseCurrent),
    ]
}

proptest! {
    #[test]
    fn sequence_matches_model(ops in proptest::collection::vec(op(), 0..48)) {
        let root = Card::new(false);
        let sequence = SceneSequence::new(0u8, Rc::clone(&root), None, |_, _| {});
        prop_assert!(sequence.start());

        let mut model: Vec<Shared<Card>> = vec![root];
        let setups = Rc::new(Cell::new(0u32));
        let mut pushes = 0u32;

        for op in ops {
            match op {
                Op::Push { pinned } => {
                    let card = Card::new(pinned);
                    let s = Rc::clone(&setups);
                    let stage = u8::try_from(model.len()).unwrap_or(u8::MAX);
                    sequence
                        .push(
                            SceneTransition::new(Rc::clone(&card), None, move |_, _| {
                                s.set(s.get() + 1);
                            })
                            .on_stage(stage),
                        )
                        .map_err(|err| TestCaseError::fail(err.to_string()))?;
                    pushes += 1;
                    model.push(card);
                }
                Op::ReleaseTop | Op::ReleaseCurrent => {
                    let top = Rc::clone(model.last().expect("model never empty"));
                    let before = top.borrow().removals.get();
                    let expected = model.len() > 1 && !top.borrow().pinned;
                    let released = if matches!(op, Op::ReleaseTop) {
                        sequence.release(&top)
                    } else {
                        sequence.release_current()
                    };
                    prop_assert_eq!(released, expected);
                    let after = top.borrow().removals.get();
                    prop_assert_eq!(after, before + u32::from(expected));
                    if expected {
                        model.pop();
                    }
                }
                Op::ReleaseBelow(n) => {
                    if let Some(index) = model.len().checked_sub(1 + n) {
                        let target = Rc::clone(&model[index]);
                        let before = target.borrow().removals.get();
                        prop_assert!(!sequence.release(&target));
                        prop_assert_eq!(target.borrow().removals.get(), before);
                    }
                }
            }

            prop_assert_eq!(sequence.depth(), model.len());
            prop_assert!(sequence.depth() >= 1);
            let current = sequence.current_scene::<Card>();
            let top = model.last().expect("model never empty");
            prop_assert!(current.is_some_and(|card| Rc::ptr_eq(&card, top)));
            prop_assert_eq!(setups.get(), pushes);
        }
    }
}
