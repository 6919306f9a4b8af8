#![no_main]

use std::rc::Rc;

use arbitrary::Arbitrary;
use kabu_runtime::{
    Attachment, Destination, Routes, Scene, SceneSequence, SceneTransition, SequenceConfig, Shared,
    TransitionContext, shared,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug, Clone, Copy)]
enum Hop {
    Push { pinned: bool },
    Decline,
}

impl Destination<u8> for Hop {
    fn request(self, context: &TransitionContext<'_, u8>) -> Option<SceneTransition<u8>> {
        match self {
            Hop::Push { pinned } => context.specify(Node::new(pinned), None, |_, _| {}),
            Hop::Decline => None,
        }
    }
}

struct Node {
    attachment: Attachment<u8>,
    pinned: bool,
}

impl Node {
    fn new(pinned: bool) -> Shared<Self> {
        shared(Self {
            attachment: Attachment::new(),
            pinned,
        })
    }
}

impl Scene<u8> for Node {
    type Router = Routes<Hop>;
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
}

#[derive(Arbitrary, Debug)]
enum Op {
    Push { pinned: bool, stage: Option<u8> },
    Navigate(Hop),
    ReleaseTop,
    ReleaseRoot,
    ReleaseCurrent,
    RepushRoot,
    Exit,
}

#[derive(Arbitrary, Debug)]
struct Input {
    max_depth: Option<u8>,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let root = Node::new(false);
    let mut config = SequenceConfig::default();
    if let Some(limit) = input.max_depth {
        config = config.with_max_depth(usize::from(limit).max(1));
    }
    let sequence = SceneSequence::new(0u8, Rc::clone(&root), None, |_, _| {}).with_config(config);
    assert!(sequence.start());

    for op in input.ops.into_iter().take(256) {
        let before = sequence.depth();
        match op {
            Op::Push { pinned, stage } => {
                let mut transition = SceneTransition::new(Node::new(pinned), None, |_, _| {});
                if let Some(stage) = stage {
                    transition = transition.on_stage(stage);
                }
                let pushed = sequence.push(transition).is_ok();
                assert_eq!(sequence.depth(), before + usize::from(pushed));
            }
            Op::Navigate(hop) => {
                if let Some(top) = sequence.current_scene::<Node>() {
                    let _ = top.borrow().navigate(hop);
                }
            }
            Op::ReleaseTop => {
                if let Some(top) = sequence.current_scene::<Node>() {
                    let released = sequence.release(&top);
                    assert_eq!(sequence.depth(), before - usize::from(released));
                }
            }
            Op::ReleaseRoot => {
                if before > 1 {
                    assert!(!sequence.release(&root));
                }
            }
            Op::ReleaseCurrent => {
                let released = sequence.release_current();
                assert!(!released || before > 1);
            }
            Op::RepushRoot => {
                let again = SceneTransition::new(Rc::clone(&root), None, |_, _| {});
                assert!(sequence.push(again).is_err());
            }
            Op::Exit => {
                sequence.exit();
                assert_eq!(sequence.depth(), 0);
            }
        }
    }
});
