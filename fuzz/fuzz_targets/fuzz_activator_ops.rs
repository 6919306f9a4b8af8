#![no_main]

use arbitrary::Arbitrary;
use kabu_core::reactive::{SourceExt, Subject};
use kabu_core::{ActionEvent, StreamError};
use kabu_runtime::{Action, ActionError, ActivatorConfig, Director, RecoverPattern};
use libfuzzer_sys::fuzz_target;

struct Worker<const N: usize> {
    sources: Vec<Subject<u8>>,
    reload: bool,
}

impl<const N: usize> Action<()> for Worker<N> {
    fn invoke(&self, _director: &Director<()>) -> Vec<ActionEvent> {
        self.sources
            .iter()
            .map(|source| source.clone().labeled(format!("worker-{N}")))
            .collect()
    }

    fn on_error(&self, _error: &ActionError) -> RecoverPattern {
        if self.reload {
            RecoverPattern::reload()
        } else {
            RecoverPattern::DoNothing
        }
    }
}

#[derive(Arbitrary, Debug)]
enum Op {
    Activate { slot: bool, reload: bool },
    Deactivate { slot: bool },
    DeactivateAll,
    Fail { source: u8 },
    Emit { source: u8, value: u8 },
    Close,
}

#[derive(Arbitrary, Debug)]
struct Input {
    max_retries: Option<u8>,
    source_count: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let count = usize::from(input.source_count % 4) + 1;
    let sources: Vec<Subject<u8>> = (0..count).map(|_| Subject::new()).collect();
    let config = match input.max_retries {
        Some(max) => ActivatorConfig::default().with_max_retries(u32::from(max % 16)),
        None => ActivatorConfig::default().with_max_retries(16),
    };
    let activator = Director::detached().activator_with(config);

    for op in input.ops.into_iter().take(256) {
        match op {
            Op::Activate { slot, reload } => {
                let sources = sources.clone();
                if slot {
                    activator.activate(Worker::<1> { sources, reload });
                } else {
                    activator.activate(Worker::<0> { sources, reload });
                }
            }
            Op::Deactivate { slot } => {
                if slot {
                    activator.deactivate::<Worker<1>>();
                } else {
                    activator.deactivate::<Worker<0>>();
                }
            }
            Op::DeactivateAll => {
                activator.deactivate_all();
                assert_eq!(activator.active_count(), 0);
            }
            Op::Fail { source } => {
                sources[usize::from(source) % count].fail(StreamError::new("fuzz"));
            }
            Op::Emit { source, value } => sources[usize::from(source) % count].emit(value),
            Op::Close => activator.close(),
        }

        let active = usize::from(activator.is_active::<Worker<0>>())
            + usize::from(activator.is_active::<Worker<1>>());
        assert_eq!(activator.active_count(), active);
        for source in &sources {
            assert!(source.subscriber_count() <= active);
        }
    }
});
