#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vhb_core::Rect;
use vhb_runtime::{ResolutionHandle, ResolutionPayload, ResolutionState};

#[derive(Debug, Arbitrary)]
enum Op {
    Resolve,
    ResolveWithArg(i32),
    ResolveWithRect(i16, i16, u16, u16),
    Terminate,
    Then,
    AddTerminateObserver,
    DropClone,
    CloneHandle,
}

fuzz_target!(|ops: Vec<Op>| {
    let handle = ResolutionHandle::new();
    let mut clones = Vec::new();
    let then_calls = Rc::new(Cell::new(0u32));
    let terminate_calls = Rc::new(Cell::new(0u32));
    let mut first: Option<(ResolutionState, ResolutionPayload)> = None;

    for op in ops.into_iter().take(256) {
        let was_pending = handle.is_pending();
        let transitioned = match op {
            Op::Resolve => handle.resolve(),
            Op::ResolveWithArg(arg) => handle.resolve_with_arg(arg),
            Op::ResolveWithRect(x, y, w, h) => handle.resolve_with_rect(Rect::new(
                f64::from(x),
                f64::from(y),
                f64::from(w),
                f64::from(h),
            )),
            Op::Terminate => handle.terminate(),
            Op::Then => {
                let before = then_calls.get();
                let calls = Rc::clone(&then_calls);
                handle.then(move |_| calls.set(calls.get() + 1));
                // Replayed immediately once resolved, dropped once terminated.
                let replayed = u32::from(handle.is_resolved());
                assert_eq!(then_calls.get(), before + replayed);
                false
            }
            Op::AddTerminateObserver => {
                let calls = Rc::clone(&terminate_calls);
                handle.add_terminate_observer(move || calls.set(calls.get() + 1));
                false
            }
            Op::DropClone => {
                clones.pop();
                false
            }
            Op::CloneHandle => {
                clones.push(handle.clone());
                false
            }
        };

        // Only the first terminal transition reports success.
        assert_eq!(transitioned, was_pending && handle.state().is_terminal());
        if transitioned {
            first = Some((handle.state(), handle.payload()));
        }
        if let Some(settled) = first {
            assert_eq!((handle.state(), handle.payload()), settled);
        }
        for clone in &clones {
            assert_eq!(clone.state(), handle.state());
        }
    }

    match handle.state() {
        ResolutionState::Pending => assert_eq!(then_calls.get() + terminate_calls.get(), 0),
        ResolutionState::Resolved => assert_eq!(terminate_calls.get(), 0),
        ResolutionState::Terminated => assert_eq!(then_calls.get(), 0),
    }
});
