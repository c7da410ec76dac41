//! Scoped activation tokens and the per-thread call stack.
//!
//! A [`FunctionProfile`] is acquired at the top of a code region and dropped
//! when the region exits; the drop records the elapsed time into the registry.
//! Nesting is tracked through a genuine thread-local stack: only the owning
//! thread ever pushes or pops, so entering a region takes no lock at all. The
//! full call-path name is derived from whatever is currently on the stack
//! (`parent_path + "->" + local_name`), so the same local name produces
//! separate aggregates under different dynamic callers - `"validate->hash"`
//! and `"relay->hash"` are distinct entries on purpose.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::registry::Profiler;

struct Frame {
    full_path: String,
    /// Micros spent in completed child activations of this frame.
    subordinate_micros: u64,
}

thread_local! {
    static ACTIVATION_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// RAII token for one activation of a profiled call path.
///
/// Tokens are exclusively owned by the instrumented scope and must be dropped
/// in the reverse order of creation, which holding them for the lexical scope
/// (the intended use) guarantees. They are deliberately `!Send`: the stack a
/// token was pushed onto belongs to the creating thread.
pub struct FunctionProfile {
    /// `None` when profiling is administratively disabled; construction and
    /// drop are then no-ops with no stack push and no lock.
    profiler: Option<Arc<Profiler>>,
    started: Instant,
    sampling_interval: u64,
    warm_up_samples: usize,
    _not_send: PhantomData<*const ()>,
}

impl FunctionProfile {
    pub(crate) fn enter(
        profiler: Arc<Profiler>,
        name: &str,
        sampling_interval: u64,
        warm_up_samples: usize,
    ) -> Self {
        ACTIVATION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let full_path = match stack.last() {
                Some(parent) => format!("{}->{}", parent.full_path, name),
                None => name.to_string(),
            };
            stack.push(Frame {
                full_path,
                subordinate_micros: 0,
            });
        });
        Self {
            profiler: Some(profiler),
            started: Instant::now(),
            sampling_interval,
            warm_up_samples,
            _not_send: PhantomData,
        }
    }

    /// A token that records nothing, used when profiling is disabled.
    pub fn disabled() -> Self {
        Self {
            profiler: None,
            started: Instant::now(),
            sampling_interval: 0,
            warm_up_samples: 0,
            _not_send: PhantomData,
        }
    }
}

impl Drop for FunctionProfile {
    fn drop(&mut self) {
        let Some(profiler) = self.profiler.take() else {
            return;
        };
        let elapsed_micros = self.started.elapsed().as_micros() as u64;
        let frame = ACTIVATION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack
                .pop()
                .expect("activation completed on a thread with an empty stack");
            if let Some(parent) = stack.last_mut() {
                parent.subordinate_micros += elapsed_micros;
            }
            frame
        });
        profiler.record_completed(
            &frame.full_path,
            elapsed_micros,
            frame.subordinate_micros,
            Utc::now().timestamp_millis(),
            self.sampling_interval,
            self.warm_up_samples,
        );
    }
}
