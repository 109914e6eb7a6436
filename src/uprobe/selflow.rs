//! `selflow` probe (spec §4.3, scenario 5): decides which `NEW_FLOW`
//! split events to accept, matching a configurable selector string.
//!
//! Selector syntax (spec §4.3): `"auto"` (accept the first match only),
//! `"123,456"` (accept exactly that id list, in any order), `"all"`
//! (accept everything), `""` (reject everything). Accepted flow ids are
//! tracked so a second `NEW_FLOW` for an already-accepted id is also
//! rejected — each id is selected exactly once.

use super::{Event, Outcome, PipeId, Uprobe};
use parking_lot::Mutex;
use std::collections::HashSet;

enum Selector {
    Auto,
    All,
    Ids(HashSet<u64>),
    None,
}

fn parse_selector(s: &str) -> Selector {
    match s {
        "auto" => Selector::Auto,
        "all" => Selector::All,
        "" => Selector::None,
        list => Selector::Ids(list.split(',').filter_map(|n| n.trim().parse().ok()).collect()),
    }
}

struct State {
    accepted: HashSet<u64>,
    auto_done: bool,
}

/// One probe instance handles one sub-flow family (e.g. "only audio
/// flows"); a chain typically carries several, each constructed with a
/// different selector for its own signature family.
pub struct SelflowProbe {
    selector: Selector,
    state: Mutex<State>,
    on_select: Box<dyn Fn(u64, &str) + Send + Sync>,
}

impl SelflowProbe {
    pub fn new(selector: &str, on_select: impl Fn(u64, &str) + Send + Sync + 'static) -> Self {
        SelflowProbe {
            selector: parse_selector(selector),
            state: Mutex::new(State {
                accepted: HashSet::new(),
                auto_done: false,
            }),
            on_select: Box::new(on_select),
        }
    }

    /// Flow ids accepted so far, for introspection/tests.
    pub fn accepted_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.lock().accepted.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn should_accept(&self, flow_id: u64) -> bool {
        let mut state = self.state.lock();
        if state.accepted.contains(&flow_id) {
            return false;
        }
        let accept = match &self.selector {
            Selector::Auto => !state.auto_done,
            Selector::All => true,
            Selector::Ids(ids) => ids.contains(&flow_id),
            Selector::None => false,
        };
        if accept {
            state.accepted.insert(flow_id);
            if matches!(self.selector, Selector::Auto) {
                state.auto_done = true;
            }
        }
        accept
    }
}

impl Uprobe for SelflowProbe {
    fn name(&self) -> &'static str {
        "selflow"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::NewFlow { flow_id, flow_def } => {
                if self.should_accept(*flow_id) {
                    (self.on_select)(*flow_id, flow_def);
                    Outcome::Handled
                } else {
                    Outcome::Unhandled
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}
