//! Best-effort name deduction for functions the shadow stack does not know
//! about: search the host's global namespace for a binding equal to the
//! function, forming a dotted path when it sits inside a nested table.

use crate::frame::HostFnId;
use crate::host::{GlobalIter, GlobalValue, Host};

/// How deep into nested namespaces the search goes: the globals themselves
/// plus one table below.
const SEARCH_DEPTH: usize = 2;

/// Can we find a function name?
pub fn identify(host: &dyn Host, target: HostFnId) -> Option<String> {
    find_in(host.globals(), target, SEARCH_DEPTH)
}

fn find_in(entries: GlobalIter<'_>, target: HostFnId, level: usize) -> Option<String> {
    if level == 0 {
        return None;
    }

    for (key, value) in entries {
        // The global table is also part of the global table; skip the
        // self-reference.
        if key == "_G" {
            continue;
        }

        match value {
            GlobalValue::Function(id) if id == target => return Some(key),
            GlobalValue::Namespace(inner) => {
                if let Some(nested) = find_in(inner, target, level - 1) {
                    return Some(format!("{key}.{nested}"));
                }
            }
            _ => {}
        }
    }

    None
}
