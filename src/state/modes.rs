//! User mode descriptors and mode stacking.
//!
//! The [`ModeRegistry`] resolves modes by wire letter or by name and
//! batches outgoing changes. Changes staged during one event are merged
//! per target and emitted as [`ModeLine`]s when the event completes, so a
//! `+o` followed by `-o` in the same event never reaches the network.

use crate::state::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Services-level identity of a user mode, independent of its wire letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserModeName {
    Oper,
    Invisible,
    Wallops,
    Registered,
    Cloak,
    Vhost,
    Protected,
    God,
    Service,
    Bot,
    Deaf,
    Secure,
    RegisteredPrivmsg,
    Snomask,
}

impl UserModeName {
    /// Letter used by the built-in table.
    pub const fn default_letter(self) -> char {
        match self {
            Self::Oper => 'o',
            Self::Invisible => 'i',
            Self::Wallops => 'w',
            Self::Registered => 'r',
            Self::Cloak => 'x',
            Self::Vhost => 't',
            Self::Protected => 'a',
            Self::God => 'q',
            Self::Service => 'S',
            Self::Bot => 'B',
            Self::Deaf => 'd',
            Self::Secure => 'Z',
            Self::RegisteredPrivmsg => 'R',
            Self::Snomask => 's',
        }
    }
}

/// Whether a mode carries a parameter when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Regular,
    Param,
}

/// One entry of the mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDescriptor {
    pub name: UserModeName,
    pub letter: char,
    pub kind: ModeKind,
}

impl ModeDescriptor {
    pub const fn regular(name: UserModeName) -> Self {
        Self {
            name,
            letter: name.default_letter(),
            kind: ModeKind::Regular,
        }
    }

    pub const fn param(name: UserModeName) -> Self {
        Self {
            name,
            letter: name.default_letter(),
            kind: ModeKind::Param,
        }
    }
}

/// Built-in mode table (InspIRCd/Unreal-style letters).
const DEFAULT_MODES: &[ModeDescriptor] = &[
    ModeDescriptor::regular(UserModeName::Oper),
    ModeDescriptor::regular(UserModeName::Invisible),
    ModeDescriptor::regular(UserModeName::Wallops),
    ModeDescriptor::regular(UserModeName::Registered),
    ModeDescriptor::regular(UserModeName::Cloak),
    ModeDescriptor::regular(UserModeName::Vhost),
    ModeDescriptor::regular(UserModeName::Protected),
    ModeDescriptor::regular(UserModeName::God),
    ModeDescriptor::regular(UserModeName::Service),
    ModeDescriptor::regular(UserModeName::Bot),
    ModeDescriptor::regular(UserModeName::Deaf),
    ModeDescriptor::regular(UserModeName::Secure),
    ModeDescriptor::regular(UserModeName::RegisteredPrivmsg),
    ModeDescriptor::param(UserModeName::Snomask),
];

/// A staged change waiting for the end of the event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StackedChange {
    letter: char,
    name: UserModeName,
    kind: ModeKind,
    adding: bool,
    param: Option<String>,
    /// Whether the target had the mode before the first staged change.
    was_set: bool,
}

/// One outgoing `MODE` line for a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeLine {
    pub target: SessionId,
    /// e.g. `+oi-w`
    pub modes: String,
    pub params: Vec<String>,
}

/// Mode table plus the per-event stacker.
#[derive(Debug)]
pub struct ModeRegistry {
    by_letter: HashMap<char, ModeDescriptor>,
    by_name: HashMap<UserModeName, ModeDescriptor>,
    /// Insertion-ordered targets so output order follows staging order.
    pending: Vec<(SessionId, Vec<StackedChange>)>,
    max_modes: usize,
}

impl ModeRegistry {
    pub fn new(max_modes: usize) -> Self {
        Self::with_table(DEFAULT_MODES.iter().copied(), max_modes)
    }

    /// Build from an explicit table, for daemons with different letters.
    pub fn with_table(table: impl IntoIterator<Item = ModeDescriptor>, max_modes: usize) -> Self {
        let mut by_letter = HashMap::new();
        let mut by_name = HashMap::new();
        for desc in table {
            by_letter.insert(desc.letter, desc);
            by_name.insert(desc.name, desc);
        }
        Self {
            by_letter,
            by_name,
            pending: Vec::new(),
            max_modes: max_modes.max(1),
        }
    }

    pub fn by_letter(&self, letter: char) -> Option<ModeDescriptor> {
        self.by_letter.get(&letter).copied()
    }

    pub fn by_name(&self, name: UserModeName) -> Option<ModeDescriptor> {
        self.by_name.get(&name).copied()
    }

    /// Stage a change for `target`. `was_set` is whether the target has
    /// the mode right now. A change that brings the mode back to where it
    /// was before the event cancels the staged one; otherwise the later
    /// change replaces it.
    pub fn stage(
        &mut self,
        target: SessionId,
        desc: ModeDescriptor,
        adding: bool,
        param: Option<String>,
        was_set: bool,
    ) {
        let idx = match self.pending.iter().position(|(t, _)| *t == target) {
            Some(idx) => idx,
            None => {
                self.pending.push((target, Vec::new()));
                self.pending.len() - 1
            }
        };
        let changes = &mut self.pending[idx].1;

        if let Some(pos) = changes.iter().position(|c| c.name == desc.name) {
            let change = &mut changes[pos];
            // a re-set parameter may differ from the original, so it stays
            let restored = if adding {
                change.was_set && change.kind == ModeKind::Regular
            } else {
                !change.was_set
            };
            if restored {
                changes.remove(pos);
                if changes.is_empty() {
                    self.pending.remove(idx);
                }
            } else {
                change.adding = adding;
                change.param = param;
            }
            return;
        }

        changes.push(StackedChange {
            letter: desc.letter,
            name: desc.name,
            kind: desc.kind,
            adding,
            param,
            was_set,
        });
    }

    /// Number of changes currently staged.
    pub fn staged(&self) -> usize {
        self.pending.iter().map(|(_, c)| c.len()).sum()
    }

    /// Drop anything staged for a target that no longer exists.
    pub fn discard(&mut self, target: SessionId) {
        self.pending.retain(|(t, _)| *t != target);
    }

    /// Drain staged changes into `MODE` lines of at most `max_modes` each.
    pub fn flush(&mut self) -> Vec<ModeLine> {
        let mut lines = Vec::new();
        for (target, changes) in self.pending.drain(..) {
            for chunk in changes.chunks(self.max_modes) {
                let mut modes = String::new();
                let mut params = Vec::new();
                let mut sign = None;
                for change in chunk {
                    if sign != Some(change.adding) {
                        modes.push(if change.adding { '+' } else { '-' });
                        sign = Some(change.adding);
                    }
                    modes.push(change.letter);
                    if change.adding
                        && let Some(p) = &change.param
                    {
                        params.push(p.clone());
                    }
                }
                lines.push(ModeLine {
                    target,
                    modes,
                    params,
                });
            }
        }
        lines
    }
}
