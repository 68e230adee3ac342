//! Exclusive-lock table over the named configuration targets.
//!
//! Shared by every session; all operations are short check-and-set critical
//! sections under one mutex. Nothing here blocks, calls handlers, or does
//! I/O — NETCONF locks are immediately decided, never queued.

use std::sync::Mutex;

/// A lockable configuration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Running,
    Candidate,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Running, Target::Candidate];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "running" => Some(Self::Running),
            "candidate" => Some(Self::Candidate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Candidate => "candidate",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Holder session id per target; 0 means unlocked.
#[derive(Debug, Default)]
pub struct LockTable {
    holders: Mutex<[u64; 2]>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-waiting acquisition; on conflict returns the current holder.
    pub fn try_lock(&self, target: Target, session_id: u64) -> Result<(), u64> {
        let mut holders = self.holders.lock().expect("lock table mutex poisoned");
        let slot = &mut holders[target.index()];
        if *slot == 0 || *slot == session_id {
            *slot = session_id;
            Ok(())
        } else {
            Err(*slot)
        }
    }

    /// Release; succeeds only when `session_id` is the current holder.
    pub fn unlock(&self, target: Target, session_id: u64) -> bool {
        let mut holders = self.holders.lock().expect("lock table mutex poisoned");
        let slot = &mut holders[target.index()];
        if *slot == session_id && session_id != 0 {
            *slot = 0;
            true
        } else {
            false
        }
    }

    /// Force-release every target this session holds; used on session close.
    pub fn release_all(&self, session_id: u64) -> Vec<Target> {
        let mut holders = self.holders.lock().expect("lock table mutex poisoned");
        let mut released = Vec::new();
        for target in Target::ALL {
            let slot = &mut holders[target.index()];
            if *slot == session_id && session_id != 0 {
                *slot = 0;
                released.push(target);
            }
        }
        released
    }

    /// Read-only probe; 0 when unlocked.
    pub fn holder_of(&self, target: Target) -> u64 {
        let holders = self.holders.lock().expect("lock table mutex poisoned");
        holders[target.index()]
    }
}
