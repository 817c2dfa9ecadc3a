//! Mutual exclusion between installing and updating.
//!
//! Both write into the install directory, so at most one of them may run.
//! A permit is held for the whole run and released when dropped.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Install,
    Update,
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activity::Install => write!(f, "installation"),
            Activity::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityGate {
    active: Arc<Mutex<Option<Activity>>>,
}

/// Proof that an activity owns the install directory
#[derive(Debug)]
pub struct ActivityPermit {
    gate: ActivityGate,
    activity: Activity,
}

impl ActivityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or report which activity already holds it
    pub fn try_acquire(&self, activity: Activity) -> Result<ActivityPermit, Activity> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = *active {
            return Err(current);
        }
        *active = Some(activity);
        Ok(ActivityPermit {
            gate: self.clone(),
            activity,
        })
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<Activity> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActivityPermit {
    #[cfg(test)]
    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for ActivityPermit {
    fn drop(&mut self) {
        let mut active = self.gate.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active == Some(self.activity) {
            *active = None;
        }
    }
}
