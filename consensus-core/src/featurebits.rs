//! Featurebit / deployment (spec.md §4.7): window-counted signaling and the
//! Defined → Started → LockedIn → Active / Failed state machine.
//!
//! No teacher counterpart exists (`bond-core` has no deployment machinery at
//! all). Modeled as a tagged union over `DeploymentState`, in the closed-
//! dispatch style spec.md §9 asks every sum type in this crate to follow.

use serde::{Deserialize, Serialize};

/// A single feature deployment (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    /// Signaling bit, 0..28 per spec.md §3.
    pub bit: u8,
    pub start_height: u64,
    pub timeout_height: u64,
    pub signal_window_len: u64,
    pub signal_threshold: u64,
}

impl Deployment {
    /// `window_len` must be nonzero and `bit` must fit the reserved range
    /// (spec.md §3: `bit ∈ 0..28`).
    pub fn validate(&self) -> Result<(), String> {
        if self.signal_window_len == 0 {
            return Err("signal_window_len must be nonzero".to_string());
        }
        if self.bit > 28 {
            return Err(format!("bit {} exceeds the reserved 0..28 range", self.bit));
        }
        if self.timeout_height <= self.start_height {
            return Err("timeout_height must be past start_height".to_string());
        }
        Ok(())
    }

    /// Index of the window containing `height`, windows partitioned from
    /// genesis in fixed `signal_window_len`-block chunks.
    #[must_use]
    pub fn window_index(&self, height: u64) -> u64 {
        height / self.signal_window_len
    }

    /// Height at which window `window_index` closes (its last block).
    #[must_use]
    pub fn window_boundary_height(&self, window_index: u64) -> u64 {
        (window_index + 1) * self.signal_window_len - 1
    }

    /// Index of the most recently *closed* window as of `height`.
    #[must_use]
    fn last_closed_window(&self, height: u64) -> Option<u64> {
        let current = self.window_index(height);
        if self.window_boundary_height(current) == height {
            Some(current)
        } else {
            current.checked_sub(1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub state: DeploymentState,
    /// Height of the last fully closed window as of the query height.
    pub boundary_height: u64,
    /// Signal count of that window (spec.md §4.7 "previous window's signal count").
    pub previous_window_signal_count: u64,
    /// `LockedIn boundary + signal_window_len`, once known.
    pub estimated_activation_height: Option<u64>,
}

/// Evaluates `deployment`'s state at `height`, given the signal count of
/// every window that has closed so far (`closed_window_counts[i]` is window
/// `i`'s count; indices beyond the last closed window are ignored).
///
/// Spec.md §4.7: Defined while `h < start_height`; Started once past start;
/// LockedIn when any window from start onward reaches `signal_threshold`;
/// Active exactly `signal_window_len` blocks after the LockedIn boundary;
/// Failed at `timeout_height` if never locked in.
#[must_use]
pub fn evaluate_deployment(
    deployment: &Deployment,
    height: u64,
    closed_window_counts: &[u64],
) -> DeploymentStatus {
    let last_closed = deployment.last_closed_window(height);
    let boundary_height = last_closed
        .map(|w| deployment.window_boundary_height(w))
        .unwrap_or(0);
    let previous_window_signal_count = last_closed
        .and_then(|w| closed_window_counts.get(w as usize))
        .copied()
        .unwrap_or(0);

    if height < deployment.start_height {
        return DeploymentStatus {
            state: DeploymentState::Defined,
            boundary_height,
            previous_window_signal_count,
            estimated_activation_height: None,
        };
    }

    let start_window = deployment.window_index(deployment.start_height);
    let locked_in_window = last_closed.and_then(|last| {
        (start_window..=last).find(|&idx| {
            closed_window_counts
                .get(idx as usize)
                .is_some_and(|&count| count >= deployment.signal_threshold)
        })
    });

    if let Some(window_idx) = locked_in_window {
        let locked_in_boundary = deployment.window_boundary_height(window_idx);
        let active_height = locked_in_boundary + deployment.signal_window_len;
        let state = if height >= active_height {
            DeploymentState::Active
        } else {
            DeploymentState::LockedIn
        };
        return DeploymentStatus {
            state,
            boundary_height,
            previous_window_signal_count,
            estimated_activation_height: Some(active_height),
        };
    }

    if height >= deployment.timeout_height {
        return DeploymentStatus {
            state: DeploymentState::Failed,
            boundary_height,
            previous_window_signal_count,
            estimated_activation_height: None,
        };
    }

    DeploymentStatus {
        state: DeploymentState::Started,
        boundary_height,
        previous_window_signal_count,
        estimated_activation_height: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Deployment {
        Deployment {
            name: "test-bit".to_string(),
            bit: 1,
            start_height: 100,
            timeout_height: 1000,
            signal_window_len: 100,
            signal_threshold: 80,
        }
    }

    #[test]
    fn defined_before_start_height() {
        let deployment = sample();
        let status = evaluate_deployment(&deployment, 50, &[]);
        assert_eq!(status.state, DeploymentState::Defined);
    }

    #[test]
    fn started_once_past_start_without_signal() {
        let deployment = sample();
        let counts = vec![0, 0, 10];
        let status = evaluate_deployment(&deployment, 250, &counts);
        assert_eq!(status.state, DeploymentState::Started);
    }

    #[test]
    fn locked_in_once_a_window_clears_threshold() {
        let deployment = sample();
        // window 1 covers heights [100, 199], reaches threshold.
        let counts = vec![0, 90];
        let status = evaluate_deployment(&deployment, 199, &counts);
        assert_eq!(status.state, DeploymentState::LockedIn);
        assert_eq!(status.estimated_activation_height, Some(299));
    }

    #[test]
    fn active_exactly_one_window_after_lock_in_boundary() {
        let deployment = sample();
        let counts = vec![0, 90];
        let status = evaluate_deployment(&deployment, 299, &counts);
        assert_eq!(status.state, DeploymentState::Active);
    }

    #[test]
    fn failed_at_timeout_without_lock_in() {
        let deployment = sample();
        let counts = vec![0u64; 10];
        let status = evaluate_deployment(&deployment, 1000, &counts);
        assert_eq!(status.state, DeploymentState::Failed);
    }

    #[test]
    fn invalid_bit_rejected() {
        let mut deployment = sample();
        deployment.bit = 29;
        assert!(deployment.validate().is_err());
    }
}
