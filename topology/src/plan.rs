use std::fmt::{self, Display};

use crate::{TopologyError, TopologyResult};

/// What a worker does in one round of the reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Hand the current accumulator to the partner, then drop out.
    Sender,
    /// Wait for the partner's accumulator and fold it into ours.
    Receiver,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStep {
    pub round: usize,
    pub role: Role,
    /// real rank of the peer; `None` iff the role is [`Role::Idle`]
    pub partner: Option<usize>,
}

impl RoundStep {
    #[inline]
    pub fn idle(round: usize) -> Self {
        Self {
            round,
            role: Role::Idle,
            partner: None,
        }
    }

    #[inline]
    pub fn send_to(round: usize, partner: usize) -> Self {
        Self {
            round,
            role: Role::Sender,
            partner: Some(partner),
        }
    }

    #[inline]
    pub fn receive_from(round: usize, partner: usize) -> Self {
        Self {
            round,
            role: Role::Receiver,
            partner: Some(partner),
        }
    }
}

/// Number of rounds a binomial-tree reduction over `size` workers takes, i.e. `ceil(log2(size))`.
#[inline]
pub fn num_rounds(size: usize) -> usize {
    if size <= 1 {
        0
    } else {
        size.next_power_of_two().trailing_zeros() as usize
    }
}

/// The per-rank schedule of a binomial-tree reduction rooted at `coordinator`.
///
/// Ranks are relabelled so that the coordinator becomes virtual rank 0. In round `r` a worker
/// whose virtual rank has its lowest set bit at `r` sends to `vrank - 2^r` and retires; a worker
/// still active with bit `r` clear receives from `vrank + 2^r` if that rank exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyPlan {
    rank: usize,
    world_size: usize,
    coordinator: usize,
    steps: Vec<RoundStep>,
}

/// Derive the plan for `rank`. Pure; every rank computes its own without communication.
pub fn plan(rank: usize, size: usize, coordinator: usize) -> TopologyResult<TopologyPlan> {
    if size == 0 {
        return Err(TopologyError::invalid(
            rank,
            size,
            coordinator,
            "world size must be at least 1",
        ));
    }
    if coordinator >= size {
        return Err(TopologyError::invalid(
            rank,
            size,
            coordinator,
            "coordinator out of range",
        ));
    }
    if rank >= size {
        return Err(TopologyError::invalid(
            rank,
            size,
            coordinator,
            "rank out of range",
        ));
    }

    let vrank = (rank + size - coordinator) % size;
    let to_real = |v: usize| (v + coordinator) % size;

    let steps = (0..num_rounds(size))
        .map(|round| {
            let mask = 1usize << round;
            // rounds before the lowest set bit are the only ones in which we are still active
            let active = vrank & (mask - 1) == 0;
            if !active {
                RoundStep::idle(round)
            } else if vrank & mask != 0 {
                RoundStep::send_to(round, to_real(vrank - mask))
            } else if vrank + mask < size {
                RoundStep::receive_from(round, to_real(vrank + mask))
            } else {
                RoundStep::idle(round)
            }
        })
        .collect::<Vec<_>>();

    log::trace!(
        "rank {} (vrank {}) of {}: {} rounds rooted at {}",
        rank,
        vrank,
        size,
        steps.len(),
        coordinator
    );

    Ok(TopologyPlan {
        rank,
        world_size: size,
        coordinator,
        steps,
    })
}

/// Plans of every rank in the world, indexed by rank.
pub fn world_plans(size: usize, coordinator: usize) -> TopologyResult<Vec<TopologyPlan>> {
    if size == 0 {
        return Err(TopologyError::invalid(
            0,
            size,
            coordinator,
            "world size must be at least 1",
        ));
    }
    (0..size).map(|rank| plan(rank, size, coordinator)).collect()
}

impl TopologyPlan {
    /// Assemble a plan from raw steps without checking it.
    /// Call [`TopologyPlan::validate`] before running anything from it.
    #[inline]
    pub fn from_steps(
        rank: usize,
        world_size: usize,
        coordinator: usize,
        steps: Vec<RoundStep>,
    ) -> Self {
        Self {
            rank,
            world_size,
            coordinator,
            steps,
        }
    }

    #[inline(always)]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline(always)]
    pub fn world_size(&self) -> usize {
        self.world_size
    }

    #[inline(always)]
    pub fn coordinator(&self) -> usize {
        self.coordinator
    }

    #[inline(always)]
    pub fn is_coordinator(&self) -> bool {
        self.rank == self.coordinator
    }

    #[inline(always)]
    pub fn steps(&self) -> &[RoundStep] {
        &self.steps
    }

    #[inline(always)]
    pub fn num_rounds(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn step(&self, round: usize) -> Option<&RoundStep> {
        self.steps.get(round)
    }

    /// The round in which this rank hands off its accumulator, `None` for the coordinator
    #[inline]
    pub fn send_round(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.role == Role::Sender)
            .map(|s| s.round)
    }

    /// Partners this rank receives from, in fold order
    pub fn receive_partners(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter(|s| s.role == Role::Receiver)
            .filter_map(|s| s.partner)
            .collect()
    }

    /// Structural sanity check of a plan, typically one built by [`TopologyPlan::from_steps`].
    pub fn validate(&self) -> TopologyResult<()> {
        let err = |reason: String| {
            Err(TopologyError::invalid(
                self.rank,
                self.world_size,
                self.coordinator,
                reason,
            ))
        };

        if self.world_size == 0 {
            return err("world size must be at least 1".to_string());
        }
        if self.coordinator >= self.world_size {
            return err("coordinator out of range".to_string());
        }
        if self.rank >= self.world_size {
            return err("rank out of range".to_string());
        }
        if self.steps.len() != num_rounds(self.world_size) {
            return err(format!(
                "expected {} rounds, found {}",
                num_rounds(self.world_size),
                self.steps.len()
            ));
        }

        let mut retired = false;
        for (i, step) in self.steps.iter().enumerate() {
            if step.round != i {
                return err(format!("step {} is labelled round {}", i, step.round));
            }
            match (step.role, step.partner) {
                (Role::Idle, None) => continue,
                (Role::Idle, Some(p)) => {
                    return err(format!("idle round {} names partner {}", i, p));
                }
                (_, None) => {
                    return err(format!("{:?} in round {} without a partner", step.role, i));
                }
                (_, Some(p)) if p >= self.world_size => {
                    return err(format!("partner {} in round {} out of range", p, i));
                }
                (_, Some(p)) if p == self.rank => {
                    return err(format!("round {} pairs rank with itself", i));
                }
                _ => {}
            }
            if retired {
                return err(format!("{:?} in round {} after sending", step.role, i));
            }
            if step.role == Role::Sender {
                if self.is_coordinator() {
                    return err(format!("coordinator sends in round {}", i));
                }
                retired = true;
            }
        }

        if !self.is_coordinator() && !retired && self.world_size > 1 {
            return err("non-coordinator never sends its value".to_string());
        }
        Ok(())
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "send"),
            Role::Receiver => write!(f, "recv"),
            Role::Idle => write!(f, "idle"),
        }
    }
}

impl Display for TopologyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "rank {}/{} (coordinator {})",
            self.rank, self.world_size, self.coordinator
        )?;
        for step in &self.steps {
            match step.partner {
                Some(p) => writeln!(f, "  round {}: {} {}", step.round, step.role, p)?,
                None => writeln!(f, "  round {}: {}", step.round, step.role)?,
            }
        }
        Ok(())
    }
}
