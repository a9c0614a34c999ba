use std::time::Duration;

use mpi_config::Transport;
use topology::{Role, TopologyError, TopologyPlan};

use crate::{ReduceConfig, ReduceError, ReduceResult};

/// One worker's handle on the reduction.
///
/// Every worker of a world must issue its calls in the same order: the n-th call on each endpoint
/// uses the same message tag, which keeps values of different calls apart. The tag comes from the
/// endpoint, so a new `Reducer` on an endpoint that already took part in calls stays in step.
#[derive(Debug)]
pub struct Reducer<T: Transport> {
    transport: T,
    config: ReduceConfig,
    // plan of the last coordinator we reduced to
    plan: Option<TopologyPlan>,
}

impl<T: Transport> Reducer<T> {
    #[inline]
    pub fn new(transport: T, config: ReduceConfig) -> Self {
        Self {
            transport,
            config,
            plan: None,
        }
    }

    #[inline(always)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline(always)]
    pub fn config(&self) -> &ReduceConfig {
        &self.config
    }

    #[inline]
    pub fn into_transport(self) -> T {
        self.transport
    }

    #[inline(always)]
    pub fn world_rank(&self) -> usize {
        self.transport.world_rank()
    }

    #[inline(always)]
    pub fn world_size(&self) -> usize {
        self.transport.world_size()
    }

    /// Plan used by the most recent call, if any
    #[inline]
    pub fn cached_plan(&self) -> Option<&TopologyPlan> {
        self.plan.as_ref()
    }

    /// Sum `local` over all workers at the configured coordinator.
    #[inline]
    pub fn reduce(&mut self, local: f64) -> ReduceResult<Option<f64>> {
        self.reduce_to(local, self.config.coordinator)
    }

    /// Sum `local` over all workers at `coordinator`.
    /// Returns `Some(sum)` at the coordinator and `None` everywhere else.
    pub fn reduce_to(&mut self, local: f64, coordinator: usize) -> ReduceResult<Option<f64>> {
        if self.transport.is_single_process() && coordinator == 0 {
            // nobody to talk to, and no tag to spend
            return Ok(Some(local));
        }

        let plan = match self.plan.take() {
            Some(plan) if plan.coordinator() == coordinator => plan,
            _ => {
                let plan = topology::plan(self.world_rank(), self.world_size(), coordinator)?;
                log::debug!(
                    "rank {}: new plan with {} rounds towards {}",
                    plan.rank(),
                    plan.num_rounds(),
                    coordinator
                );
                plan
            }
        };

        let tag = self.transport.next_call_tag();
        let result = run_plan(&self.transport, self.config.timeout, tag, local, &plan);
        self.plan = Some(plan);
        result
    }

    /// Run an explicitly supplied plan. The plan is checked against this worker before anything
    /// is sent.
    pub fn reduce_with_plan(
        &mut self,
        local: f64,
        plan: &TopologyPlan,
    ) -> ReduceResult<Option<f64>> {
        if plan.rank() != self.world_rank() || plan.world_size() != self.world_size() {
            return Err(TopologyError::InvalidTopology {
                rank: plan.rank(),
                size: plan.world_size(),
                coordinator: plan.coordinator(),
                reason: format!(
                    "plan does not belong to rank {} of {}",
                    self.world_rank(),
                    self.world_size()
                ),
            }
            .into());
        }
        plan.validate()?;

        let tag = self.transport.next_call_tag();
        run_plan(&self.transport, self.config.timeout, tag, local, plan)
    }
}

/// Walk `plan` round by round. The plan must have been validated.
fn run_plan<T: Transport>(
    transport: &T,
    timeout: Duration,
    tag: u64,
    local: f64,
    plan: &TopologyPlan,
) -> ReduceResult<Option<f64>> {
    let mut acc = local;

    for step in plan.steps() {
        match (step.role, step.partner) {
            (Role::Sender, Some(partner)) => {
                log::trace!(
                    "rank {} round {}: send {} to {}",
                    plan.rank(),
                    step.round,
                    acc,
                    partner
                );
                transport
                    .send(partner, tag, acc)
                    .map_err(|e| ReduceError::in_round(e, step.round, partner))?;
                // our value now lives in the partner's accumulator
                return Ok(None);
            }
            (Role::Receiver, Some(partner)) => {
                let value = transport.receive(partner, tag, timeout).map_err(|e| {
                    log::warn!(
                        "rank {} round {}: no value from {}: {}",
                        plan.rank(),
                        step.round,
                        partner,
                        e
                    );
                    ReduceError::in_round(e, step.round, partner)
                })?;
                log::trace!(
                    "rank {} round {}: fold {} from {}",
                    plan.rank(),
                    step.round,
                    value,
                    partner
                );
                acc += value;
            }
            _ => {}
        }
    }

    if plan.is_coordinator() {
        Ok(Some(acc))
    } else {
        Ok(None)
    }
}
