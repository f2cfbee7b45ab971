//! 事件时间线：按发射时刻升序、同刻按插入顺序排列的待发射事件集合。
//!
//! 不变式：每个可激发迁移恰有一个事件（速率为零者除外），不可激发迁移没有事件。
//! 该不变式由 [`EventTimeline::reconcile`] 在初始化后及每次发射后恢复。
use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::Rng;

use crate::net::{Idx, IndexVec, Marking, Net, TransitionId};
use crate::sim::rate::RateEvaluator;
use crate::sim::sampler::DelaySampler;
use crate::sim::SimError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub transition: TransitionId,
    /// 绝对模拟时间。
    pub fire_time: f64,
    /// 预约时使用的速率，之后不再更新。
    pub rate: f64,
    /// 插入序号，用于同刻事件的确定性排序。
    pub seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct EventKey {
    time: f64,
    seq: u64,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

/// 一次 `reconcile` 的变更统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub scheduled: usize,
    pub removed: usize,
    /// 可激发但速率为零（或小到延迟溢出）、因而未预约的迁移数。
    pub zero_rate: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.scheduled == 0 && self.removed == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventTimeline {
    queue: BTreeMap<EventKey, ScheduledEvent>,
    slots: IndexVec<TransitionId, Option<EventKey>>,
    next_seq: u64,
}

impl EventTimeline {
    pub fn new(transitions: usize) -> Self {
        Self {
            queue: BTreeMap::new(),
            slots: IndexVec::from_elem(None, transitions),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_scheduled(&self, transition: TransitionId) -> bool {
        matches!(self.slots.get(transition), Some(Some(_)))
    }

    pub fn get(&self, transition: TransitionId) -> Option<&ScheduledEvent> {
        let key = self.slots.get(transition).copied().flatten()?;
        self.queue.get(&key)
    }

    /// 按发射顺序遍历全部待发射事件。
    pub fn events(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.queue.values()
    }

    pub fn peek_earliest(&self) -> Option<&ScheduledEvent> {
        self.queue.values().next()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    fn ensure_slots(&mut self, transitions: usize) {
        while self.slots.len() < transitions {
            self.slots.push(None);
        }
    }

    pub fn insert(&mut self, transition: TransitionId, fire_time: f64, rate: f64) -> ScheduledEvent {
        self.ensure_slots(transition.index() + 1);
        self.remove(transition);
        let key = EventKey {
            time: fire_time,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let event = ScheduledEvent {
            transition,
            fire_time,
            rate,
            seq: key.seq,
        };
        self.queue.insert(key, event);
        self.slots[transition] = Some(key);
        event
    }

    pub fn remove(&mut self, transition: TransitionId) -> Option<ScheduledEvent> {
        let key = self.slots.get_mut(transition)?.take()?;
        self.queue.remove(&key)
    }

    /// 取出最早事件（同刻取先插入者）。
    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        let (_, event) = self.queue.pop_first()?;
        self.slots[event.transition] = None;
        Some(event)
    }

    /// 使时间线与标识一致：撤销已失去可激发性的事件，为新近可激发的迁移以
    /// `now` 时刻的标识求速率并预约。已预约且仍可激发的事件保持原样，不重抽延迟。
    pub fn reconcile<R: Rng>(
        &mut self,
        net: &Net,
        marking: &Marking,
        now: f64,
        sampler: &mut DelaySampler<R>,
    ) -> Result<ReconcileSummary, SimError> {
        if marking.len() != net.places_len() {
            return Err(SimError::MarkingMismatch {
                expected: net.places_len(),
                found: marking.len(),
            });
        }
        self.ensure_slots(net.transitions_len());
        let evaluator = RateEvaluator::new(net);
        let mut summary = ReconcileSummary::default();

        for (transition, spec) in net.transitions.iter_enumerated() {
            let enabled = net
                .is_enabled(transition, marking)
                .map_err(|source| SimError::Expression {
                    transition: spec.name.clone(),
                    source,
                })?;

            if self.is_scheduled(transition) {
                if !enabled {
                    self.remove(transition);
                    summary.removed += 1;
                    log::trace!("t={:.6} unschedule {} (disabled)", now, spec.name);
                }
                continue;
            }
            if !enabled {
                continue;
            }

            let rate = evaluator.evaluate(transition, marking)?;
            if rate == 0.0 {
                summary.zero_rate += 1;
                continue;
            }
            // 速率过小、发射时刻不可表示时与零速率同样处理。
            let fire_time = match sampler.sample(rate) {
                Ok(delay) if (now + delay).is_finite() => now + delay,
                Ok(_) | Err(SimError::DegenerateRate(_)) => {
                    summary.zero_rate += 1;
                    log::trace!("t={:.6} rate {} of {} too small to schedule", now, rate, spec.name);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let event = self.insert(transition, fire_time, rate);
            summary.scheduled += 1;
            log::trace!(
                "t={:.6} schedule {} at {:.6} (rate {})",
                now,
                spec.name,
                event.fire_time,
                rate
            );
        }

        Ok(summary)
    }
}
