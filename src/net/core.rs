//! 网结构与运行时语义：可激发判定、速率求值、原子发射与连通性诊断。
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use itertools::Itertools;
use smallvec::SmallVec;
use thiserror::Error;

use crate::net::expr::ExprError;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::{Incidence, weight_change};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Marking, Place, Transition, Weight};

/// 迁移发射后各库所的托肯变化（仅非零项）。
pub type Delta = SmallVec<[(PlaceId, i64); 4]>;

#[derive(Debug, Error, PartialEq)]
pub enum FireError {
    #[error("transition {0:?} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error(
        "firing {transition:?} would drive place {place:?} negative: {tokens} tokens, {required} required"
    )]
    Malformed {
        transition: TransitionId,
        place: PlaceId,
        tokens: Weight,
        required: Weight,
    },
    #[error("token count overflow at place {place:?} when firing {transition:?}")]
    Overflow {
        transition: TransitionId,
        place: PlaceId,
    },
    #[error("marking has {found} places, net has {expected}")]
    MarkingMismatch { expected: usize, found: usize },
}

/// Petri 网连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<(PlaceId, String)>,
    /// 孤立迁移（无任何连接的弧）
    pub isolated_transitions: Vec<(TransitionId, String)>,
    /// 速率读取了其他迁移会改变的库所，调度后速率可能过时
    pub stale_rate_dependencies: Vec<(TransitionId, PlaceId)>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} places, {} transitions",
            self.total_places, self.total_transitions
        )?;
        if !self.isolated_places.is_empty() {
            writeln!(
                f,
                "isolated places: {}",
                self.isolated_places
                    .iter()
                    .map(|(id, name)| format!("[{}] {}", id.index(), name))
                    .join(", ")
            )?;
        }
        if !self.isolated_transitions.is_empty() {
            writeln!(
                f,
                "isolated transitions: {}",
                self.isolated_transitions
                    .iter()
                    .map(|(id, name)| format!("[{}] {}", id.index(), name))
                    .join(", ")
            )?;
        }
        for (transition, place) in &self.stale_rate_dependencies {
            writeln!(
                f,
                "rate of {:?} reads {:?}, which other transitions modify",
                transition, place
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        Ok(())
    }
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Net {
    pub places: IndexVec<PlaceId, Place>,
    pub transitions: IndexVec<TransitionId, Transition>,
    pub pre: Incidence<u64>,
    pub post: Incidence<u64>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .finish()
    }
}

impl Net {
    pub fn empty() -> Self {
        Self {
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            pre: Incidence::new(0, 0, 0u64),
            post: Incidence::new(0, 0, 0u64),
        }
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let place_id = self.places.push(place);
        self.pre.push_place_with_default(0);
        self.post.push_place_with_default(0);
        place_id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let transition_id = self.transitions.push(transition);
        self.pre.push_transition_with_default(0);
        self.post.push_transition_with_default(0);
        transition_id
    }

    pub fn set_input_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.pre.set(place, transition, weight);
    }

    pub fn set_output_weight(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        self.post.set(place, transition, weight);
    }

    /// 输入弧: place -> transition
    pub fn add_input_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        if weight == 0 {
            return;
        }
        *self.pre.get_mut(place, transition) += weight;
    }

    /// 输出弧: transition -> place
    pub fn add_output_arc(&mut self, place: PlaceId, transition: TransitionId, weight: Weight) {
        if weight == 0 {
            return;
        }
        *self.post.get_mut(place, transition) += weight;
    }

    pub fn get_place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn get_transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn place_by_name(&self, name: &str) -> Option<PlaceId> {
        self.places
            .iter_enumerated()
            .find(|(_, place)| place.name == name)
            .map(|(id, _)| id)
    }

    pub fn transition_by_name(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter_enumerated()
            .find(|(_, transition)| transition.name == name)
            .map(|(id, _)| id)
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn initial_marking(&self) -> Marking {
        Marking(self.places.iter().map(|p| p.tokens).collect())
    }

    pub fn c_matrix(&self) -> Incidence<i64> {
        self.post.difference(&self.pre)
    }

    /// 发射 `transition` 造成的托肯变化 `Post[:, t] - Pre[:, t]`，只含相邻库所。
    ///
    /// 超出 `i64` 的差值会被截断到边界；经 [`crate::net::definition`] 构建的网不会出现这种权重。
    pub fn delta(&self, transition: TransitionId) -> Delta {
        self.pre
            .column(transition)
            .zip(self.post.column(transition))
            .filter_map(|((place, pre), (_, post))| {
                let change = weight_change(*pre, *post);
                (change != 0).then_some((place, change))
            })
            .collect()
    }

    /// 可激发判定：有守卫时以守卫为准，否则要求每个输入库所满足弧权重。
    pub fn is_enabled(&self, transition: TransitionId, marking: &Marking) -> Result<bool, ExprError> {
        let Some(spec) = self.transitions.get(transition) else {
            return Ok(false);
        };
        match &spec.guard {
            Some(guard) => guard.eval_bool(marking),
            None => {
                for (place, weight) in self.pre.column(transition) {
                    let tokens = marking.get(place).ok_or(ExprError::UnknownPlace(place))?;
                    if tokens < *weight {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    pub fn enabled_transitions(&self, marking: &Marking) -> Result<Vec<TransitionId>, ExprError> {
        let mut enabled = Vec::new();
        for transition in self.transitions.indices() {
            if self.is_enabled(transition, marking)? {
                enabled.push(transition);
            }
        }
        Ok(enabled)
    }

    /// 原始速率值，不做合法性检查；调度时应经过 [`crate::sim::rate::RateEvaluator`]。
    pub fn raw_rate(&self, transition: TransitionId, marking: &Marking) -> Result<f64, ExprError> {
        match self.transitions.get(transition) {
            Some(spec) => spec.rate.eval_number(marking),
            None => Ok(0.0),
        }
    }

    /// 原地发射：先校验全部相邻库所，再统一写回；失败时标识保持不变。
    ///
    /// 效应按 `i128` 计算，任意 `u64` 弧权重都不会在中间步骤溢出。
    pub fn fire_in_place(
        &self,
        marking: &mut Marking,
        transition: TransitionId,
    ) -> Result<(), FireError> {
        if transition.index() >= self.transitions_len() {
            return Err(FireError::OutOfBounds(transition));
        }
        if marking.len() != self.places_len() {
            return Err(FireError::MarkingMismatch {
                expected: self.places_len(),
                found: marking.len(),
            });
        }

        let mut staged: SmallVec<[(PlaceId, Weight); 4]> = SmallVec::new();
        for ((place, pre), (_, post)) in self
            .pre
            .column(transition)
            .zip(self.post.column(transition))
        {
            if pre == post {
                continue;
            }
            let tokens = marking.tokens(place);
            let after = i128::from(tokens) + i128::from(*post) - i128::from(*pre);
            if after < 0 {
                return Err(FireError::Malformed {
                    transition,
                    place,
                    tokens,
                    required: *pre - *post,
                });
            }
            let after =
                Weight::try_from(after).map_err(|_| FireError::Overflow { transition, place })?;
            staged.push((place, after));
        }

        for (place, after) in staged {
            *marking.tokens_mut(place) = after;
        }
        Ok(())
    }

    pub fn fire_transition(
        &self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Marking, FireError> {
        let mut next = marking.clone();
        self.fire_in_place(&mut next, transition)?;
        Ok(next)
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (place_id, place) in self.places.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\\n{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
                place_id.index(),
                escape_label(&place.name),
                place.tokens
            );
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\\nλ = {}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                transition_id.index(),
                escape_label(&transition.name),
                escape_label(&transition.rate.to_string())
            );
        }

        for (place_id, row) in self.pre.rows().iter_enumerated() {
            for (idx, weight) in row.iter().enumerate().filter(|(_, w)| **w > 0) {
                write_arc(
                    &mut dot,
                    &format!("place_{}", place_id.index()),
                    &format!("trans_{}", idx),
                    *weight,
                );
            }
        }

        for (place_id, row) in self.post.rows().iter_enumerated() {
            for (idx, weight) in row.iter().enumerate().filter(|(_, w)| **w > 0) {
                write_arc(
                    &mut dot,
                    &format!("trans_{}", idx),
                    &format!("place_{}", place_id.index()),
                    *weight,
                );
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }

    /// 诊断：孤立节点、永不可激发的迁移，以及读取被其他迁移修改的库所的速率。
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            total_places: self.places_len(),
            total_transitions: self.transitions_len(),
            ..DiagnosticReport::default()
        };

        for (place_id, place) in self.places.iter_enumerated() {
            let consumed = self.pre.rows()[place_id].iter().any(|w| *w > 0);
            let produced = self.post.rows()[place_id].iter().any(|w| *w > 0);
            if !consumed && !produced {
                report.isolated_places.push((place_id, place.name.clone()));
            }
        }

        let deltas: IndexVec<TransitionId, Delta> =
            self.transitions.indices().map(|t| self.delta(t)).collect();

        for (trans_id, trans) in self.transitions.iter_enumerated() {
            let has_preset = self.pre.column(trans_id).any(|(_, w)| *w > 0);
            let has_postset = self.post.column(trans_id).any(|(_, w)| *w > 0);
            if !has_preset && !has_postset {
                report
                    .isolated_transitions
                    .push((trans_id, trans.name.clone()));
            } else if !has_preset && trans.guard.is_none() {
                report.warnings.push(format!(
                    "transition '{}' ({:?}) has no input arcs and no guard; it never disables",
                    trans.name, trans_id
                ));
            }

            for place in trans.rate.places() {
                let modified_elsewhere = deltas
                    .iter_enumerated()
                    .any(|(other, delta)| other != trans_id && delta.iter().any(|(p, _)| *p == place));
                if modified_elsewhere {
                    report.stale_rate_dependencies.push((trans_id, place));
                }
            }
        }

        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if report.has_issues() {
            for line in report.to_string().lines() {
                log::warn!("{}", line);
            }
        } else {
            log::info!(
                "net connectivity ok: {} places, {} transitions",
                report.total_places,
                report.total_transitions
            );
        }
        for (transition, place) in &report.stale_rate_dependencies {
            log::debug!(
                "rate of {:?} depends on {:?}; sampled delays may be stale after other firings",
                transition,
                place
            );
        }
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}

fn write_arc(dot: &mut String, from: &str, to: &str, weight: Weight) {
    if weight == 1 {
        let _ = writeln!(dot, "    {} -> {};", from, to);
    } else {
        let _ = writeln!(dot, "    {} -> {} [label=\"{}\"];", from, to, weight);
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
