//! 网定义文件格式：库所初始托肯、迁移的速率/守卫表达式与弧列表。
//!
//! 守卫缺省时由弧列表推导：输入弧要求托肯不少于权重，读弧要求至少一个托肯。
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::expr::Expr;
use crate::net::ids::PlaceId;
use crate::net::parse::{ParseError, parse_expr};
use crate::net::structure::{Place, Transition, Weight};

/// 运行日志的时间列名，不能用作库所名。
pub const TIME_COLUMN: &str = "time";

/// 弧权重上限：效应列按 `i64` 表示。
pub const MAX_ARC_WEIGHT: Weight = i64::MAX as Weight;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate transition name '{0}'")]
    DuplicateTransition(String),
    #[error("place name '{0}' is reserved for the time column of run logs")]
    ReservedPlaceName(String),
    #[error(
        "arc weight {weight} between transition '{transition}' and place '{place}' exceeds {max}",
        max = MAX_ARC_WEIGHT
    )]
    WeightOutOfRange {
        transition: String,
        place: String,
        weight: Weight,
    },
    #[error("transition '{transition}' references unknown place '{place}'")]
    UnknownPlace { transition: String, place: String },
    #[error("invalid {field} expression for transition '{transition}': {source}")]
    Expression {
        transition: String,
        field: &'static str,
        #[source]
        source: ParseError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetDefinition {
    #[serde(default)]
    pub name: String,
    /// 库所名 -> 初始托肯数，保持声明顺序。
    pub places: IndexMap<String, Weight>,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub name: String,
    pub rate: String,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, Weight>,
    #[serde(default)]
    pub outputs: IndexMap<String, Weight>,
    /// 只参与守卫/速率、不被消耗的库所。
    #[serde(default)]
    pub reads: Vec<String>,
}

impl TransitionDefinition {
    pub fn new(name: impl Into<String>, rate: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rate: rate.into(),
            guard: None,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            reads: Vec::new(),
        }
    }

    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn input(mut self, place: impl Into<String>, weight: Weight) -> Self {
        self.inputs.insert(place.into(), weight);
        self
    }

    pub fn output(mut self, place: impl Into<String>, weight: Weight) -> Self {
        self.outputs.insert(place.into(), weight);
        self
    }

    pub fn read(mut self, place: impl Into<String>) -> Self {
        self.reads.push(place.into());
        self
    }
}

impl NetDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn place(mut self, name: impl Into<String>, tokens: Weight) -> Self {
        self.places.insert(name.into(), tokens);
        self
    }

    pub fn transition(mut self, transition: TransitionDefinition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn build(&self) -> Result<Net, BuildError> {
        let mut net = Net::empty();
        for (name, tokens) in &self.places {
            if name == TIME_COLUMN {
                return Err(BuildError::ReservedPlaceName(name.clone()));
            }
            net.add_place(Place::new(name.clone(), *tokens));
        }
        let lookup = |name: &str| self.places.get_index_of(name).map(|i| PlaceId::new(i as u32));

        for def in &self.transitions {
            if net.transition_by_name(&def.name).is_some() {
                return Err(BuildError::DuplicateTransition(def.name.clone()));
            }
            let resolve_arc = |place: &str| {
                lookup(place).ok_or_else(|| BuildError::UnknownPlace {
                    transition: def.name.clone(),
                    place: place.to_owned(),
                })
            };
            let resolve_weighted =
                |place: &String, weight: &Weight| -> Result<(PlaceId, Weight), BuildError> {
                    let id = resolve_arc(place.as_str())?;
                    if *weight > MAX_ARC_WEIGHT {
                        return Err(BuildError::WeightOutOfRange {
                            transition: def.name.clone(),
                            place: place.clone(),
                            weight: *weight,
                        });
                    }
                    Ok((id, *weight))
                };
            let inputs = def
                .inputs
                .iter()
                .map(|(place, weight)| resolve_weighted(place, weight))
                .collect::<Result<Vec<_>, BuildError>>()?;
            let outputs = def
                .outputs
                .iter()
                .map(|(place, weight)| resolve_weighted(place, weight))
                .collect::<Result<Vec<_>, BuildError>>()?;
            let reads = def
                .reads
                .iter()
                .map(|place| resolve_arc(place.as_str()))
                .collect::<Result<Vec<_>, BuildError>>()?;

            let rate = parse_expr(&def.rate, lookup).map_err(|source| BuildError::Expression {
                transition: def.name.clone(),
                field: "rate",
                source,
            })?;
            let guard = match &def.guard {
                Some(text) => Some(parse_expr(text, lookup).map_err(|source| {
                    BuildError::Expression {
                        transition: def.name.clone(),
                        field: "guard",
                        source,
                    }
                })?),
                None if reads.is_empty() => None,
                None => Some(Expr::all(
                    inputs
                        .iter()
                        .filter(|(_, weight)| *weight > 0)
                        .map(|(place, weight)| Expr::at_least(*place, *weight))
                        .chain(reads.iter().map(|place| Expr::at_least(*place, 1))),
                )),
            };

            let mut transition = Transition::new(def.name.clone(), rate);
            transition.guard = guard;
            let id = net.add_transition(transition);
            for (place, weight) in inputs {
                net.add_input_arc(place, id, weight);
            }
            for (place, weight) in outputs {
                net.add_output_arc(place, id, weight);
            }
        }

        log::debug!(
            "built net '{}': {} places, {} transitions",
            self.name,
            net.places_len(),
            net.transitions_len()
        );
        Ok(net)
    }
}
