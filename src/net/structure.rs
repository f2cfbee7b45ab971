//! 随机 Petri 网静态结构元素：库所、迁移与标识。
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::expr::Expr;
use crate::net::ids::PlaceId;
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    /// 初始标识中的托肯数。
    pub tokens: Weight,
}

impl Place {
    pub fn new(name: impl Into<String>, tokens: Weight) -> Self {
        Self {
            name: name.into(),
            tokens,
        }
    }
}

/// 随机迁移：可选守卫、速率表达式。
///
/// 守卫缺省时，迁移按经典 P/T 语义判定可激发（每个输入库所的托肯数不少于弧权重）。
/// 显式守卫则完全取代该判定，此时守卫与弧权重不一致会在发射时以
/// [`FireError::Malformed`](crate::net::FireError::Malformed) 报告。
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub name: String,
    pub guard: Option<Expr>,
    pub rate: Expr,
}

impl Transition {
    pub fn new(name: impl Into<String>, rate: Expr) -> Self {
        Self {
            name: name.into(),
            guard: None,
            rate,
        }
    }

    pub fn with_guard(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

/// 标识：每个库所当前的托肯数。`clone` 即深拷贝，记录快照直接依赖这一点。
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Marking(pub IndexVec<PlaceId, Weight>);

impl Marking {
    pub fn new(initial: IndexVec<PlaceId, Weight>) -> Self {
        Self(initial)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Weight)> {
        self.0.iter_enumerated()
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0[place]
    }

    /// 越界时返回 `None`，用于标识长度未经校验的调用方。
    pub fn get(&self, place: PlaceId) -> Option<Weight> {
        self.0.get(place).copied()
    }

    pub fn tokens_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place]
    }

    pub fn as_slice(&self) -> &[Weight] {
        self.0.as_slice()
    }
}

impl From<Vec<Weight>> for Marking {
    fn from(value: Vec<Weight>) -> Self {
        Self(IndexVec::from(value))
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter() {
            map.entry(&place, tokens);
        }
        map.finish()
    }
}
