//! 运行记录：每步一条 `(时间, 标识快照)`，只追加。
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::{Marking, Net, PlaceId, Weight};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub time: f64,
    pub marking: Marking,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    entries: Vec<RecordEntry>,
}

impl SimulationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条快照；标识被深拷贝，之后对原标识的修改不影响记录。
    pub fn record(&mut self, time: f64, marking: &Marking) {
        self.entries.push(RecordEntry {
            time,
            marking: marking.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn first(&self) -> Option<&RecordEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&RecordEntry> {
        self.entries.last()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|entry| entry.time)
    }

    pub fn series(&self, place: PlaceId) -> impl Iterator<Item = Weight> + '_ {
        self.entries.iter().map(move |entry| entry.marking.tokens(place))
    }

    /// 转换为按列存储的日志，库所按网中的声明顺序排列。
    pub fn to_log(&self, net: &Net) -> SimulationLog {
        let places = net
            .places
            .iter_enumerated()
            .map(|(id, place)| (place.name.clone(), self.series(id).collect()))
            .collect();
        SimulationLog {
            time: self.times().collect(),
            places,
        }
    }
}

impl<'a> IntoIterator for &'a SimulationRecord {
    type Item = &'a RecordEntry;
    type IntoIter = std::slice::Iter<'a, RecordEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 按列存储的运行日志：`time` 与每个库所的令牌序列等长。
///
/// 序列化为扁平对象 `{"time": [...], "<place>": [...], ...}`。
/// 时间列名保留，[`crate::net::definition::NetDefinition::build`] 拒绝同名库所。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationLog {
    pub time: Vec<f64>,
    #[serde(flatten)]
    pub places: IndexMap<String, Vec<Weight>>,
}

impl SimulationLog {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn series(&self, place: &str) -> Option<&[Weight]> {
        self.places.get(place).map(Vec::as_slice)
    }

    pub fn final_tokens(&self, place: &str) -> Option<Weight> {
        self.places.get(place).and_then(|series| series.last().copied())
    }
}
