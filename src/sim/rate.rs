//! 速率求值：只对可激发迁移求值，并拒绝负数与非有限值。
use crate::net::{Net, Marking, TransitionId};
use crate::sim::{RateViolation, SimError};

#[derive(Debug, Clone, Copy)]
pub struct RateEvaluator<'net> {
    net: &'net Net,
}

impl<'net> RateEvaluator<'net> {
    pub fn new(net: &'net Net) -> Self {
        Self { net }
    }

    /// 返回有限且非负的速率；迁移不可激发时视为调用方错误。
    pub fn evaluate(&self, transition: TransitionId, marking: &Marking) -> Result<f64, SimError> {
        let name = || {
            self.net
                .get_transition(transition)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| format!("{:?}", transition))
        };
        let enabled = self
            .net
            .is_enabled(transition, marking)
            .map_err(|source| SimError::Expression {
                transition: name(),
                source,
            })?;
        if !enabled {
            return Err(SimError::InvalidRate {
                transition: name(),
                violation: RateViolation::NotEnabled,
            });
        }

        let rate = self
            .net
            .raw_rate(transition, marking)
            .map_err(|source| SimError::Expression {
                transition: name(),
                source,
            })?;
        let violation = if !rate.is_finite() {
            Some(RateViolation::NonFinite(rate))
        } else if rate < 0.0 {
            Some(RateViolation::Negative(rate))
        } else {
            None
        };
        match violation {
            Some(violation) => Err(SimError::InvalidRate {
                transition: name(),
                violation,
            }),
            None => Ok(rate),
        }
    }
}
