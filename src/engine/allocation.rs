use serde::{Deserialize, Serialize};

use super::schema::{FeatureSchema, FeatureVector};
use super::{ensure_finite, Prediction, Predictor};
use crate::error::ArtifactError;

fn unit_weight() -> f64 {
    1.0
}

fn default_first() -> f64 {
    0.4
}

fn default_last() -> f64 {
    0.4
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSpec {
    pub field: String,
    #[serde(default = "unit_weight")]
    pub weight: f64,
}

/// How credit is split across the active touch-points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Strategy {
    /// Proportional to channel weight times exposure.
    #[default]
    Weighted,
    Equal,
    /// U-shaped: fixed shares for the first and last active channel, the rest split evenly.
    PositionBased {
        #[serde(default = "default_first")]
        first_weight: f64,
        #[serde(default = "default_last")]
        last_weight: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationSpec {
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub strategy: Strategy,
    /// Numeric field scaling the total credit; 1.0 when unset or absent.
    #[serde(default)]
    pub value_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelCredit {
    pub channel: String,
    pub credit: f64,
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    idx: usize,
    weight: f64,
}

/// Rule-based allocation of conversion credit over ordered channels.
#[derive(Debug, Clone)]
pub struct TouchpointAllocation {
    channels: Vec<Channel>,
    strategy: Strategy,
    value_field: Option<usize>,
}

impl TouchpointAllocation {
    pub fn compile(spec: AllocationSpec, schema: &FeatureSchema) -> Result<Self, ArtifactError> {
        if spec.channels.is_empty() {
            return Err(ArtifactError::invalid("allocation model has no channels"));
        }
        if let Strategy::PositionBased {
            first_weight,
            last_weight,
        } = spec.strategy
        {
            ensure_finite(first_weight, "first_weight")?;
            ensure_finite(last_weight, "last_weight")?;
            if first_weight < 0.0 || last_weight < 0.0 || first_weight + last_weight > 1.0 {
                return Err(ArtifactError::invalid(
                    "position_based weights must be non-negative and sum to at most 1",
                ));
            }
        }

        let mut channels = Vec::with_capacity(spec.channels.len());
        for channel in spec.channels {
            ensure_finite(channel.weight, &format!("weight for channel '{}'", channel.field))?;
            if channel.weight < 0.0 {
                return Err(ArtifactError::invalid(format!(
                    "channel '{}' has a negative weight",
                    channel.field
                )));
            }
            if channels.iter().any(|c: &Channel| c.name == channel.field) {
                return Err(ArtifactError::invalid(format!(
                    "channel '{}' listed twice",
                    channel.field
                )));
            }
            channels.push(Channel {
                idx: schema.require(&channel.field, true, "channel")?,
                name: channel.field,
                weight: channel.weight,
            });
        }

        let value_field = spec
            .value_field
            .as_deref()
            .map(|name| schema.require(name, true, "value_field"))
            .transpose()?;

        Ok(Self {
            channels,
            strategy: spec.strategy,
            value_field,
        })
    }

    fn raw_shares(&self, exposure: &[f64]) -> Vec<f64> {
        let active: Vec<usize> = (0..exposure.len()).filter(|&i| exposure[i] > 0.0).collect();
        let mut raw = vec![0.0; exposure.len()];

        match self.strategy {
            Strategy::Weighted => {
                for &i in &active {
                    raw[i] = self.channels[i].weight * exposure[i];
                }
            }
            Strategy::Equal => {
                for &i in &active {
                    raw[i] = 1.0;
                }
            }
            Strategy::PositionBased {
                first_weight,
                last_weight,
            } => match active.as_slice() {
                [] => {}
                [only] => raw[*only] = 1.0,
                [first, last] => {
                    raw[*first] = first_weight;
                    raw[*last] = last_weight;
                }
                [first, middle @ .., last] => {
                    raw[*first] = first_weight;
                    raw[*last] = last_weight;
                    let share = (1.0 - first_weight - last_weight) / middle.len() as f64;
                    for &i in middle {
                        raw[i] = share;
                    }
                }
            },
        }
        raw
    }
}

impl Predictor for TouchpointAllocation {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, String> {
        let exposure: Vec<f64> = self
            .channels
            .iter()
            .map(|c| features.number(c.idx).unwrap_or(0.0))
            .collect();
        let total = self
            .value_field
            .and_then(|idx| features.number(idx))
            .unwrap_or(1.0);

        let raw = self.raw_shares(&exposure);
        let mass: f64 = raw.iter().sum();

        let credits = self
            .channels
            .iter()
            .zip(&raw)
            .map(|(channel, share)| ChannelCredit {
                channel: channel.name.clone(),
                credit: if mass > 0.0 { share / mass * total } else { 0.0 },
            })
            .collect();

        Ok(Prediction::Attribution { total, credits })
    }
}
