use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rgba::Rgba;

/// Enum representing the available activation function types.
///
/// The discriminants are shared with the GPU shader, keep them in sync with
/// `propagation.wgsl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActivationType {
    ELU = 0,
    LReLU = 1,
    PReLU = 2,
    ReLU = 3,
    Sigmoid = 4,
    Tanh = 5,
}

impl ActivationType {
    pub const ALL: [ActivationType; 6] = [
        ActivationType::ELU,
        ActivationType::LReLU,
        ActivationType::PReLU,
        ActivationType::ReLU,
        ActivationType::Sigmoid,
        ActivationType::Tanh,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::ELU => "ELU",
            ActivationType::LReLU => "LReLU",
            ActivationType::PReLU => "PReLU",
            ActivationType::ReLU => "ReLU",
            ActivationType::Sigmoid => "Sigmoid",
            ActivationType::Tanh => "Tanh",
        }
    }

    pub fn index(&self) -> u32 {
        *self as u32
    }

    /// Binds the selector to its alpha, giving the matched function/derivative pair.
    pub fn with_alpha(self, alpha: f32) -> Activation {
        Activation { kind: self, alpha }
    }

    /// Applies the activation function to a single channel
    pub fn apply(&self, x: f32, alpha: f32) -> f32 {
        match self {
            ActivationType::ELU => {
                if x >= 0.0 {
                    x
                } else {
                    alpha * (x.exp() - 1.0)
                }
            }
            ActivationType::LReLU => {
                if x > 0.0 {
                    x
                } else {
                    0.01 * x
                }
            }
            ActivationType::PReLU => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            ActivationType::ReLU => x.max(0.0),
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            // shifted to the [0, 1] pixel range
            ActivationType::Tanh => x.tanh() / 2.0 + 0.5,
        }
    }

    /// Computes the derivative of the activation function for a single channel
    pub fn derivative(&self, x: f32, alpha: f32) -> f32 {
        match self {
            ActivationType::ELU => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
            ActivationType::LReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.01
                }
            }
            ActivationType::PReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            ActivationType::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationType::Sigmoid => {
                let sigmoid = self.apply(x, alpha);
                sigmoid * (1.0 - sigmoid)
            }
            ActivationType::Tanh => {
                let tanh = self.apply(x, alpha);
                1.0 - tanh * tanh
            }
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ActivationType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnsupportedActivation(s.to_string()))
    }
}

impl TryFrom<String> for ActivationType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl TryFrom<u32> for ActivationType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        ActivationType::ALL
            .into_iter()
            .find(|kind| kind.index() == value)
            .ok_or_else(|| Error::UnsupportedActivation(value.to_string()))
    }
}

impl From<ActivationType> for String {
    fn from(value: ActivationType) -> Self {
        value.name().to_string()
    }
}

/// An activation selector bound to its alpha parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub kind: ActivationType,
    pub alpha: f32,
}

impl Activation {
    pub fn apply(&self, value: Rgba) -> Rgba {
        value.map(|x| self.kind.apply(x, self.alpha))
    }

    pub fn derivative(&self, value: Rgba) -> Rgba {
        value.map(|x| self.kind.derivative(x, self.alpha))
    }
}
