use std::fmt;

use serde::{Deserialize, Serialize};

/// The two output branches sharing the convolutional trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Head {
    /// Category prediction through the softmax branch
    Classification,
    /// Box prediction through the fully-connected regression branch
    Regression,
}

impl Head {
    pub const ALL: [Head; 2] = [Head::Classification, Head::Regression];

    pub fn as_str(&self) -> &'static str {
        match self {
            Head::Classification => "classification",
            Head::Regression => "regression",
        }
    }

    /// Tag under which the head's loss is summarised.
    pub fn loss_name(&self) -> &'static str {
        match self {
            Head::Classification => "cat_loss",
            Head::Regression => "reg_loss",
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
