//! Projection command descriptors.
//!
//! A descriptor has the shape `operator[:strength]:axis:thickness:increment`,
//! for example `mip:2:10:5` or `softmip:0.01:2:10:5`. Thickness and increment
//! are physical distances (millimetres for DICOM input).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::reduction::ReductionOperator;

pub const MIP: &str = "mip";
pub const SOFT_MIP: &str = "softmip";

const SEPARATOR: char = ':';

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("Unknown projection: {0}")]
    UnknownOperator(String),

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {token}")]
    InvalidNumber { field: &'static str, token: String },

    #[error("Unexpected trailing token: {0}")]
    TrailingToken(String),
}

/// One projection request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionCommand {
    pub operator: ReductionOperator,
    /// Volume axis to project along (0 = x, 1 = y, 2 = z).
    pub axis: usize,
    /// Physical slab thickness.
    pub thickness: f64,
    /// Physical distance between consecutive slabs.
    pub increment: f64,
}

impl ProjectionCommand {
    pub fn new(operator: ReductionOperator, axis: usize, thickness: f64, increment: f64) -> Self {
        Self {
            operator,
            axis,
            thickness,
            increment,
        }
    }
}

fn next_field<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<&'a str, CommandParseError> {
    tokens.next().ok_or(CommandParseError::MissingField(field))
}

fn parse_field<'a, T: FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<T, CommandParseError> {
    let token = next_field(tokens, field)?;
    token
        .trim()
        .parse()
        .map_err(|_| CommandParseError::InvalidNumber {
            field,
            token: token.to_string(),
        })
}

impl FromStr for ProjectionCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split(SEPARATOR);
        let operator = match next_field(&mut tokens, "projection")?.trim() {
            MIP => ReductionOperator::Maximum,
            SOFT_MIP => ReductionOperator::soft_maximum(parse_field(&mut tokens, "strength")?),
            other => return Err(CommandParseError::UnknownOperator(other.to_string())),
        };
        let axis = parse_field(&mut tokens, "axis")?;
        let thickness = parse_field(&mut tokens, "thickness")?;
        let increment = parse_field(&mut tokens, "increment")?;
        if let Some(extra) = tokens.next() {
            return Err(CommandParseError::TrailingToken(extra.to_string()));
        }
        Ok(Self::new(operator, axis, thickness, increment))
    }
}

/// Renders the descriptor form of the command.
///
/// Only `mip` and `softmip` commands parse back; [`ReductionOperator::Average`]
/// is library API and renders as `average`, which the parser rejects.
impl fmt::Display for ProjectionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            ReductionOperator::Maximum => write!(f, "{MIP}")?,
            ReductionOperator::SoftMaximum { strength } => write!(f, "{SOFT_MIP}:{strength}")?,
            ReductionOperator::Average => write!(f, "average")?,
        }
        write!(
            f,
            ":{}:{}:{}",
            self.axis, self.thickness, self.increment
        )
    }
}
