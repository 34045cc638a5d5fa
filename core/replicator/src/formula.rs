// SPDX-License-Identifier: MIT
use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;

/// Width of an EVM word in bytes.
pub const WORD: usize = 32;

/// One operation of a replication program.
///
/// Programs run on a stack of byte strings. Widths are fixed: nothing is
/// implicitly padded or truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Push observable `index`, which must be exactly `width` bytes.
    Load { index: usize, width: usize },
    /// Push a 32-byte big-endian constant.
    Word(U256),
    /// uint256 addition modulo 2^256 of two words.
    Add,
    /// keccak-256 of the top value.
    Hash,
    /// Bytewise xor of two values of equal width.
    Xor,
    /// Bytewise or of two values of equal width.
    Or,
    /// Bytes `offset..offset + len` of the top value.
    Slice { offset: usize, len: usize },
    /// Leftmost `n` bytes, as a Solidity `bytesN` cast.
    Head(usize),
    /// Rightmost `n` bytes, as a Solidity `uintN` cast.
    Tail(usize),
    /// Rotate right by a number of bytes.
    RotateRight(usize),
    /// Rotate left by a number of bytes.
    RotateLeft(usize),
    /// Logical right shift by a number of bits within the value's width.
    Shr(u32),
    /// Left shift by a number of bits; bits shifted past the width are dropped.
    Shl(u32),
    /// Duplicate the top value.
    Dup,
    /// Swap the top two values.
    Swap,
}

/// An ordered replication program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    steps: Vec<Step>,
}

impl Formula {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Highest observable index read, plus one.
    pub fn arity(&self) -> usize {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Load { index, .. } => Some(index + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Load { index, width } => write!(f, "load:{index}:{width}"),
            Step::Word(value) => write!(f, "word:0x{value:x}"),
            Step::Add => f.write_str("add"),
            Step::Hash => f.write_str("hash"),
            Step::Xor => f.write_str("xor"),
            Step::Or => f.write_str("or"),
            Step::Slice { offset, len } => write!(f, "slice:{offset}:{len}"),
            Step::Head(n) => write!(f, "head:{n}"),
            Step::Tail(n) => write!(f, "tail:{n}"),
            Step::RotateRight(n) => write!(f, "rotr:{n}"),
            Step::RotateLeft(n) => write!(f, "rotl:{n}"),
            Step::Shr(bits) => write!(f, "shr:{bits}"),
            Step::Shl(bits) => write!(f, "shl:{bits}"),
            Step::Dup => f.write_str("dup"),
            Step::Swap => f.write_str("swap"),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

/// Error type for parsing formula text.
#[derive(Debug, Clone)]
pub struct FormulaParseError {
    pub message: String,
}

impl fmt::Display for FormulaParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid formula: {}", self.message)
    }
}

impl std::error::Error for FormulaParseError {}

impl FromStr for Step {
    type Err = FormulaParseError;

    /// Parse a single step, e.g. `load:0:32`, `word:1`, `head:8`, `rotr:2`.
    ///
    /// `load:N` without a width reads a 32-byte word.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |msg: String| FormulaParseError { message: msg };

        let mut parts = s.trim().split(':');
        let op = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        let arity = |n: usize| -> Result<(), FormulaParseError> {
            if args.len() != n {
                return Err(err(format!("'{op}' takes {n} argument(s), got {}", args.len())));
            }
            Ok(())
        };
        let num = |i: usize| -> Result<usize, FormulaParseError> {
            args[i]
                .trim()
                .parse::<usize>()
                .map_err(|e| err(format!("bad argument '{}' to '{op}': {e}", args[i])))
        };

        let step = match op.as_str() {
            "load" => match args.len() {
                1 => Step::Load {
                    index: num(0)?,
                    width: WORD,
                },
                2 => Step::Load {
                    index: num(0)?,
                    width: num(1)?,
                },
                n => return Err(err(format!("'load' takes 1 or 2 arguments, got {n}"))),
            },
            "word" => {
                arity(1)?;
                let raw = args[0].trim();
                let digits = raw
                    .strip_prefix("0x")
                    .or_else(|| raw.strip_prefix("0X"))
                    .unwrap_or(raw);
                if digits.is_empty() {
                    return Err(err("'word' needs a value".to_string()));
                }
                let value = U256::from_str(raw)
                    .map_err(|e| err(format!("bad word '{}': {e}", args[0])))?;
                Step::Word(value)
            }
            "add" => {
                arity(0)?;
                Step::Add
            }
            "hash" | "keccak" => {
                arity(0)?;
                Step::Hash
            }
            "xor" => {
                arity(0)?;
                Step::Xor
            }
            "or" => {
                arity(0)?;
                Step::Or
            }
            "dup" => {
                arity(0)?;
                Step::Dup
            }
            "swap" => {
                arity(0)?;
                Step::Swap
            }
            "slice" => {
                arity(2)?;
                Step::Slice {
                    offset: num(0)?,
                    len: num(1)?,
                }
            }
            "head" => {
                arity(1)?;
                Step::Head(num(0)?)
            }
            "tail" => {
                arity(1)?;
                Step::Tail(num(0)?)
            }
            "rotr" => {
                arity(1)?;
                Step::RotateRight(num(0)?)
            }
            "rotl" => {
                arity(1)?;
                Step::RotateLeft(num(0)?)
            }
            "shr" | "shl" => {
                arity(1)?;
                let bits = u32::try_from(num(0)?)
                    .map_err(|_| err(format!("shift '{}' is too large", args[0])))?;
                if op == "shr" {
                    Step::Shr(bits)
                } else {
                    Step::Shl(bits)
                }
            }
            "" => return Err(err("empty step".to_string())),
            other => return Err(err(format!("unknown step '{other}'"))),
        };
        Ok(step)
    }
}

impl FromStr for Formula {
    type Err = FormulaParseError;

    /// Parse a comma-separated list of steps.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Step::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(FormulaParseError {
                message: "formula has no steps".to_string(),
            });
        }
        Ok(Formula::new(steps))
    }
}
