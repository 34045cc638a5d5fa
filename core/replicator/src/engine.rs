// SPDX-License-Identifier: MIT
use alloy_primitives::{keccak256, U256};

use crate::error::ReplicateError;
use crate::formula::{Formula, Step, WORD};

/// Run `formula` over `observables` and return the single resulting value.
///
/// Every `Load` is checked against the supplied observables before anything
/// is evaluated, so a wrong-width input fails here rather than producing a
/// value the contract would reject later.
pub fn replicate<T: AsRef<[u8]>>(
    observables: &[T],
    formula: &Formula,
) -> Result<Vec<u8>, ReplicateError> {
    check_inputs(observables, formula)?;

    let mut stack: Vec<Vec<u8>> = Vec::new();
    for (pos, step) in formula.steps().iter().enumerate() {
        let invalid = |reason: String| ReplicateError::InvalidFormula { step: pos, reason };

        match step {
            Step::Load { index, .. } => stack.push(observables[*index].as_ref().to_vec()),
            Step::Word(value) => stack.push(value.to_be_bytes::<WORD>().to_vec()),
            Step::Add => {
                let (a, b) = pop2(&mut stack, pos)?;
                if a.len() != WORD || b.len() != WORD {
                    return Err(invalid(format!(
                        "add needs two {WORD}-byte words, got {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                let sum = U256::from_be_slice(&a).wrapping_add(U256::from_be_slice(&b));
                stack.push(sum.to_be_bytes::<WORD>().to_vec());
            }
            Step::Hash => {
                let v = pop(&mut stack, pos)?;
                stack.push(keccak256(&v).to_vec());
            }
            Step::Xor | Step::Or => {
                let (a, b) = pop2(&mut stack, pos)?;
                if a.len() != b.len() {
                    return Err(invalid(format!(
                        "operands differ in width ({} vs {})",
                        a.len(),
                        b.len()
                    )));
                }
                let out = a
                    .iter()
                    .zip(&b)
                    .map(|(x, y)| if *step == Step::Xor { x ^ y } else { x | y })
                    .collect();
                stack.push(out);
            }
            Step::Slice { offset, len } => {
                let v = pop(&mut stack, pos)?;
                stack.push(slice(&v, *offset, *len).map_err(invalid)?);
            }
            Step::Head(n) => {
                let v = pop(&mut stack, pos)?;
                stack.push(slice(&v, 0, *n).map_err(invalid)?);
            }
            Step::Tail(n) => {
                let v = pop(&mut stack, pos)?;
                let offset = v
                    .len()
                    .checked_sub(*n)
                    .ok_or_else(|| invalid(format!("tail:{n} of a {}-byte value", v.len())))?;
                stack.push(v[offset..].to_vec());
            }
            Step::RotateRight(n) => {
                let mut v = pop(&mut stack, pos)?;
                if !v.is_empty() {
                    let n = n % v.len();
                    v.rotate_right(n);
                }
                stack.push(v);
            }
            Step::RotateLeft(n) => {
                let mut v = pop(&mut stack, pos)?;
                if !v.is_empty() {
                    let n = n % v.len();
                    v.rotate_left(n);
                }
                stack.push(v);
            }
            Step::Shr(bits) => {
                let v = pop(&mut stack, pos)?;
                stack.push(shift_right(&v, *bits));
            }
            Step::Shl(bits) => {
                let v = pop(&mut stack, pos)?;
                stack.push(shift_left(&v, *bits));
            }
            Step::Dup => {
                let top = stack
                    .last()
                    .cloned()
                    .ok_or_else(|| invalid("dup on an empty stack".to_string()))?;
                stack.push(top);
            }
            Step::Swap => {
                let (a, b) = pop2(&mut stack, pos)?;
                stack.push(b);
                stack.push(a);
            }
        }
    }

    match stack.len() {
        1 => Ok(stack.pop().unwrap_or_default()),
        n => Err(ReplicateError::InvalidFormula {
            step: formula.steps().len(),
            reason: format!("program must leave exactly one value, left {n}"),
        }),
    }
}

fn check_inputs<T: AsRef<[u8]>>(
    observables: &[T],
    formula: &Formula,
) -> Result<(), ReplicateError> {
    for step in formula.steps() {
        if let Step::Load { index, width } = step {
            let obs = observables
                .get(*index)
                .ok_or(ReplicateError::MissingObservable {
                    index: *index,
                    available: observables.len(),
                })?;
            let actual = obs.as_ref().len();
            if actual != *width {
                return Err(ReplicateError::MalformedInput {
                    index: *index,
                    expected: *width,
                    actual,
                });
            }
        }
    }
    Ok(())
}

fn pop(stack: &mut Vec<Vec<u8>>, step: usize) -> Result<Vec<u8>, ReplicateError> {
    stack.pop().ok_or(ReplicateError::InvalidFormula {
        step,
        reason: "stack underflow".to_string(),
    })
}

/// Pops `(below, top)`.
fn pop2(stack: &mut Vec<Vec<u8>>, step: usize) -> Result<(Vec<u8>, Vec<u8>), ReplicateError> {
    let top = pop(stack, step)?;
    let below = pop(stack, step)?;
    Ok((below, top))
}

fn slice(v: &[u8], offset: usize, len: usize) -> Result<Vec<u8>, String> {
    match offset.checked_add(len) {
        Some(end) if end <= v.len() => Ok(v[offset..end].to_vec()),
        _ => Err(format!(
            "bytes {offset}..{offset}+{len} out of range for a {}-byte value",
            v.len()
        )),
    }
}

fn shift_right(v: &[u8], bits: u32) -> Vec<u8> {
    let width = v.len();
    let byte_shift = (bits / 8) as usize;
    let bit_shift = bits % 8;
    let mut out = vec![0u8; width];
    for i in byte_shift..width {
        let src = i - byte_shift;
        let mut b = v[src] >> bit_shift;
        if bit_shift > 0 && src > 0 {
            b |= v[src - 1] << (8 - bit_shift);
        }
        out[i] = b;
    }
    out
}

fn shift_left(v: &[u8], bits: u32) -> Vec<u8> {
    let width = v.len();
    let byte_shift = (bits / 8) as usize;
    let bit_shift = bits % 8;
    let mut out = vec![0u8; width];
    for i in 0..width.saturating_sub(byte_shift) {
        let src = i + byte_shift;
        let mut b = v[src] << bit_shift;
        if bit_shift > 0 && src + 1 < width {
            b |= v[src + 1] >> (8 - bit_shift);
        }
        out[i] = b;
    }
    out
}
