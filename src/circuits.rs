//! Sample circuits
//!
//! Builders write into an existing function, so the same circuit can be built under different
//! insertion toggles.

use crate::ir::term::{Func, OpCode, TermError, TermId, TermType};

/// Rotate `x` right by `s` slots.
fn shr(f: &mut Func, x: TermId, s: i64) -> Result<TermId, TermError> {
    f.insert_op_term(OpCode::Rotate(-s), vec![x])
}

/// Rotate `x` left by `s` slots.
fn shl(f: &mut Func, x: TermId, s: i64) -> Result<TermId, TermError> {
    f.insert_op_term(OpCode::Rotate(s), vec![x])
}

fn add(f: &mut Func, a: TermId, b: TermId) -> Result<TermId, TermError> {
    f.insert_op_term(OpCode::Add, vec![a, b])
}

/// `k0 * (row >> 1) + k1 * row + k2 * (row << 1)`
fn kernel_row(f: &mut Func, k: [i64; 3], row: TermId) -> Result<TermId, TermError> {
    let left = shr(f, row, 1)?;
    let right = shl(f, row, 1)?;
    let mut products = Vec::with_capacity(3);
    for (w, x) in k.iter().zip([left, row, right]) {
        let c = f.add_scalar_const(*w)?;
        products.push(f.insert_op_term(OpCode::Mul, vec![c, x])?);
    }
    let partial = add(f, products[0], products[1])?;
    add(f, partial, products[2])
}

/// A 3x3 box blur of the `width`-wide image `img` (a ciphertext with values in `0..=255`), as
/// written against the vector model: each kernel row multiplies shifted copies of the image.
///
/// The output is labelled `result`.
pub fn box_blur(f: &mut Func, width: usize) -> Result<TermId, TermError> {
    let kernel = [[1, 1, 1], [1, 1, 1], [1, 1, 1]];
    let w = width as i64;
    let img = f.add_input("img", TermType::Cipher, (0, 255))?;
    let top_row = shr(f, img, w)?;
    let bottom_row = shl(f, img, w)?;
    let top_sum = kernel_row(f, kernel[0], top_row)?;
    let curr_sum = kernel_row(f, kernel[1], img)?;
    let bottom_sum = kernel_row(f, kernel[2], bottom_row)?;
    let partial = add(f, top_sum, curr_sum)?;
    let result = add(f, partial, bottom_sum)?;
    f.set_output(result, "result")?;
    Ok(result)
}

/// The box blur of [box_blur], written by hand with one rotation per neighbour.
pub fn box_blur_baseline(f: &mut Func, width: usize) -> Result<TermId, TermError> {
    let w = width as i64;
    let img = f.add_input("img", TermType::Cipher, (0, 255))?;
    let mut terms = Vec::with_capacity(9);
    for s in [w + 1, w, w - 1, 1] {
        terms.push(shr(f, img, s)?);
    }
    terms.push(img);
    for s in [1, w - 1, w, w + 1] {
        terms.push(shl(f, img, s)?);
    }
    let mut result = terms[0];
    for t in &terms[1..] {
        result = add(f, result, *t)?;
    }
    f.set_output(result, "result")?;
    Ok(result)
}
