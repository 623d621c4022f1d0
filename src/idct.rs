//! Inverse DCT kernels with dequantization and range limiting.
//!
//! Every kernel takes a coefficient block in natural order plus a multiplier
//! table built by the inverse-DCT manager, dequantizes as it reads, and
//! writes `size x size` samples starting at the top-left of `output`, with
//! rows `stride` apart.
//!
//! Outputs pass through [`range_limit`], which treats the descaled value as
//! a 10-bit wrapped quantity so that wildly out-of-range results from
//! corrupt data still map to a definite sample.

use crate::consts::{CENTERJSAMPLE, DCTSIZE, DCTSIZE2, MAXJSAMPLE, RANGE_MASK};
use crate::types::DctBlock;

/// Map a descaled (still zero-centered) IDCT output to a sample.
///
/// The low 10 bits select: `0..=127` is `x + 128`, `128..=511` saturates to
/// 255, `512..=895` saturates to 0, `896..=1023` wraps to `x - 1024 + 128`.
#[inline]
pub fn range_limit(x: i32) -> u8 {
    let idx = x & RANGE_MASK;
    if idx <= MAXJSAMPLE - CENTERJSAMPLE {
        (idx + CENTERJSAMPLE) as u8
    } else if idx < 2 * (MAXJSAMPLE + 1) {
        MAXJSAMPLE as u8
    } else if idx < 4 * (MAXJSAMPLE + 1) - CENTERJSAMPLE {
        0
    } else {
        (idx - 4 * (MAXJSAMPLE + 1) + CENTERJSAMPLE) as u8
    }
}

#[inline(always)]
fn descale(x: i64, n: i32) -> i64 {
    (x + (1 << (n - 1))) >> n
}

/// Range-limit a 64-bit intermediate. Only the low bits reach the mask.
#[inline(always)]
fn clamp_sample(x: i64) -> u8 {
    range_limit(x as i32)
}

#[inline(always)]
fn dequantize(coef: &DctBlock, quant: &[i32; DCTSIZE2], i: usize) -> i64 {
    coef[i] as i64 * quant[i] as i64
}

// =============================================================================
// Accurate integer IDCT
// =============================================================================

const CONST_BITS: i32 = 13;
const PASS1_BITS: i32 = 2;

const FIX_0_298631336: i64 = 2446;
const FIX_0_390180644: i64 = 3196;
const FIX_0_541196100: i64 = 4433;
const FIX_0_765366865: i64 = 6270;
const FIX_0_899976223: i64 = 7373;
const FIX_1_175875602: i64 = 9633;
const FIX_1_501321110: i64 = 12299;
const FIX_1_847759065: i64 = 15137;
const FIX_1_961570560: i64 = 16069;
const FIX_2_053119869: i64 = 16819;
const FIX_2_562915447: i64 = 20995;
const FIX_3_072711026: i64 = 25172;

/// One LLM butterfly over eight dequantized inputs `d[0..8]` (in frequency
/// order). Returns the eight outputs still scaled by `2^CONST_BITS`.
///
/// Products of a full-range coefficient and multiplier exceed 32 bits, so
/// the arithmetic is carried in `i64`.
#[inline(always)]
fn islow_1d(d: [i64; 8]) -> [i64; 8] {
    // Even part
    let z2 = d[2];
    let z3 = d[6];
    let z1 = (z2 + z3) * FIX_0_541196100;
    let tmp2 = z1 + z3 * (-FIX_1_847759065);
    let tmp3 = z1 + z2 * FIX_0_765366865;

    let tmp0 = (d[0] + d[4]) << CONST_BITS;
    let tmp1 = (d[0] - d[4]) << CONST_BITS;

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    // Odd part
    let tmp0 = d[7];
    let tmp1 = d[5];
    let tmp2 = d[3];
    let tmp3 = d[1];

    let z1 = tmp0 + tmp3;
    let z2 = tmp1 + tmp2;
    let z3 = tmp0 + tmp2;
    let z4 = tmp1 + tmp3;
    let z5 = (z3 + z4) * FIX_1_175875602;

    let tmp0 = tmp0 * FIX_0_298631336;
    let tmp1 = tmp1 * FIX_2_053119869;
    let tmp2 = tmp2 * FIX_3_072711026;
    let tmp3 = tmp3 * FIX_1_501321110;
    let z1 = z1 * (-FIX_0_899976223);
    let z2 = z2 * (-FIX_2_562915447);
    let z3 = z3 * (-FIX_1_961570560) + z5;
    let z4 = z4 * (-FIX_0_390180644) + z5;

    let tmp0 = tmp0 + z1 + z3;
    let tmp1 = tmp1 + z2 + z4;
    let tmp2 = tmp2 + z2 + z3;
    let tmp3 = tmp3 + z1 + z4;

    [
        tmp10 + tmp3,
        tmp11 + tmp2,
        tmp12 + tmp1,
        tmp13 + tmp0,
        tmp13 - tmp0,
        tmp12 - tmp1,
        tmp11 - tmp2,
        tmp10 - tmp3,
    ]
}

/// Accurate integer 8x8 IDCT.
pub fn idct_islow(coef: &DctBlock, quant: &[i32; DCTSIZE2], output: &mut [u8], stride: usize) {
    let mut ws = [0i64; DCTSIZE2];

    // Pass 1: columns from input, store into work array
    for col in 0..DCTSIZE {
        if (1..DCTSIZE).all(|k| coef[k * DCTSIZE + col] == 0) {
            let dcval = dequantize(coef, quant, col) << PASS1_BITS;
            for k in 0..DCTSIZE {
                ws[k * DCTSIZE + col] = dcval;
            }
            continue;
        }
        let d = core::array::from_fn(|k| dequantize(coef, quant, k * DCTSIZE + col));
        let out = islow_1d(d);
        for k in 0..DCTSIZE {
            ws[k * DCTSIZE + col] = descale(out[k], CONST_BITS - PASS1_BITS);
        }
    }

    // Pass 2: rows from work array, store into output
    for row in 0..DCTSIZE {
        let d: [i64; 8] = core::array::from_fn(|k| ws[row * DCTSIZE + k]);
        let out = islow_1d(d);
        let dst = &mut output[row * stride..row * stride + DCTSIZE];
        for k in 0..DCTSIZE {
            dst[k] = clamp_sample(descale(out[k], CONST_BITS + PASS1_BITS + 3));
        }
    }
}

// =============================================================================
// Fast integer IDCT (AAN)
// =============================================================================

const IFAST_CONST_BITS: i32 = 8;
const FIX_1_082392200: i64 = 277;
const FIX_1_414213562: i64 = 362;
const IFAST_FIX_1_847759065: i64 = 473;
const FIX_2_613125930: i64 = 669;

#[inline(always)]
fn ifast_multiply(var: i64, c: i64) -> i64 {
    (var * c) >> IFAST_CONST_BITS
}

#[inline(always)]
fn ifast_1d(d: [i64; 8]) -> [i64; 8] {
    // Even part
    let tmp10 = d[0] + d[4];
    let tmp11 = d[0] - d[4];
    let tmp13 = d[2] + d[6];
    let tmp12 = ifast_multiply(d[2] - d[6], FIX_1_414213562) - tmp13;

    let tmp0 = tmp10 + tmp13;
    let tmp3 = tmp10 - tmp13;
    let tmp1 = tmp11 + tmp12;
    let tmp2 = tmp11 - tmp12;

    // Odd part
    let z13 = d[5] + d[3];
    let z10 = d[5] - d[3];
    let z11 = d[1] + d[7];
    let z12 = d[1] - d[7];

    let tmp7 = z11 + z13;
    let tmp11 = ifast_multiply(z11 - z13, FIX_1_414213562);
    let z5 = ifast_multiply(z10 + z12, IFAST_FIX_1_847759065);
    let tmp10 = ifast_multiply(z12, FIX_1_082392200) - z5;
    let tmp12 = ifast_multiply(z10, -FIX_2_613125930) + z5;

    let tmp6 = tmp12 - tmp7;
    let tmp5 = tmp11 - tmp6;
    let tmp4 = tmp10 + tmp5;

    [
        tmp0 + tmp7,
        tmp1 + tmp6,
        tmp2 + tmp5,
        tmp3 - tmp4,
        tmp3 + tmp4,
        tmp2 - tmp5,
        tmp1 - tmp6,
        tmp0 - tmp7,
    ]
}

/// Fast integer 8x8 IDCT. Multipliers carry the AAN scale factors.
pub fn idct_ifast(coef: &DctBlock, quant: &[i32; DCTSIZE2], output: &mut [u8], stride: usize) {
    let mut ws = [0i64; DCTSIZE2];

    for col in 0..DCTSIZE {
        if (1..DCTSIZE).all(|k| coef[k * DCTSIZE + col] == 0) {
            let dcval = dequantize(coef, quant, col);
            for k in 0..DCTSIZE {
                ws[k * DCTSIZE + col] = dcval;
            }
            continue;
        }
        let d = core::array::from_fn(|k| dequantize(coef, quant, k * DCTSIZE + col));
        let out = ifast_1d(d);
        for k in 0..DCTSIZE {
            ws[k * DCTSIZE + col] = out[k];
        }
    }

    for row in 0..DCTSIZE {
        let d: [i64; 8] = core::array::from_fn(|k| ws[row * DCTSIZE + k]);
        let out = ifast_1d(d);
        let dst = &mut output[row * stride..row * stride + DCTSIZE];
        for k in 0..DCTSIZE {
            // Truncating shift, matching the kernel's multiplies
            dst[k] = clamp_sample(out[k] >> (PASS1_BITS + 3));
        }
    }
}

// =============================================================================
// Float IDCT (AAN)
// =============================================================================

#[inline(always)]
fn float_1d(d: [f32; 8]) -> [f32; 8] {
    // Even part
    let tmp10 = d[0] + d[4];
    let tmp11 = d[0] - d[4];
    let tmp13 = d[2] + d[6];
    let tmp12 = (d[2] - d[6]) * 1.414_213_562 - tmp13;

    let tmp0 = tmp10 + tmp13;
    let tmp3 = tmp10 - tmp13;
    let tmp1 = tmp11 + tmp12;
    let tmp2 = tmp11 - tmp12;

    // Odd part
    let z13 = d[5] + d[3];
    let z10 = d[5] - d[3];
    let z11 = d[1] + d[7];
    let z12 = d[1] - d[7];

    let tmp7 = z11 + z13;
    let tmp11 = (z11 - z13) * 1.414_213_562;
    let z5 = (z10 + z12) * 1.847_759_065;
    let tmp10 = z12 * 1.082_392_2 - z5;
    let tmp12 = z10 * -2.613_125_93 + z5;

    let tmp6 = tmp12 - tmp7;
    let tmp5 = tmp11 - tmp6;
    let tmp4 = tmp10 + tmp5;

    [
        tmp0 + tmp7,
        tmp1 + tmp6,
        tmp2 + tmp5,
        tmp3 - tmp4,
        tmp3 + tmp4,
        tmp2 - tmp5,
        tmp1 - tmp6,
        tmp0 - tmp7,
    ]
}

/// Float 8x8 IDCT. Multipliers carry the AAN scale factors.
pub fn idct_float(coef: &DctBlock, quant: &[f32; DCTSIZE2], output: &mut [u8], stride: usize) {
    let mut ws = [0f32; DCTSIZE2];

    for col in 0..DCTSIZE {
        if (1..DCTSIZE).all(|k| coef[k * DCTSIZE + col] == 0) {
            let dcval = coef[col] as f32 * quant[col];
            for k in 0..DCTSIZE {
                ws[k * DCTSIZE + col] = dcval;
            }
            continue;
        }
        let d = core::array::from_fn(|k| {
            let i = k * DCTSIZE + col;
            coef[i] as f32 * quant[i]
        });
        let out = float_1d(d);
        for k in 0..DCTSIZE {
            ws[k * DCTSIZE + col] = out[k];
        }
    }

    for row in 0..DCTSIZE {
        let d: [f32; 8] = core::array::from_fn(|k| ws[row * DCTSIZE + k]);
        let out = float_1d(d);
        let dst = &mut output[row * stride..row * stride + DCTSIZE];
        for k in 0..DCTSIZE {
            dst[k] = clamp_sample(descale(out[k] as i64, 3));
        }
    }
}

// =============================================================================
// Reduced-size IDCTs
// =============================================================================

const FIX_0_211164243: i64 = 1730;
const FIX_0_509795579: i64 = 4176;
const FIX_0_601344887: i64 = 4926;
const FIX_0_720959822: i64 = 5906;
const FIX_0_850430095: i64 = 6967;
const FIX_1_061594337: i64 = 8697;
const FIX_1_272758580: i64 = 10426;
const FIX_1_451774981: i64 = 11893;
const FIX_2_172734803: i64 = 17799;
const FIX_3_624509785: i64 = 29692;

/// Odd-part terms of the 4-point reduced transform, from inputs 1, 3, 5, 7.
#[inline(always)]
fn reduced4_odd(z4: i64, z3: i64, z2: i64, z1: i64) -> (i64, i64) {
    let tmp0 = z1 * (-FIX_0_211164243)
        + z2 * FIX_1_451774981
        + z3 * (-FIX_2_172734803)
        + z4 * FIX_1_061594337;
    let tmp2 = z1 * (-FIX_0_509795579)
        + z2 * (-FIX_0_601344887)
        + z3 * FIX_0_899976223
        + z4 * FIX_2_562915447;
    (tmp0, tmp2)
}

/// 4x4 reduced IDCT producing a quarter-size block.
pub fn idct_4x4(coef: &DctBlock, quant: &[i32; DCTSIZE2], output: &mut [u8], stride: usize) {
    let mut ws = [0i64; DCTSIZE * 4];

    for col in 0..DCTSIZE {
        // Column 4 is never read by the second pass
        if col == 4 {
            continue;
        }
        let at = |k: usize| dequantize(coef, quant, k * DCTSIZE + col);
        if [1, 2, 3, 5, 6, 7].iter().all(|&k| coef[k * DCTSIZE + col] == 0) {
            let dcval = at(0) << PASS1_BITS;
            for k in 0..4 {
                ws[k * DCTSIZE + col] = dcval;
            }
            continue;
        }

        // Even part
        let tmp0 = at(0) << (CONST_BITS + 1);
        let tmp2 = at(2) * FIX_1_847759065 + at(6) * (-FIX_0_765366865);
        let tmp10 = tmp0 + tmp2;
        let tmp12 = tmp0 - tmp2;

        // Odd part
        let (tmp0, tmp2) = reduced4_odd(at(1), at(3), at(5), at(7));

        let shift = CONST_BITS - PASS1_BITS + 1;
        ws[col] = descale(tmp10 + tmp2, shift);
        ws[DCTSIZE * 3 + col] = descale(tmp10 - tmp2, shift);
        ws[DCTSIZE + col] = descale(tmp12 + tmp0, shift);
        ws[DCTSIZE * 2 + col] = descale(tmp12 - tmp0, shift);
    }

    for row in 0..4 {
        let w = &ws[row * DCTSIZE..(row + 1) * DCTSIZE];
        let tmp0 = w[0] << (CONST_BITS + 1);
        let tmp2 = w[2] * FIX_1_847759065 + w[6] * (-FIX_0_765366865);
        let tmp10 = tmp0 + tmp2;
        let tmp12 = tmp0 - tmp2;

        let (tmp0, tmp2) = reduced4_odd(w[1], w[3], w[5], w[7]);

        let shift = CONST_BITS + PASS1_BITS + 3 + 1;
        let dst = &mut output[row * stride..row * stride + 4];
        dst[0] = clamp_sample(descale(tmp10 + tmp2, shift));
        dst[3] = clamp_sample(descale(tmp10 - tmp2, shift));
        dst[1] = clamp_sample(descale(tmp12 + tmp0, shift));
        dst[2] = clamp_sample(descale(tmp12 - tmp0, shift));
    }
}

#[inline(always)]
fn reduced2_odd(z1: i64, z3: i64, z5: i64, z7: i64) -> i64 {
    z7 * (-FIX_0_720959822)
        + z5 * FIX_0_850430095
        + z3 * (-FIX_1_272758580)
        + z1 * FIX_3_624509785
}

/// 2x2 reduced IDCT producing a one-sixteenth-size block.
pub fn idct_2x2(coef: &DctBlock, quant: &[i32; DCTSIZE2], output: &mut [u8], stride: usize) {
    let mut ws = [0i64; DCTSIZE * 2];

    for col in 0..DCTSIZE {
        // Columns 2, 4 and 6 are never read by the second pass
        if col == 2 || col == 4 || col == 6 {
            continue;
        }
        let at = |k: usize| dequantize(coef, quant, k * DCTSIZE + col);
        if [1, 3, 5, 7].iter().all(|&k| coef[k * DCTSIZE + col] == 0) {
            let dcval = at(0) << PASS1_BITS;
            ws[col] = dcval;
            ws[DCTSIZE + col] = dcval;
            continue;
        }

        let tmp10 = at(0) << (CONST_BITS + 2);
        let tmp0 = reduced2_odd(at(1), at(3), at(5), at(7));

        let shift = CONST_BITS - PASS1_BITS + 2;
        ws[col] = descale(tmp10 + tmp0, shift);
        ws[DCTSIZE + col] = descale(tmp10 - tmp0, shift);
    }

    for row in 0..2 {
        let w = &ws[row * DCTSIZE..(row + 1) * DCTSIZE];
        let tmp10 = w[0] << (CONST_BITS + 2);
        let tmp0 = reduced2_odd(w[1], w[3], w[5], w[7]);

        let shift = CONST_BITS + PASS1_BITS + 3 + 2;
        output[row * stride] = clamp_sample(descale(tmp10 + tmp0, shift));
        output[row * stride + 1] = clamp_sample(descale(tmp10 - tmp0, shift));
    }
}

/// 1x1 reduced IDCT: the block average from the DC term alone.
pub fn idct_1x1(coef: &DctBlock, quant: &[i32; DCTSIZE2], output: &mut [u8], _stride: usize) {
    let dcval = descale(dequantize(coef, quant, 0), 3);
    output[0] = clamp_sample(dcval);
}
