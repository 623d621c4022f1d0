//! Forward DCT kernels.
//!
//! All kernels transform an 8x8 workspace in place. Inputs are level-shifted
//! samples (centered on zero); outputs are in natural order.
//!
//! - [`fdct_islow`]: Loeffler-Ligtenberg-Moschytz, 13-bit fixed point. The
//!   output is scaled up by 8 relative to a true DCT.
//! - [`fdct_ifast`]: Arai-Agui-Nakajima, 8-bit fixed point. The output
//!   carries the AAN per-frequency scale factors (folded into the divisors).
//! - [`fdct_float`]: Arai-Agui-Nakajima in single precision, same scaling as
//!   the fast integer kernel.
//!
//! Each kernel has a portable form and an accelerated form producing
//! identical output. The accurate-integer accelerated kernel works on
//! `wide::i32x8` rows with a transpose between the passes; the others are
//! autovectorized through `multiversion`.
//!
//! Reference: C. Loeffler, A. Ligtenberg and G. Moschytz,
//! "Practical Fast 1-D DCT Algorithms with 11 Multiplications",
//! Proc. ICASSP 1989, pp. 988-991.

use multiversion::multiversion;
use wide::i32x8;

use crate::consts::{CENTERJSAMPLE, DCTSIZE, DCTSIZE2};
use crate::types::FloatBlock;

/// Integer DCT workspace.
pub type IntWorkspace = [i32; DCTSIZE2];

// Fixed-point constants for 13-bit precision (CONST_BITS = 13)
const CONST_BITS: i32 = 13;
const PASS1_BITS: i32 = 2;

// Pre-calculated fixed-point constants: FIX(x) = (x * (1 << CONST_BITS) + 0.5)
const FIX_0_298631336: i32 = 2446; // FIX(0.298631336)
const FIX_0_390180644: i32 = 3196; // FIX(0.390180644)
const FIX_0_541196100: i32 = 4433; // FIX(0.541196100)
const FIX_0_765366865: i32 = 6270; // FIX(0.765366865)
const FIX_0_899976223: i32 = 7373; // FIX(0.899976223)
const FIX_1_175875602: i32 = 9633; // FIX(1.175875602)
const FIX_1_501321110: i32 = 12299; // FIX(1.501321110)
const FIX_1_847759065: i32 = 15137; // FIX(1.847759065)
const FIX_1_961570560: i32 = 16069; // FIX(1.961570560)
const FIX_2_053119869: i32 = 16819; // FIX(2.053119869)
const FIX_2_562915447: i32 = 20995; // FIX(2.562915447)
const FIX_3_072711026: i32 = 25172; // FIX(3.072711026)

/// DESCALE: Right-shift with rounding (used to remove fixed-point scaling)
#[inline]
fn descale(x: i32, n: i32) -> i32 {
    (x + (1 << (n - 1))) >> n
}

// =============================================================================
// Sample conversion
// =============================================================================

/// Load one 8x8 block of samples into an integer workspace, subtracting the
/// center value.
///
/// `samples` starts at the block's top-left sample; rows are `stride` apart.
#[inline]
pub fn convsamp_int(samples: &[u8], stride: usize, workspace: &mut IntWorkspace) {
    for row in 0..DCTSIZE {
        let src = &samples[row * stride..row * stride + DCTSIZE];
        let dst = &mut workspace[row * DCTSIZE..(row + 1) * DCTSIZE];
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = s as i32 - CENTERJSAMPLE;
        }
    }
}

/// Float counterpart of [`convsamp_int`].
#[inline]
pub fn convsamp_float(samples: &[u8], stride: usize, workspace: &mut FloatBlock) {
    for row in 0..DCTSIZE {
        let src = &samples[row * stride..row * stride + DCTSIZE];
        let dst = &mut workspace[row * DCTSIZE..(row + 1) * DCTSIZE];
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = (s as i32 - CENTERJSAMPLE) as f32;
        }
    }
}

// =============================================================================
// Accurate integer DCT
// =============================================================================

/// Accurate integer forward DCT, in place.
pub fn fdct_islow(data: &mut IntWorkspace) {
    // Pass 1: process rows
    // Results are scaled up by sqrt(8) and by 2^PASS1_BITS
    for row in 0..DCTSIZE {
        let base = row * DCTSIZE;

        let tmp0 = data[base] + data[base + 7];
        let tmp7 = data[base] - data[base + 7];
        let tmp1 = data[base + 1] + data[base + 6];
        let tmp6 = data[base + 1] - data[base + 6];
        let tmp2 = data[base + 2] + data[base + 5];
        let tmp5 = data[base + 2] - data[base + 5];
        let tmp3 = data[base + 3] + data[base + 4];
        let tmp4 = data[base + 3] - data[base + 4];

        // Even part (per Loeffler figure 1)
        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        data[base] = (tmp10 + tmp11) << PASS1_BITS;
        data[base + 4] = (tmp10 - tmp11) << PASS1_BITS;

        let z1 = (tmp12 + tmp13) * FIX_0_541196100;
        data[base + 2] = descale(z1 + tmp13 * FIX_0_765366865, CONST_BITS - PASS1_BITS);
        data[base + 6] = descale(z1 + tmp12 * (-FIX_1_847759065), CONST_BITS - PASS1_BITS);

        // Odd part (per Loeffler figure 8)
        let z1 = tmp4 + tmp7;
        let z2 = tmp5 + tmp6;
        let z3 = tmp4 + tmp6;
        let z4 = tmp5 + tmp7;
        let z5 = (z3 + z4) * FIX_1_175875602; // sqrt(2) * c3

        let tmp4 = tmp4 * FIX_0_298631336; // sqrt(2) * (-c1+c3+c5-c7)
        let tmp5 = tmp5 * FIX_2_053119869; // sqrt(2) * ( c1+c3-c5+c7)
        let tmp6 = tmp6 * FIX_3_072711026; // sqrt(2) * ( c1+c3+c5-c7)
        let tmp7 = tmp7 * FIX_1_501321110; // sqrt(2) * ( c1+c3-c5-c7)
        let z1 = z1 * (-FIX_0_899976223); // sqrt(2) * ( c7-c3)
        let z2 = z2 * (-FIX_2_562915447); // sqrt(2) * (-c1-c3)
        let z3 = z3 * (-FIX_1_961570560) + z5; // sqrt(2) * (-c3-c5)
        let z4 = z4 * (-FIX_0_390180644) + z5; // sqrt(2) * ( c5-c3)

        data[base + 7] = descale(tmp4 + z1 + z3, CONST_BITS - PASS1_BITS);
        data[base + 5] = descale(tmp5 + z2 + z4, CONST_BITS - PASS1_BITS);
        data[base + 3] = descale(tmp6 + z2 + z3, CONST_BITS - PASS1_BITS);
        data[base + 1] = descale(tmp7 + z1 + z4, CONST_BITS - PASS1_BITS);
    }

    // Pass 2: process columns
    // We remove PASS1_BITS scaling but leave results scaled by factor of 8
    for col in 0..DCTSIZE {
        let tmp0 = data[col] + data[DCTSIZE * 7 + col];
        let tmp7 = data[col] - data[DCTSIZE * 7 + col];
        let tmp1 = data[DCTSIZE + col] + data[DCTSIZE * 6 + col];
        let tmp6 = data[DCTSIZE + col] - data[DCTSIZE * 6 + col];
        let tmp2 = data[DCTSIZE * 2 + col] + data[DCTSIZE * 5 + col];
        let tmp5 = data[DCTSIZE * 2 + col] - data[DCTSIZE * 5 + col];
        let tmp3 = data[DCTSIZE * 3 + col] + data[DCTSIZE * 4 + col];
        let tmp4 = data[DCTSIZE * 3 + col] - data[DCTSIZE * 4 + col];

        // Even part
        let tmp10 = tmp0 + tmp3;
        let tmp13 = tmp0 - tmp3;
        let tmp11 = tmp1 + tmp2;
        let tmp12 = tmp1 - tmp2;

        data[col] = descale(tmp10 + tmp11, PASS1_BITS);
        data[DCTSIZE * 4 + col] = descale(tmp10 - tmp11, PASS1_BITS);

        let z1 = (tmp12 + tmp13) * FIX_0_541196100;
        data[DCTSIZE * 2 + col] = descale(z1 + tmp13 * FIX_0_765366865, CONST_BITS + PASS1_BITS);
        data[DCTSIZE * 6 + col] =
            descale(z1 + tmp12 * (-FIX_1_847759065), CONST_BITS + PASS1_BITS);

        // Odd part
        let z1 = tmp4 + tmp7;
        let z2 = tmp5 + tmp6;
        let z3 = tmp4 + tmp6;
        let z4 = tmp5 + tmp7;
        let z5 = (z3 + z4) * FIX_1_175875602;

        let tmp4 = tmp4 * FIX_0_298631336;
        let tmp5 = tmp5 * FIX_2_053119869;
        let tmp6 = tmp6 * FIX_3_072711026;
        let tmp7 = tmp7 * FIX_1_501321110;
        let z1 = z1 * (-FIX_0_899976223);
        let z2 = z2 * (-FIX_2_562915447);
        let z3 = z3 * (-FIX_1_961570560) + z5;
        let z4 = z4 * (-FIX_0_390180644) + z5;

        data[DCTSIZE * 7 + col] = descale(tmp4 + z1 + z3, CONST_BITS + PASS1_BITS);
        data[DCTSIZE * 5 + col] = descale(tmp5 + z2 + z4, CONST_BITS + PASS1_BITS);
        data[DCTSIZE * 3 + col] = descale(tmp6 + z2 + z3, CONST_BITS + PASS1_BITS);
        data[DCTSIZE + col] = descale(tmp7 + z1 + z4, CONST_BITS + PASS1_BITS);
    }
}

// SIMD constants for i32x8 (8-wide operations)
const SIMD8_FIX_0_298631336: i32x8 = i32x8::new([FIX_0_298631336; 8]);
const SIMD8_FIX_0_541196100: i32x8 = i32x8::new([FIX_0_541196100; 8]);
const SIMD8_FIX_0_765366865: i32x8 = i32x8::new([FIX_0_765366865; 8]);
const SIMD8_FIX_1_175875602: i32x8 = i32x8::new([FIX_1_175875602; 8]);
const SIMD8_FIX_1_501321110: i32x8 = i32x8::new([FIX_1_501321110; 8]);
const SIMD8_FIX_1_847759065: i32x8 = i32x8::new([FIX_1_847759065; 8]);
const SIMD8_FIX_2_053119869: i32x8 = i32x8::new([FIX_2_053119869; 8]);
const SIMD8_FIX_3_072711026: i32x8 = i32x8::new([FIX_3_072711026; 8]);

// Negated constants for i32x8
const SIMD8_NEG_FIX_0_390180644: i32x8 = i32x8::new([-FIX_0_390180644; 8]);
const SIMD8_NEG_FIX_0_899976223: i32x8 = i32x8::new([-FIX_0_899976223; 8]);
const SIMD8_NEG_FIX_1_961570560: i32x8 = i32x8::new([-FIX_1_961570560; 8]);
const SIMD8_NEG_FIX_2_562915447: i32x8 = i32x8::new([-FIX_2_562915447; 8]);

#[inline(always)]
fn descale_simd8(x: i32x8, n: i32) -> i32x8 {
    let round = i32x8::splat(1 << (n - 1));
    (x + round) >> n
}

/// 1D DCT on 8 lanes at once; lane `k` of every input belongs to line `k`.
#[inline(always)]
fn dct_1d_8wide(d: [i32x8; 8], first_pass: bool) -> [i32x8; 8] {
    // Even part
    let tmp0 = d[0] + d[7];
    let tmp7 = d[0] - d[7];
    let tmp1 = d[1] + d[6];
    let tmp6 = d[1] - d[6];
    let tmp2 = d[2] + d[5];
    let tmp5 = d[2] - d[5];
    let tmp3 = d[3] + d[4];
    let tmp4 = d[3] - d[4];

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    let (out0, out4) = if first_pass {
        ((tmp10 + tmp11) << PASS1_BITS, (tmp10 - tmp11) << PASS1_BITS)
    } else {
        (
            descale_simd8(tmp10 + tmp11, PASS1_BITS),
            descale_simd8(tmp10 - tmp11, PASS1_BITS),
        )
    };

    let scale = if first_pass {
        CONST_BITS - PASS1_BITS
    } else {
        CONST_BITS + PASS1_BITS
    };

    let z1 = (tmp12 + tmp13) * SIMD8_FIX_0_541196100;
    let out2 = descale_simd8(z1 + tmp13 * SIMD8_FIX_0_765366865, scale);
    let out6 = descale_simd8(z1 - tmp12 * SIMD8_FIX_1_847759065, scale);

    // Odd part
    let z1 = tmp4 + tmp7;
    let z2 = tmp5 + tmp6;
    let z3 = tmp4 + tmp6;
    let z4 = tmp5 + tmp7;
    let z5 = (z3 + z4) * SIMD8_FIX_1_175875602;

    let tmp4 = tmp4 * SIMD8_FIX_0_298631336;
    let tmp5 = tmp5 * SIMD8_FIX_2_053119869;
    let tmp6 = tmp6 * SIMD8_FIX_3_072711026;
    let tmp7 = tmp7 * SIMD8_FIX_1_501321110;

    let neg_z1 = z1 * SIMD8_NEG_FIX_0_899976223;
    let neg_z2 = z2 * SIMD8_NEG_FIX_2_562915447;
    let z3 = z3 * SIMD8_NEG_FIX_1_961570560 + z5;
    let z4 = z4 * SIMD8_NEG_FIX_0_390180644 + z5;

    let out7 = descale_simd8(tmp4 + neg_z1 + z3, scale);
    let out5 = descale_simd8(tmp5 + neg_z2 + z4, scale);
    let out3 = descale_simd8(tmp6 + neg_z2 + z3, scale);
    let out1 = descale_simd8(tmp7 + neg_z1 + z4, scale);

    [out0, out1, out2, out3, out4, out5, out6, out7]
}

/// Transpose 8x8 matrix stored as 8 i32x8 vectors.
#[inline(always)]
fn transpose_8x8(rows: &mut [i32x8; 8]) {
    let mut data: [[i32; 8]; 8] = rows.map(|r| r.to_array());

    #[allow(clippy::needless_range_loop)]
    for i in 0..8 {
        for j in (i + 1)..8 {
            let tmp = data[i][j];
            data[i][j] = data[j][i];
            data[j][i] = tmp;
        }
    }

    *rows = data.map(i32x8::new);
}

/// Accurate integer forward DCT on 8-lane vectors, in place.
///
/// Loads rows contiguously and transposes so that each lane carries one
/// row through the first pass, then transposes back for the column pass.
/// Produces exactly the output of [`fdct_islow`].
pub fn fdct_islow_wide(workspace: &mut IntWorkspace) {
    let mut data: [i32x8; 8] = core::array::from_fn(|row| {
        let mut lane = [0i32; 8];
        lane.copy_from_slice(&workspace[row * DCTSIZE..(row + 1) * DCTSIZE]);
        i32x8::new(lane)
    });

    // Pass 1: rows become lanes
    transpose_8x8(&mut data);
    data = dct_1d_8wide(data, true);

    // Pass 2: columns become lanes; the result is row-major again
    transpose_8x8(&mut data);
    data = dct_1d_8wide(data, false);

    for (row, v) in data.iter().enumerate() {
        workspace[row * DCTSIZE..(row + 1) * DCTSIZE].copy_from_slice(&v.to_array());
    }
}

// =============================================================================
// Fast integer DCT (AAN)
// =============================================================================

const IFAST_CONST_BITS: i32 = 8;
const IFAST_FIX_0_382683433: i32 = 98;
const IFAST_FIX_0_541196100: i32 = 139;
const IFAST_FIX_0_707106781: i32 = 181;
const IFAST_FIX_1_306562965: i32 = 334;

/// Truncating fixed-point multiply; the fast kernel trades rounding for speed.
#[inline(always)]
fn ifast_multiply(var: i32, c: i32) -> i32 {
    (var * c) >> IFAST_CONST_BITS
}

#[inline(always)]
fn ifast_1d(data: &mut IntWorkspace, idx: [usize; 8]) {
    let [i0, i1, i2, i3, i4, i5, i6, i7] = idx;

    let tmp0 = data[i0] + data[i7];
    let tmp7 = data[i0] - data[i7];
    let tmp1 = data[i1] + data[i6];
    let tmp6 = data[i1] - data[i6];
    let tmp2 = data[i2] + data[i5];
    let tmp5 = data[i2] - data[i5];
    let tmp3 = data[i3] + data[i4];
    let tmp4 = data[i3] - data[i4];

    // Even part
    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    data[i0] = tmp10 + tmp11;
    data[i4] = tmp10 - tmp11;

    let z1 = ifast_multiply(tmp12 + tmp13, IFAST_FIX_0_707106781);
    data[i2] = tmp13 + z1;
    data[i6] = tmp13 - z1;

    // Odd part
    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;

    let z5 = ifast_multiply(tmp10 - tmp12, IFAST_FIX_0_382683433);
    let z2 = ifast_multiply(tmp10, IFAST_FIX_0_541196100) + z5;
    let z4 = ifast_multiply(tmp12, IFAST_FIX_1_306562965) + z5;
    let z3 = ifast_multiply(tmp11, IFAST_FIX_0_707106781);

    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;

    data[i5] = z13 + z2;
    data[i3] = z13 - z2;
    data[i1] = z11 + z4;
    data[i7] = z11 - z4;
}

#[inline(always)]
fn fdct_ifast_body(data: &mut IntWorkspace) {
    for row in 0..DCTSIZE {
        let b = row * DCTSIZE;
        ifast_1d(data, [b, b + 1, b + 2, b + 3, b + 4, b + 5, b + 6, b + 7]);
    }
    for col in 0..DCTSIZE {
        ifast_1d(data, core::array::from_fn(|k| k * DCTSIZE + col));
    }
}

/// Fast integer forward DCT, in place.
pub fn fdct_ifast(data: &mut IntWorkspace) {
    fdct_ifast_body(data);
}

/// Autovectorized fast integer forward DCT with output identical to
/// [`fdct_ifast`].
#[multiversion(targets(
    "x86_64+avx2",
    "x86_64+sse4.1",
    "x86+avx2",
    "x86+sse4.1",
    "aarch64+neon",
))]
pub fn fdct_ifast_multiversion(data: &mut IntWorkspace) {
    fdct_ifast_body(data);
}

// =============================================================================
// Float DCT (AAN)
// =============================================================================

#[inline(always)]
fn float_1d(data: &mut FloatBlock, idx: [usize; 8]) {
    let [i0, i1, i2, i3, i4, i5, i6, i7] = idx;

    let tmp0 = data[i0] + data[i7];
    let tmp7 = data[i0] - data[i7];
    let tmp1 = data[i1] + data[i6];
    let tmp6 = data[i1] - data[i6];
    let tmp2 = data[i2] + data[i5];
    let tmp5 = data[i2] - data[i5];
    let tmp3 = data[i3] + data[i4];
    let tmp4 = data[i3] - data[i4];

    // Even part
    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    data[i0] = tmp10 + tmp11;
    data[i4] = tmp10 - tmp11;

    let z1 = (tmp12 + tmp13) * 0.707_106_781;
    data[i2] = tmp13 + z1;
    data[i6] = tmp13 - z1;

    // Odd part
    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;

    let z5 = (tmp10 - tmp12) * 0.382_683_433;
    let z2 = 0.541_196_1 * tmp10 + z5;
    let z4 = 1.306_562_965 * tmp12 + z5;
    let z3 = tmp11 * 0.707_106_781;

    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;

    data[i5] = z13 + z2;
    data[i3] = z13 - z2;
    data[i1] = z11 + z4;
    data[i7] = z11 - z4;
}

#[inline(always)]
fn fdct_float_body(data: &mut FloatBlock) {
    for row in 0..DCTSIZE {
        let b = row * DCTSIZE;
        float_1d(data, [b, b + 1, b + 2, b + 3, b + 4, b + 5, b + 6, b + 7]);
    }
    for col in 0..DCTSIZE {
        float_1d(data, core::array::from_fn(|k| k * DCTSIZE + col));
    }
}

/// Float forward DCT, in place.
pub fn fdct_float(data: &mut FloatBlock) {
    fdct_float_body(data);
}

/// Autovectorized float forward DCT with output identical to [`fdct_float`].
#[multiversion(targets(
    "x86_64+avx2",
    "x86_64+sse4.1",
    "x86+avx2",
    "x86+sse4.1",
    "aarch64+neon",
))]
pub fn fdct_float_multiversion(data: &mut FloatBlock) {
    fdct_float_body(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::AAN_SCALE_FACTORS;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    /// Reference DCT in f64, scaled by 8 like the accurate integer kernel.
    fn reference_dct(input: &IntWorkspace) -> [f64; DCTSIZE2] {
        use std::f64::consts::PI;
        let mut out = [0f64; DCTSIZE2];
        for v in 0..DCTSIZE {
            for u in 0..DCTSIZE {
                let cu = if u == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
                let cv = if v == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
                let mut sum = 0.0;
                for y in 0..DCTSIZE {
                    for x in 0..DCTSIZE {
                        sum += input[y * DCTSIZE + x] as f64
                            * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos()
                            * (((2 * y + 1) as f64 * v as f64 * PI) / 16.0).cos();
                    }
                }
                out[v * DCTSIZE + u] = 0.25 * cu * cv * sum * 8.0;
            }
        }
        out
    }

    fn random_block(rng: &mut XorShiftRng) -> IntWorkspace {
        let mut ws = [0i32; DCTSIZE2];
        for v in ws.iter_mut() {
            *v = rng.random_range(-128..128);
        }
        ws
    }

    #[test]
    fn test_flat_block_dc_only() {
        let mut ws = [100i32; DCTSIZE2];
        fdct_islow(&mut ws);
        // 100 * 64 (sum) / 8 (orthonormal) * 8 (scale)
        assert_eq!(ws[0], 6400);
        assert!(ws[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_convsamp_centers_samples() {
        let mut plane = vec![0u8; 16 * 8];
        for (i, p) in plane.iter_mut().enumerate() {
            *p = (i % 256) as u8;
        }
        let mut ws = [0i32; DCTSIZE2];
        convsamp_int(&plane[8..], 16, &mut ws);
        assert_eq!(ws[0], 8 - 128);
        assert_eq!(ws[8], 24 - 128);

        let mut fws = [0f32; DCTSIZE2];
        convsamp_float(&plane[8..], 16, &mut fws);
        assert_eq!(fws[9], (25 - 128) as f32);
    }

    #[test]
    fn test_islow_matches_reference() {
        let mut rng = XorShiftRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let input = random_block(&mut rng);
            let reference = reference_dct(&input);
            let mut ws = input;
            fdct_islow(&mut ws);
            for i in 0..DCTSIZE2 {
                let diff = (ws[i] as f64 - reference[i]).abs();
                assert!(diff <= 4.0, "coef {} diff {}", i, diff);
            }
        }
    }

    #[test]
    fn test_islow_wide_matches_scalar() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        for _ in 0..100 {
            let input = random_block(&mut rng);
            let mut a = input;
            let mut b = input;
            fdct_islow(&mut a);
            fdct_islow_wide(&mut b);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_ifast_close_to_reference_after_scaling() {
        let mut rng = XorShiftRng::seed_from_u64(11);
        for _ in 0..20 {
            let input = random_block(&mut rng);
            let reference = reference_dct(&input);
            let mut ws = input;
            fdct_ifast(&mut ws);
            for row in 0..DCTSIZE {
                for col in 0..DCTSIZE {
                    let i = row * DCTSIZE + col;
                    // Output carries the AAN scale factors instead of a flat x8
                    let expected =
                        reference[i] * AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col];
                    let tolerance = 24.0 + expected.abs() * 0.01;
                    assert!(
                        (ws[i] as f64 - expected).abs() <= tolerance,
                        "coef {} got {} want {}",
                        i,
                        ws[i],
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn test_float_close_to_reference_after_scaling() {
        let mut rng = XorShiftRng::seed_from_u64(13);
        let input = random_block(&mut rng);
        let reference = reference_dct(&input);
        let mut ws = [0f32; DCTSIZE2];
        for i in 0..DCTSIZE2 {
            ws[i] = input[i] as f32;
        }
        fdct_float(&mut ws);
        for row in 0..DCTSIZE {
            for col in 0..DCTSIZE {
                let i = row * DCTSIZE + col;
                let expected = reference[i] * AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col];
                assert!((ws[i] as f64 - expected).abs() < 0.05, "coef {}", i);
            }
        }
    }

    #[test]
    fn test_accelerated_variants_identical() {
        let mut rng = XorShiftRng::seed_from_u64(17);
        for _ in 0..50 {
            let input = random_block(&mut rng);
            let mut a = input;
            let mut b = input;
            fdct_ifast(&mut a);
            fdct_ifast_multiversion(&mut b);
            assert_eq!(a, b);

            let mut fa = [0f32; DCTSIZE2];
            for i in 0..DCTSIZE2 {
                fa[i] = input[i] as f32;
            }
            let mut fb = fa;
            fdct_float(&mut fa);
            fdct_float_multiversion(&mut fb);
            assert_eq!(fa, fb);
        }
    }
}
