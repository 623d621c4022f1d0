//! Quantization: reciprocal divisors, divisor tables and block quantizers.
//!
//! Integer quantization never divides. Each divisor `d` is replaced by a
//! reciprocal triple (multiplier, rounding correction, shift) such that
//!
//! ```text
//! q = sign(x) * (((|x| + corr) * recip) >> (shift + 16))
//! ```
//!
//! equals round-half-away-from-zero of `x / d` for every dividend a
//! transform can produce. The "narrow" form splits the shift into two
//! 16-bit high-half multiplies (`recip`, then `scale`), which is what vector
//! units provide; it is only valid when `scale` fits in 16 bits.
//!
//! Float quantization multiplies by precomputed reciprocals and rounds with
//! a biased truncation.

use multiversion::multiversion;

use crate::consts::{AAN_SCALES, AAN_SCALE_FACTORS, DCTSIZE, DCTSIZE2};
use crate::consts::{STD_CHROMINANCE_QUANT_TBL, STD_LUMINANCE_QUANT_TBL};
use crate::types::{DctBlock, DctMethod, FloatBlock, QuantTable};

// =============================================================================
// Reciprocal divisors
// =============================================================================

/// Reciprocal form of a single divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reciprocal {
    /// Fixed-point reciprocal multiplier
    pub recip: u32,
    /// Rounding correction added to the magnitude
    pub corr: u32,
    /// Second-stage multiplier for the narrow (two high-half multiply) form
    pub scale: u32,
    /// Post-shift, relative to 16
    pub shift: i32,
}

impl Reciprocal {
    /// Total right shift applied after the reciprocal multiply.
    #[inline]
    pub const fn total_shift(&self) -> u32 {
        (self.shift + 16) as u32
    }

    /// Quantize a single value with round-half-away-from-zero semantics.
    #[inline]
    pub fn divide(&self, x: i32) -> i32 {
        let mag = x.unsigned_abs() as u64 + self.corr as u64;
        let q = ((mag * self.recip as u64) >> self.total_shift()) as i32;
        if x < 0 {
            -q
        } else {
            q
        }
    }

    /// Same result as [`Reciprocal::divide`], computed as two 16-bit
    /// high-half multiplies.
    #[inline]
    pub fn divide_narrow(&self, x: i32) -> i32 {
        let mag = x.unsigned_abs() as u64 + self.corr as u64;
        let t = (mag * self.recip as u64) >> 16;
        let q = ((t * self.scale as u64) >> 16) as i32;
        if x < 0 {
            -q
        } else {
            q
        }
    }
}

/// Compute the reciprocal form of `divisor`.
///
/// Divisors above 65535 saturate and zero is treated as 1. Returns the
/// reciprocal and whether the narrow form is valid for it (false only for
/// divisors 1 and 2).
pub fn compute_reciprocal(divisor: u32) -> (Reciprocal, bool) {
    let d = divisor.clamp(1, u16::MAX as u32);

    if d == 1 {
        // Identity: multiply by one, no rounding, no shift
        return (
            Reciprocal {
                recip: 1,
                corr: 0,
                scale: 1,
                shift: -16,
            },
            false,
        );
    }

    let b = 31 - d.leading_zeros(); // floor(log2(d))
    let mut r = 16 + b;
    let mut fq = (1u64 << r) / d as u64;
    let fr = (1u64 << r) % d as u64;
    let mut c = d / 2;

    if fr == 0 {
        // Power of two: fq is exact, halve it to stay within 16 bits
        fq >>= 1;
        r -= 1;
    } else if fr <= (d / 2) as u64 {
        c += 1;
    } else {
        fq += 1;
    }

    (
        Reciprocal {
            recip: fq as u32,
            corr: c,
            scale: 1u32 << (32 - r),
            shift: r as i32 - 16,
        },
        r > 16,
    )
}

// =============================================================================
// Divisor tables
// =============================================================================

/// Reciprocal divisors for one quantization table, natural order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisorTable {
    /// One reciprocal per coefficient position
    pub entries: [Reciprocal; DCTSIZE2],
    /// True when every entry supports the narrow two-multiply form
    pub narrow_ok: bool,
}

impl DivisorTable {
    fn from_divisors(divisors: impl Iterator<Item = u32>) -> Self {
        let mut entries = [Reciprocal::default(); DCTSIZE2];
        let mut narrow_ok = true;
        for (entry, d) in entries.iter_mut().zip(divisors) {
            let (recip, ok) = compute_reciprocal(d);
            *entry = recip;
            narrow_ok &= ok;
        }
        Self { entries, narrow_ok }
    }

    /// Divisors for the accurate integer DCT: `q * 8`.
    pub fn islow(table: &QuantTable) -> Self {
        Self::from_divisors(table.values.iter().map(|&q| islow_divisor(q)))
    }

    /// Divisors for the fast integer DCT, folding in the AAN output scaling.
    pub fn ifast(table: &QuantTable) -> Self {
        Self::from_divisors(
            table
                .values
                .iter()
                .zip(AAN_SCALES.iter())
                .map(|(&q, &s)| ifast_divisor(q, s)),
        )
    }
}

#[inline]
fn islow_divisor(q: u16) -> u32 {
    (q as u32) << 3
}

#[inline]
fn ifast_divisor(q: u16, scale: i32) -> u32 {
    const SHIFT: i64 = 11; // AAN_SCALE_BITS - 3
    let prod = q as i64 * scale as i64;
    ((prod + (1 << (SHIFT - 1))) >> SHIFT) as u32
}

/// First value in `table` whose integer divisor under `method` does not fit
/// in 16 bits, if any.
///
/// Such a divisor would saturate in [`compute_reciprocal`] and quantize by
/// the wrong amount. The float method has no limit.
pub fn oversized_quant_value(method: DctMethod, table: &QuantTable) -> Option<u16> {
    let limit = u16::MAX as u32;
    match method {
        DctMethod::IntSlow => table
            .values
            .iter()
            .copied()
            .find(|&q| islow_divisor(q) > limit),
        DctMethod::IntFast => table
            .values
            .iter()
            .zip(AAN_SCALES.iter())
            .find(|&(&q, &s)| ifast_divisor(q, s) > limit)
            .map(|(&q, _)| q),
        DctMethod::Float => None,
    }
}

/// Multipliers for the float DCT: `1 / (q * sf[row] * sf[col] * 8)`.
pub fn float_divisors(table: &QuantTable) -> FloatBlock {
    let mut out = [0f32; DCTSIZE2];
    for row in 0..DCTSIZE {
        for col in 0..DCTSIZE {
            let i = row * DCTSIZE + col;
            let q = table.values[i].max(1) as f64;
            out[i] = (1.0 / (q * AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col] * 8.0)) as f32;
        }
    }
    out
}

/// Divisors prepared for one quantization table under one DCT method.
#[derive(Debug, Clone, PartialEq)]
pub enum DivisorSet {
    /// Reciprocal divisors for the integer methods
    Int(Box<DivisorTable>),
    /// Multipliers for the float method
    Float(Box<FloatBlock>),
}

impl DivisorSet {
    /// Build the divisors `method` needs for `table`.
    pub fn build(method: DctMethod, table: &QuantTable) -> Self {
        match method {
            DctMethod::IntSlow => DivisorSet::Int(Box::new(DivisorTable::islow(table))),
            DctMethod::IntFast => DivisorSet::Int(Box::new(DivisorTable::ifast(table))),
            DctMethod::Float => DivisorSet::Float(Box::new(float_divisors(table))),
        }
    }

    /// Whether the narrow quantizer may be used with these divisors.
    pub fn narrow_ok(&self) -> bool {
        match self {
            DivisorSet::Int(table) => table.narrow_ok,
            DivisorSet::Float(_) => true,
        }
    }
}

// =============================================================================
// Block quantizers
// =============================================================================

#[inline]
fn clamp_coef(q: i32) -> i16 {
    q.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Quantize an integer workspace with full-width reciprocal arithmetic.
pub fn quantize_int(workspace: &[i32; DCTSIZE2], divisors: &DivisorTable, out: &mut DctBlock) {
    for i in 0..DCTSIZE2 {
        out[i] = clamp_coef(divisors.entries[i].divide(workspace[i]));
    }
}

/// Quantize an integer workspace with the narrow two-multiply form.
///
/// Requires `divisors.narrow_ok`; produces results identical to
/// [`quantize_int`].
#[multiversion(targets(
    "x86_64+avx2",
    "x86_64+sse4.1",
    "x86+avx2",
    "x86+sse4.1",
    "aarch64+neon",
))]
pub fn quantize_int_narrow(workspace: &[i32; DCTSIZE2], divisors: &DivisorTable, out: &mut DctBlock) {
    for i in 0..DCTSIZE2 {
        out[i] = clamp_coef(divisors.entries[i].divide_narrow(workspace[i]));
    }
}

/// Quantize a float workspace.
///
/// Rounds by adding a bias of 16384.5, truncating toward zero and removing
/// the bias, which rounds half up for the magnitudes a transform produces.
pub fn quantize_float(workspace: &FloatBlock, divisors: &FloatBlock, out: &mut DctBlock) {
    for i in 0..DCTSIZE2 {
        let temp = workspace[i] * divisors[i];
        out[i] = ((temp + 16384.5) as i32 - 16384) as i16;
    }
}

/// Vectorizable variant of [`quantize_float`] with identical output.
#[multiversion(targets(
    "x86_64+avx2",
    "x86_64+sse4.1",
    "x86+avx2",
    "x86+sse4.1",
    "aarch64+neon",
))]
pub fn quantize_float_multiversion(workspace: &FloatBlock, divisors: &FloatBlock, out: &mut DctBlock) {
    for i in 0..DCTSIZE2 {
        let temp = workspace[i] * divisors[i];
        out[i] = ((temp + 16384.5) as i32 - 16384) as i16;
    }
}

// =============================================================================
// Quality scaling
// =============================================================================

/// Convert a 1-100 quality rating into a percentage scale factor.
///
/// Quality 50 maps to 100 (tables as-is); lower qualities scale up
/// hyperbolically, higher ones linearly down to 0 at quality 100.
pub fn quality_to_scale_factor(quality: u8) -> u32 {
    let q = quality.clamp(1, 100) as u32;
    if q < 50 {
        5000 / q
    } else {
        200 - q * 2
    }
}

/// Standard luminance and chrominance tables for the given quality.
pub fn create_quant_tables(quality: u8, force_baseline: bool) -> (QuantTable, QuantTable) {
    let scale = quality_to_scale_factor(quality);
    (
        QuantTable::scaled(&STD_LUMINANCE_QUANT_TBL, scale, force_baseline),
        QuantTable::scaled(&STD_CHROMINANCE_QUANT_TBL, scale, force_baseline),
    )
}
