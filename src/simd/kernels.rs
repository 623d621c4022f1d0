//! Kernel implementations, one per DCT method.

use std::fmt;

use super::{ForwardKernel, KernelVariant};
use crate::consts::{AAN_SCALES, AAN_SCALE_FACTORS, DCTSIZE, DCTSIZE2};
use crate::error::{Error, Result};
use crate::fdct::{
    convsamp_float, convsamp_int, fdct_float, fdct_float_multiversion, fdct_ifast,
    fdct_ifast_multiversion, fdct_islow, fdct_islow_wide, IntWorkspace,
};
use crate::quant::{
    quantize_float, quantize_float_multiversion, quantize_int, quantize_int_narrow, DivisorSet,
    DivisorTable,
};
use crate::types::{DctBlock, DctMethod, FloatBlock, RawBlock};

fn int_divisors<'a>(divisors: &'a DivisorSet, method: DctMethod) -> Result<&'a DivisorTable> {
    match divisors {
        DivisorSet::Int(table) => Ok(table.as_ref()),
        DivisorSet::Float(_) => {
            log::error!("{} kernel handed float divisors", method.name());
            Err(Error::BadState("divisor table does not match DCT method"))
        }
    }
}

fn quantize_with(
    variant: KernelVariant,
    workspace: &IntWorkspace,
    divisors: &DivisorTable,
    coef: &mut DctBlock,
) {
    match variant {
        KernelVariant::Portable => quantize_int(workspace, divisors, coef),
        KernelVariant::Accelerated => quantize_int_narrow(workspace, divisors, coef),
    }
}

/// Manual Debug so logs show variant names.
fn debug_kernel(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    dct: KernelVariant,
    quantize: KernelVariant,
) -> fmt::Result {
    f.debug_struct(name)
        .field("dct", &dct.name())
        .field("quantize", &quantize.name())
        .finish()
}

// =============================================================================
// Accurate integer
// =============================================================================

/// Accurate integer DCT with reciprocal quantization.
pub struct IslowKernel {
    dct: KernelVariant,
    quantize: KernelVariant,
}

impl IslowKernel {
    /// Kernel using `variant` for both stages.
    pub fn new(variant: KernelVariant) -> Self {
        Self {
            dct: variant,
            quantize: variant,
        }
    }
}

impl fmt::Debug for IslowKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_kernel(f, "IslowKernel", self.dct, self.quantize)
    }
}

impl ForwardKernel for IslowKernel {
    fn method(&self) -> DctMethod {
        DctMethod::IntSlow
    }

    fn dct_variant(&self) -> KernelVariant {
        self.dct
    }

    fn quantize_variant(&self) -> KernelVariant {
        self.quantize
    }

    fn use_portable_quantizer(&mut self) {
        self.quantize = KernelVariant::Portable;
    }

    fn encode_block(
        &self,
        samples: &[u8],
        stride: usize,
        divisors: &DivisorSet,
        coef: &mut DctBlock,
        raw: Option<&mut RawBlock>,
    ) -> Result<()> {
        let divisors = int_divisors(divisors, DctMethod::IntSlow)?;
        let mut ws: IntWorkspace = [0; DCTSIZE2];
        convsamp_int(samples, stride, &mut ws);
        match self.dct {
            KernelVariant::Portable => fdct_islow(&mut ws),
            KernelVariant::Accelerated => fdct_islow_wide(&mut ws),
        }
        if let Some(raw) = raw {
            // Already on the x8 scale
            *raw = ws;
        }
        quantize_with(self.quantize, &ws, divisors, coef);
        Ok(())
    }
}

// =============================================================================
// Fast integer
// =============================================================================

/// Fast integer (AAN) DCT with reciprocal quantization.
pub struct IfastKernel {
    dct: KernelVariant,
    quantize: KernelVariant,
}

impl IfastKernel {
    /// Kernel using `variant` for both stages.
    pub fn new(variant: KernelVariant) -> Self {
        Self {
            dct: variant,
            quantize: variant,
        }
    }
}

impl fmt::Debug for IfastKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_kernel(f, "IfastKernel", self.dct, self.quantize)
    }
}

/// Remove the AAN scaling from a fast-DCT output, rounding half away from zero.
#[inline]
fn ifast_to_islow_scale(x: i32, aan_scale: i32) -> i32 {
    let x = x as i64 * (1 << 15);
    let s = aan_scale as i64;
    let v = if x >= 0 {
        (x + s) / (2 * s)
    } else {
        (x - s) / (2 * s)
    };
    v as i32
}

impl ForwardKernel for IfastKernel {
    fn method(&self) -> DctMethod {
        DctMethod::IntFast
    }

    fn dct_variant(&self) -> KernelVariant {
        self.dct
    }

    fn quantize_variant(&self) -> KernelVariant {
        self.quantize
    }

    fn use_portable_quantizer(&mut self) {
        self.quantize = KernelVariant::Portable;
    }

    fn encode_block(
        &self,
        samples: &[u8],
        stride: usize,
        divisors: &DivisorSet,
        coef: &mut DctBlock,
        raw: Option<&mut RawBlock>,
    ) -> Result<()> {
        let divisors = int_divisors(divisors, DctMethod::IntFast)?;
        let mut ws: IntWorkspace = [0; DCTSIZE2];
        convsamp_int(samples, stride, &mut ws);
        match self.dct {
            KernelVariant::Portable => fdct_ifast(&mut ws),
            KernelVariant::Accelerated => fdct_ifast_multiversion(&mut ws),
        }
        if let Some(raw) = raw {
            for i in 0..DCTSIZE2 {
                raw[i] = ifast_to_islow_scale(ws[i], AAN_SCALES[i]);
            }
        }
        quantize_with(self.quantize, &ws, divisors, coef);
        Ok(())
    }
}

// =============================================================================
// Float
// =============================================================================

/// Float (AAN) DCT with multiply-and-bias quantization.
pub struct FloatKernel {
    dct: KernelVariant,
    quantize: KernelVariant,
}

impl FloatKernel {
    /// Kernel using `variant` for both stages.
    pub fn new(variant: KernelVariant) -> Self {
        Self {
            dct: variant,
            quantize: variant,
        }
    }
}

impl fmt::Debug for FloatKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_kernel(f, "FloatKernel", self.dct, self.quantize)
    }
}

impl ForwardKernel for FloatKernel {
    fn method(&self) -> DctMethod {
        DctMethod::Float
    }

    fn dct_variant(&self) -> KernelVariant {
        self.dct
    }

    fn quantize_variant(&self) -> KernelVariant {
        self.quantize
    }

    fn use_portable_quantizer(&mut self) {
        self.quantize = KernelVariant::Portable;
    }

    fn encode_block(
        &self,
        samples: &[u8],
        stride: usize,
        divisors: &DivisorSet,
        coef: &mut DctBlock,
        raw: Option<&mut RawBlock>,
    ) -> Result<()> {
        let divisors = match divisors {
            DivisorSet::Float(table) => table,
            DivisorSet::Int(_) => {
                log::error!("float kernel handed integer divisors");
                return Err(Error::BadState("divisor table does not match DCT method"));
            }
        };
        let mut ws: FloatBlock = [0.0; DCTSIZE2];
        convsamp_float(samples, stride, &mut ws);
        match self.dct {
            KernelVariant::Portable => fdct_float(&mut ws),
            KernelVariant::Accelerated => fdct_float_multiversion(&mut ws),
        }
        if let Some(raw) = raw {
            for row in 0..DCTSIZE {
                for col in 0..DCTSIZE {
                    let i = row * DCTSIZE + col;
                    let scale = AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col];
                    raw[i] = (ws[i] as f64 / scale).round() as i32;
                }
            }
        }
        match self.quantize {
            KernelVariant::Portable => quantize_float(&ws, divisors, coef),
            KernelVariant::Accelerated => quantize_float_multiversion(&ws, divisors, coef),
        }
        Ok(())
    }
}
