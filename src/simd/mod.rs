//! Kernel selection for the forward transform and quantizer.
//!
//! Every DCT method has a portable kernel and an accelerated kernel that
//! produce identical output. Which one runs is decided once, when the
//! forward-DCT manager is created:
//!
//! 1. A [`CpuCapabilities`] reports whether the host has wide vector units.
//! 2. The caller's [`KernelPreference`] is reconciled with the answer.
//! 3. The chosen [`ForwardKernel`] is stored behind a trait object.
//!
//! The quantizer variant may later be downgraded to portable by
//! `start_pass` when a divisor table cannot use the narrow form.
//!
//! # Architecture
//!
//! ```text
//! simd/
//! ├── mod.rs         # Capabilities, preference and kernel trait
//! └── kernels.rs     # One kernel type per DCT method
//! ```

mod kernels;

pub use kernels::{FloatKernel, IfastKernel, IslowKernel};

use std::fmt;

use crate::error::Result;
use crate::quant::DivisorSet;
use crate::types::{DctBlock, DctMethod, RawBlock};

/// Which implementation of a kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    /// Straight-line scalar code
    Portable,
    /// Vectorized code with identical results
    Accelerated,
}

impl KernelVariant {
    /// Short name used in log output.
    pub const fn name(self) -> &'static str {
        match self {
            KernelVariant::Portable => "portable",
            KernelVariant::Accelerated => "accelerated",
        }
    }
}

/// Caller preference for kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelPreference {
    /// Accelerated when the host supports it
    #[default]
    Auto,
    /// Always portable
    Portable,
    /// Accelerated when the host supports it, with a log note otherwise
    Accelerated,
}

/// Reports host vector capabilities.
pub trait CpuCapabilities {
    /// True when wide vector kernels are worth dispatching to.
    fn has_wide_vectors(&self) -> bool;
}

/// Capabilities of the running CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCpu;

impl CpuCapabilities for HostCpu {
    fn has_wide_vectors(&self) -> bool {
        #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
        {
            is_x86_feature_detected!("avx2") || is_x86_feature_detected!("sse4.1")
        }
        #[cfg(target_arch = "aarch64")]
        {
            true
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
        {
            false
        }
    }
}

/// Fixed answer, for tests and forced dispatch.
#[derive(Debug, Clone, Copy)]
pub struct FixedCpu(pub bool);

impl CpuCapabilities for FixedCpu {
    fn has_wide_vectors(&self) -> bool {
        self.0
    }
}

/// Resolve a preference against the reported capabilities.
pub fn resolve_variant(preference: KernelPreference, caps: &dyn CpuCapabilities) -> KernelVariant {
    match preference {
        KernelPreference::Portable => KernelVariant::Portable,
        KernelPreference::Auto if caps.has_wide_vectors() => KernelVariant::Accelerated,
        KernelPreference::Auto => KernelVariant::Portable,
        KernelPreference::Accelerated => {
            if caps.has_wide_vectors() {
                KernelVariant::Accelerated
            } else {
                log::debug!("accelerated kernels requested but unsupported; using portable");
                KernelVariant::Portable
            }
        }
    }
}

/// A forward transform plus quantizer for one DCT method.
pub trait ForwardKernel: fmt::Debug + Send + Sync {
    /// The DCT method this kernel implements.
    fn method(&self) -> DctMethod;

    /// Variant used for the transform.
    fn dct_variant(&self) -> KernelVariant;

    /// Variant used for quantization.
    fn quantize_variant(&self) -> KernelVariant;

    /// Switch quantization to the portable variant.
    fn use_portable_quantizer(&mut self);

    /// Convert, transform and quantize one 8x8 block.
    ///
    /// `samples` starts at the block's top-left sample with rows `stride`
    /// apart. When `raw` is given it receives the unquantized coefficients
    /// on the accurate-integer scale.
    fn encode_block(
        &self,
        samples: &[u8],
        stride: usize,
        divisors: &DivisorSet,
        coef: &mut DctBlock,
        raw: Option<&mut RawBlock>,
    ) -> Result<()>;
}

/// Build the kernel for `method` using the resolved variant.
pub fn select_forward_kernel(
    method: DctMethod,
    preference: KernelPreference,
    caps: &dyn CpuCapabilities,
) -> Box<dyn ForwardKernel> {
    let variant = resolve_variant(preference, caps);
    log::debug!(
        "forward kernel: method={} variant={}",
        method.name(),
        variant.name()
    );
    match method {
        DctMethod::IntSlow => Box::new(IslowKernel::new(variant)),
        DctMethod::IntFast => Box::new(IfastKernel::new(variant)),
        DctMethod::Float => Box::new(FloatKernel::new(variant)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DCTSIZE2;
    use crate::types::QuantTable;

    #[test]
    fn test_resolve_variant() {
        let yes = FixedCpu(true);
        let no = FixedCpu(false);
        assert_eq!(
            resolve_variant(KernelPreference::Auto, &yes),
            KernelVariant::Accelerated
        );
        assert_eq!(
            resolve_variant(KernelPreference::Auto, &no),
            KernelVariant::Portable
        );
        assert_eq!(
            resolve_variant(KernelPreference::Portable, &yes),
            KernelVariant::Portable
        );
        assert_eq!(
            resolve_variant(KernelPreference::Accelerated, &no),
            KernelVariant::Portable
        );
    }

    #[test]
    fn test_selected_kernels_match_method() {
        for method in [DctMethod::IntSlow, DctMethod::IntFast, DctMethod::Float] {
            let kernel = select_forward_kernel(method, KernelPreference::Auto, &FixedCpu(true));
            assert_eq!(kernel.method(), method);
            assert_eq!(kernel.dct_variant(), KernelVariant::Accelerated);
            assert_eq!(kernel.quantize_variant(), KernelVariant::Accelerated);
        }
    }

    #[test]
    fn test_variants_produce_identical_blocks() {
        let table = QuantTable::new([3; DCTSIZE2]);
        let mut samples = [0u8; DCTSIZE2];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = ((i * 37 + 11) % 256) as u8;
        }
        for method in [DctMethod::IntSlow, DctMethod::IntFast, DctMethod::Float] {
            let divisors = DivisorSet::build(method, &table);
            let portable = select_forward_kernel(method, KernelPreference::Portable, &HostCpu);
            let fast = select_forward_kernel(method, KernelPreference::Auto, &FixedCpu(true));

            let mut a = [0i16; DCTSIZE2];
            let mut b = [0i16; DCTSIZE2];
            let mut ra = [0i32; DCTSIZE2];
            let mut rb = [0i32; DCTSIZE2];
            portable
                .encode_block(&samples, 8, &divisors, &mut a, Some(&mut ra))
                .unwrap();
            fast.encode_block(&samples, 8, &divisors, &mut b, Some(&mut rb))
                .unwrap();
            assert_eq!(a, b, "{:?}", method);
            assert_eq!(ra, rb, "{:?}", method);
        }
    }

    #[test]
    fn test_debug_names_variant() {
        let kernel = select_forward_kernel(
            DctMethod::IntSlow,
            KernelPreference::Portable,
            &HostCpu,
        );
        let text = format!("{:?}", kernel);
        assert!(text.contains("IslowKernel"));
        assert!(text.contains("portable"));
    }
}
