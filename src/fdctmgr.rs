//! Forward-DCT manager.
//!
//! Owns the selected forward kernel and the per-table divisor cache. Call
//! [`ForwardDct::start_pass`] before each pass so divisors reflect the
//! current quantization tables, then [`ForwardDct::forward_dct`] once per
//! row of blocks. When the raw coefficients are kept,
//! [`ForwardDct::quantize_row`] requantizes the row with the trellis.

use crate::consts::{DCTSIZE, NUM_QUANT_TBLS};
use crate::error::{Error, Result};
use crate::quant::{oversized_quant_value, DivisorSet};
use crate::simd::{
    select_forward_kernel, CpuCapabilities, ForwardKernel, HostCpu, KernelPreference,
    KernelVariant,
};
use crate::trellis::{quantize_trellis, QOptAccumulator, TrellisRow};
use crate::types::{ComponentInfo, DctBlock, DctMethod, QuantTable, RawBlock, TrellisConfig};

/// Divisors built for one table slot, remembering the values they came from.
#[derive(Debug, Clone)]
struct CachedDivisors {
    source: QuantTable,
    set: DivisorSet,
}

/// Forward DCT and quantization for a compression run.
#[derive(Debug)]
pub struct ForwardDct {
    kernel: Box<dyn ForwardKernel>,
    cache: [Option<CachedDivisors>; NUM_QUANT_TBLS],
    table_builds: usize,
    trellis: TrellisConfig,
    q_opt: [QOptAccumulator; NUM_QUANT_TBLS],
}

impl ForwardDct {
    /// Create a manager for `method`, querying the running CPU.
    pub fn new(method: DctMethod, preference: KernelPreference) -> Self {
        Self::with_capabilities(method, preference, &HostCpu)
    }

    /// Create a manager for `method` using an explicit capability source.
    pub fn with_capabilities(
        method: DctMethod,
        preference: KernelPreference,
        caps: &dyn CpuCapabilities,
    ) -> Self {
        Self {
            kernel: select_forward_kernel(method, preference, caps),
            cache: Default::default(),
            table_builds: 0,
            trellis: TrellisConfig::default(),
            q_opt: Default::default(),
        }
    }

    /// Replace the trellis settings used by [`ForwardDct::quantize_row`].
    pub fn set_trellis(&mut self, config: TrellisConfig) {
        self.trellis = config;
    }

    /// Current trellis settings.
    pub fn trellis(&self) -> &TrellisConfig {
        &self.trellis
    }

    /// Create a manager from a raw method code.
    pub fn from_method_code(code: u8, preference: KernelPreference) -> Result<Self> {
        Ok(Self::new(DctMethod::try_from(code)?, preference))
    }

    /// DCT method in use.
    pub fn method(&self) -> DctMethod {
        self.kernel.method()
    }

    /// The active kernel.
    pub fn kernel(&self) -> &dyn ForwardKernel {
        self.kernel.as_ref()
    }

    /// Number of divisor tables built so far.
    pub fn table_builds(&self) -> usize {
        self.table_builds
    }

    /// Divisors currently cached for table slot `qtblno`.
    pub fn divisors(&self, qtblno: usize) -> Option<&DivisorSet> {
        self.cache.get(qtblno)?.as_ref().map(|c| &c.set)
    }

    /// Prepare divisors for every component's quantization table and clear
    /// the q_opt statistics.
    ///
    /// Tables whose values would overflow this method's divisors are
    /// rejected. A slot already built from identical table values is reused. If any
    /// table cannot use the narrow quantizer, the kernel falls back to the
    /// portable quantizer for the rest of the run.
    pub fn start_pass(
        &mut self,
        components: &[ComponentInfo],
        qtables: &[Option<QuantTable>],
    ) -> Result<()> {
        let method = self.kernel.method();
        let mut narrow_ok = true;
        self.q_opt = Default::default();

        for comp in components {
            let qtblno = comp.quant_tbl_no as usize;
            let table = match qtables.get(qtblno).and_then(|t| t.as_ref()) {
                Some(table) if qtblno < NUM_QUANT_TBLS => table,
                _ => return Err(Error::NoQuantTable { table: qtblno }),
            };

            if let Some(value) = oversized_quant_value(method, table) {
                return Err(Error::QuantValueOutOfRange {
                    table: qtblno,
                    value,
                });
            }

            let slot = &mut self.cache[qtblno];
            let reusable = slot
                .as_ref()
                .is_some_and(|cached| cached.source.values == table.values);
            if !reusable {
                log::debug!(
                    "building {} divisors for quant table {}",
                    method.name(),
                    qtblno
                );
                *slot = Some(CachedDivisors {
                    source: *table,
                    set: DivisorSet::build(method, table),
                });
                self.table_builds += 1;
            }

            if let Some(cached) = slot.as_ref() {
                narrow_ok &= cached.set.narrow_ok();
            }
        }

        if !narrow_ok && self.kernel.quantize_variant() == KernelVariant::Accelerated {
            log::debug!("divisor out of narrow range; using portable quantizer");
            self.kernel.use_portable_quantizer();
        }
        Ok(())
    }

    /// Transform and quantize one row of blocks for `component`.
    ///
    /// Blocks are read from `samples` starting at (`start_row`, `start_col`)
    /// with rows `stride` apart, one block per entry of `coef_blocks`, left
    /// to right. When `raw` is given, each block's unquantized coefficients
    /// (on the accurate-integer scale) are stored at the same index.
    #[allow(clippy::too_many_arguments)]
    pub fn forward_dct(
        &self,
        component: &ComponentInfo,
        samples: &[u8],
        stride: usize,
        start_row: usize,
        start_col: usize,
        coef_blocks: &mut [DctBlock],
        mut raw: Option<&mut [RawBlock]>,
    ) -> Result<()> {
        let qtblno = component.quant_tbl_no as usize;
        let divisors = self
            .divisors(qtblno)
            .ok_or(Error::BadState("forward_dct before start_pass"))?;

        let num_blocks = coef_blocks.len();
        let right_edge = start_col + num_blocks * DCTSIZE;
        let bottom_edge = (start_row + DCTSIZE - 1) * stride + right_edge;
        if num_blocks > 0 && (right_edge > stride || bottom_edge > samples.len()) {
            return Err(Error::BadState("sample strip smaller than requested blocks"));
        }
        if raw.as_ref().is_some_and(|r| r.len() < num_blocks) {
            return Err(Error::BadState("raw coefficient buffer too short"));
        }

        log::trace!(
            "forward_dct comp={} row={} col={} blocks={}",
            component.component_index,
            start_row,
            start_col,
            num_blocks
        );

        for (bi, coef) in coef_blocks.iter_mut().enumerate() {
            let offset = start_row * stride + start_col + bi * DCTSIZE;
            let raw_block = raw.as_deref_mut().map(|r| &mut r[bi]);
            self.kernel
                .encode_block(&samples[offset..], stride, divisors, coef, raw_block)?;
        }
        Ok(())
    }

    /// Requantize a row of blocks from their raw coefficients.
    ///
    /// With trellis quantization disabled the kernel's rounded levels stand
    /// and only `last_dc` is advanced. Otherwise the row is re-quantized
    /// against the table `start_pass` cached for `component`, and with
    /// `q_opt` set its levels feed that table's statistics.
    pub fn quantize_row(
        &mut self,
        component: &ComponentInfo,
        raw: &[RawBlock],
        coef_blocks: &mut [DctBlock],
        row: &TrellisRow<'_>,
        last_dc: &mut i16,
    ) -> Result<()> {
        if !self.trellis.enabled {
            if row.ss == 0 {
                if let Some(block) = coef_blocks.last() {
                    *last_dc = block[0];
                }
            }
            return Ok(());
        }

        let qtblno = component.quant_tbl_no as usize;
        let cached = self
            .cache
            .get(qtblno)
            .and_then(|c| c.as_ref())
            .ok_or(Error::BadState("quantize_row before start_pass"))?;
        let q_opt = if self.trellis.q_opt {
            Some(&mut self.q_opt[qtblno])
        } else {
            None
        };
        quantize_trellis(raw, coef_blocks, &cached.source, row, &self.trellis, last_dc, q_opt)
    }

    /// q_opt statistics gathered for table slot `qtblno` this pass.
    pub fn q_opt_stats(&self, qtblno: usize) -> Option<&QOptAccumulator> {
        if !self.trellis.q_opt {
            return None;
        }
        self.q_opt.get(qtblno)
    }

    /// Divisors suggested by this pass's q_opt statistics for slot `qtblno`.
    pub fn suggested_quant_table(&self, qtblno: usize) -> Option<QuantTable> {
        let stats = self.q_opt_stats(qtblno)?;
        let cached = self.cache.get(qtblno)?.as_ref()?;
        Some(stats.derive_quant_values(&cached.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{DCTSIZE2, STD_CHROMINANCE_QUANT_TBL, STD_LUMINANCE_QUANT_TBL};
    use crate::huffman::{std_ac_luma, std_dc_luma, DerivedTable};
    use crate::simd::FixedCpu;

    fn tables() -> [Option<QuantTable>; NUM_QUANT_TBLS] {
        [
            Some(QuantTable::new(STD_LUMINANCE_QUANT_TBL)),
            Some(QuantTable::new(STD_CHROMINANCE_QUANT_TBL)),
            None,
            None,
        ]
    }

    #[test]
    fn test_start_pass_shares_tables() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        let comps = ComponentInfo::ycbcr();
        fdct.start_pass(&comps, &tables()).unwrap();
        // Cb and Cr share table 1
        assert_eq!(fdct.table_builds(), 2);

        // Same tables on the next pass: nothing rebuilt
        fdct.start_pass(&comps, &tables()).unwrap();
        assert_eq!(fdct.table_builds(), 2);

        // Changing a table rebuilds only that slot
        let mut changed = tables();
        changed[1] = Some(QuantTable::new([7; DCTSIZE2]));
        fdct.start_pass(&comps, &changed).unwrap();
        assert_eq!(fdct.table_builds(), 3);
    }

    #[test]
    fn test_missing_table_reported() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        let mut comps = ComponentInfo::ycbcr();
        comps[2].quant_tbl_no = 2;
        assert_eq!(
            fdct.start_pass(&comps, &tables()).unwrap_err(),
            Error::NoQuantTable { table: 2 }
        );

        comps[2].quant_tbl_no = 7;
        assert_eq!(
            fdct.start_pass(&comps, &tables()).unwrap_err(),
            Error::NoQuantTable { table: 7 }
        );
    }

    #[test]
    fn test_unknown_method_code() {
        assert_eq!(
            ForwardDct::from_method_code(9, KernelPreference::Auto).unwrap_err(),
            Error::UnsupportedMethod("DCT method")
        );
    }

    #[test]
    fn test_narrow_downgrade() {
        let mut fdct = ForwardDct::with_capabilities(
            DctMethod::IntFast,
            KernelPreference::Auto,
            &FixedCpu(true),
        );
        assert_eq!(fdct.kernel().quantize_variant(), KernelVariant::Accelerated);

        let ones = [Some(QuantTable::new([1; DCTSIZE2])), None, None, None];
        fdct.start_pass(&[ComponentInfo::new(0, 0)], &ones).unwrap();
        assert_eq!(fdct.kernel().quantize_variant(), KernelVariant::Portable);
        assert_eq!(fdct.kernel().dct_variant(), KernelVariant::Accelerated);
    }

    #[test]
    fn test_forward_dct_before_start_pass() {
        let fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        let samples = [128u8; DCTSIZE2];
        let mut blocks = [[0i16; DCTSIZE2]; 1];
        assert!(fdct
            .forward_dct(&ComponentInfo::new(0, 0), &samples, 8, 0, 0, &mut blocks, None)
            .is_err());
    }

    #[test]
    fn test_forward_dct_row_of_blocks() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        let flat = [Some(QuantTable::new([1; DCTSIZE2])), None, None, None];
        let comp = ComponentInfo::new(0, 0);
        fdct.start_pass(&[comp], &flat).unwrap();

        // Two blocks side by side, 16 rows tall; use the lower row of blocks
        let stride = 16;
        let mut plane = vec![0u8; stride * 16];
        for y in 8..16 {
            for x in 0..8 {
                plane[y * stride + x] = 138;
            }
            for x in 8..16 {
                plane[y * stride + x] = 118;
            }
        }
        let mut blocks = [[0i16; DCTSIZE2]; 2];
        let mut raw = [[0i32; DCTSIZE2]; 2];
        fdct.forward_dct(&comp, &plane, stride, 8, 0, &mut blocks, Some(&mut raw))
            .unwrap();

        // +10 and -10 over 64 samples: DC 640/-640 raw, 80/-80 quantized (q=1 -> /8)
        assert_eq!(raw[0][0], 640);
        assert_eq!(raw[1][0], -640);
        assert_eq!(blocks[0][0], 80);
        assert_eq!(blocks[1][0], -80);
        assert!(blocks.iter().all(|b| b[1..].iter().all(|&c| c == 0)));
    }

    #[test]
    fn test_forward_dct_bounds_checked() {
        let mut fdct = ForwardDct::new(DctMethod::Float, KernelPreference::Auto);
        let comp = ComponentInfo::new(0, 0);
        fdct.start_pass(&[comp], &tables()).unwrap();
        let plane = vec![0u8; 8 * 8];
        let mut blocks = [[0i16; DCTSIZE2]; 2];
        assert!(fdct
            .forward_dct(&comp, &plane, 8, 0, 0, &mut blocks, None)
            .is_err());
    }

    #[test]
    fn test_oversized_quant_values_rejected() {
        let coarse = [Some(QuantTable::new([8192; DCTSIZE2])), None, None, None];
        let comp = ComponentInfo::new(0, 0);

        let mut islow = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        assert_eq!(
            islow.start_pass(&[comp], &coarse).unwrap_err(),
            Error::QuantValueOutOfRange {
                table: 0,
                value: 8192
            }
        );
        assert_eq!(islow.table_builds(), 0);

        let mut ifast = ForwardDct::new(DctMethod::IntFast, KernelPreference::Auto);
        let mut values = [16u16; DCTSIZE2];
        values[9] = 4300;
        let ifast_tables = [Some(QuantTable::new(values)), None, None, None];
        assert_eq!(
            ifast.start_pass(&[comp], &ifast_tables).unwrap_err(),
            Error::QuantValueOutOfRange {
                table: 0,
                value: 4300
            }
        );

        // The float path has no integer divisors to overflow
        let mut float = ForwardDct::new(DctMethod::Float, KernelPreference::Auto);
        assert!(float.start_pass(&[comp], &coarse).is_ok());
    }

    /// A 16x8 strip: a horizontal ramp on the left block, noise-like
    /// texture on the right.
    fn textured_strip() -> Vec<u8> {
        (0..8 * 16)
            .map(|i| {
                let (y, x) = (i / 16, i % 16);
                if x < 8 {
                    (60 + x * 12 + y) as u8
                } else {
                    ((x * 37 + y * 91) % 200 + 20) as u8
                }
            })
            .collect()
    }

    #[test]
    fn test_quantize_row_disabled_keeps_kernel_levels() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Portable);
        fdct.set_trellis(TrellisConfig {
            enabled: false,
            q_opt: true,
            ..TrellisConfig::default()
        });
        let comp = ComponentInfo::new(0, 0);
        fdct.start_pass(&[comp], &tables()).unwrap();

        let strip = textured_strip();
        let mut blocks = [[0i16; DCTSIZE2]; 2];
        let mut raw = [[0i32; DCTSIZE2]; 2];
        fdct.forward_dct(&comp, &strip, 16, 0, 0, &mut blocks, Some(&mut raw))
            .unwrap();
        let kernel_levels = blocks;

        let ac = DerivedTable::from_huff_table(&std_ac_luma(), false).unwrap();
        let mut last_dc = 0;
        fdct.quantize_row(&comp, &raw, &mut blocks, &TrellisRow::new(&ac, 0, 63), &mut last_dc)
            .unwrap();
        assert_eq!(blocks, kernel_levels);
        assert_eq!(last_dc, blocks[1][0]);
        assert_eq!(fdct.q_opt_stats(0).map(|s| s.coef_sum(0)), Some(0.0));
    }

    #[test]
    fn test_quantize_row_runs_trellis_with_cached_table() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Portable);
        fdct.set_trellis(TrellisConfig {
            q_opt: true,
            ..TrellisConfig::default()
        });
        let comp = ComponentInfo::new(0, 0);
        let qtables = tables();
        fdct.start_pass(&[comp], &qtables).unwrap();

        let strip = textured_strip();
        let mut blocks = [[0i16; DCTSIZE2]; 2];
        let mut raw = [[0i32; DCTSIZE2]; 2];
        fdct.forward_dct(&comp, &strip, 16, 0, 0, &mut blocks, Some(&mut raw))
            .unwrap();

        let ac = DerivedTable::from_huff_table(&std_ac_luma(), false).unwrap();
        let dc = DerivedTable::from_huff_table(&std_dc_luma(), true).unwrap();
        let row = TrellisRow::new(&ac, 0, 63).with_dc_table(&dc);
        let mut last_dc = 0;
        fdct.quantize_row(&comp, &raw, &mut blocks, &row, &mut last_dc)
            .unwrap();

        let mut expected = [[0i16; DCTSIZE2]; 2];
        let mut expected_dc = 0;
        let luma = qtables[0].unwrap();
        quantize_trellis(
            &raw,
            &mut expected,
            &luma,
            &row,
            fdct.trellis(),
            &mut expected_dc,
            None,
        )
        .unwrap();
        assert_eq!(blocks, expected);
        assert_eq!(last_dc, expected_dc);

        // The bright ramp has a nonzero DC, so its statistics were recorded
        assert!(blocks[0][0] != 0);
        assert!(fdct.q_opt_stats(0).is_some_and(|s| s.coef_sum(0) > 0.0));
        let suggested = fdct.suggested_quant_table(0).unwrap();
        assert!(suggested.values.iter().all(|&v| (1..=255).contains(&v)));

        // A new pass clears the statistics
        fdct.start_pass(&[comp], &qtables).unwrap();
        assert_eq!(fdct.q_opt_stats(0).map(|s| s.coef_sum(0)), Some(0.0));

        // Without q_opt nothing is exposed
        fdct.set_trellis(TrellisConfig::default());
        assert!(fdct.q_opt_stats(0).is_none());
        assert!(fdct.suggested_quant_table(0).is_none());
    }

    #[test]
    fn test_quantize_row_before_start_pass() {
        let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
        let ac = DerivedTable::from_huff_table(&std_ac_luma(), false).unwrap();
        let raw = [[0i32; DCTSIZE2]; 1];
        let mut blocks = [[0i16; DCTSIZE2]; 1];
        assert_eq!(
            fdct.quantize_row(
                &ComponentInfo::new(0, 0),
                &raw,
                &mut blocks,
                &TrellisRow::new(&ac, 0, 63),
                &mut 0,
            )
            .unwrap_err(),
            Error::BadState("quantize_row before start_pass")
        );
    }
}
