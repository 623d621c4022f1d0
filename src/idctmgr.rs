//! Inverse-DCT manager for the decode side.
//!
//! The kernel for each component is fixed when the manager is created,
//! from the component's output block size and the configured method. The
//! reduced-size kernels always dequantize with accurate-integer multipliers.
//!
//! Multiplier tables are captured from the quantization table that is
//! current when a component first appears in a scan. Later changes to that
//! table slot do not affect a component that already has its multipliers.

use crate::consts::{
    AAN_SCALES, AAN_SCALE_BITS, AAN_SCALE_FACTORS, DCTSIZE, DCTSIZE2, IFAST_SCALE_BITS,
    NUM_QUANT_TBLS, ZIG,
};
use crate::error::{Error, Result};
use crate::idct::{idct_1x1, idct_2x2, idct_4x4, idct_float, idct_ifast, idct_islow};
use crate::types::{ComponentInfo, DctBlock, DctMethod, DqtTable, ScanInfo};

/// Inverse kernel chosen for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdctKind {
    /// Accurate integer 8x8
    Islow,
    /// Fast integer 8x8
    Ifast,
    /// Float 8x8
    Float,
    /// 4x4 output
    Reduced4,
    /// 2x2 output
    Reduced2,
    /// Single DC sample
    Reduced1,
}

impl IdctKind {
    /// Pick the kernel for an output block size and configured method.
    pub fn select(component: usize, size: usize, method: DctMethod) -> Result<Self> {
        match size {
            1 => Ok(IdctKind::Reduced1),
            2 => Ok(IdctKind::Reduced2),
            4 => Ok(IdctKind::Reduced4),
            DCTSIZE => Ok(match method {
                DctMethod::IntSlow => IdctKind::Islow,
                DctMethod::IntFast => IdctKind::Ifast,
                DctMethod::Float => IdctKind::Float,
            }),
            _ => Err(Error::BadDctSize { component, size }),
        }
    }

    /// Method whose multiplier representation this kernel consumes.
    pub const fn table_method(self) -> DctMethod {
        match self {
            IdctKind::Ifast => DctMethod::IntFast,
            IdctKind::Float => DctMethod::Float,
            _ => DctMethod::IntSlow,
        }
    }

    /// Width and height of the produced sample block.
    pub const fn output_size(self) -> usize {
        match self {
            IdctKind::Islow | IdctKind::Ifast | IdctKind::Float => DCTSIZE,
            IdctKind::Reduced4 => 4,
            IdctKind::Reduced2 => 2,
            IdctKind::Reduced1 => 1,
        }
    }
}

/// Dequantization multipliers in natural order.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiplierTable {
    /// Integer multipliers (accurate and fast integer kernels)
    Int(Box<[i32; DCTSIZE2]>),
    /// Float multipliers
    Float(Box<[f32; DCTSIZE2]>),
}

impl MultiplierTable {
    /// Build the multipliers `method` expects from a zigzag-ordered table.
    pub fn build(method: DctMethod, table: &DqtTable) -> Self {
        let q = |natural: usize| table.quantval[ZIG[natural]];
        match method {
            DctMethod::IntSlow => {
                MultiplierTable::Int(Box::new(core::array::from_fn(|i| q(i) as i32)))
            }
            DctMethod::IntFast => {
                const SHIFT: i32 = AAN_SCALE_BITS - IFAST_SCALE_BITS;
                MultiplierTable::Int(Box::new(core::array::from_fn(|i| {
                    let prod = q(i) as i64 * AAN_SCALES[i] as i64;
                    ((prod + (1 << (SHIFT - 1))) >> SHIFT) as i32
                })))
            }
            DctMethod::Float => MultiplierTable::Float(Box::new(core::array::from_fn(|i| {
                let (row, col) = (i / DCTSIZE, i % DCTSIZE);
                (q(i) as f64 * AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col]) as f32
            }))),
        }
    }
}

#[derive(Debug, Clone)]
struct ComponentSlot {
    kind: IdctKind,
    quant_tbl_no: u8,
    needed: bool,
    table: Option<MultiplierTable>,
}

/// Per-component dequantization and inverse transform for a decompression run.
#[derive(Debug, Clone)]
pub struct InverseDct {
    slots: Vec<ComponentSlot>,
}

impl InverseDct {
    /// Select a kernel for every component.
    ///
    /// Fails with [`Error::BadDctSize`] if a component requests an output
    /// size other than 8, 4, 2 or 1.
    pub fn new(components: &[ComponentInfo], method: DctMethod) -> Result<Self> {
        let slots = components
            .iter()
            .enumerate()
            .map(|(ci, comp)| {
                let kind = IdctKind::select(ci, comp.dct_scaled_size as usize, method)?;
                log::debug!("component {}: inverse kernel {:?}", ci, kind);
                Ok(ComponentSlot {
                    kind,
                    quant_tbl_no: comp.quant_tbl_no,
                    needed: comp.component_needed,
                    table: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    /// Kernel selected for component `ci`.
    pub fn kind(&self, ci: usize) -> Option<IdctKind> {
        self.slots.get(ci).map(|s| s.kind)
    }

    /// Multiplier table captured for component `ci`, if any.
    pub fn multipliers(&self, ci: usize) -> Option<&MultiplierTable> {
        self.slots.get(ci)?.table.as_ref()
    }

    /// Capture multiplier tables for the components of an input scan.
    pub fn start_input_pass(&mut self, scan: &ScanInfo, qtables: &[Option<DqtTable>]) -> Result<()> {
        for &ci in scan.components() {
            let ci = ci as usize;
            let slot = self
                .slots
                .get_mut(ci)
                .ok_or(Error::InvalidComponentIndex(ci))?;
            let qtblno = slot.quant_tbl_no as usize;
            let table = qtables
                .get(qtblno)
                .and_then(|t| t.as_ref())
                .filter(|_| qtblno < NUM_QUANT_TBLS)
                .ok_or(Error::NoQuantTable { table: qtblno })?;
            if slot.table.is_some() {
                continue;
            }
            let method = slot.kind.table_method();
            log::debug!(
                "component {}: {} multipliers from quant table {}",
                ci,
                method.name(),
                qtblno
            );
            slot.table = Some(MultiplierTable::build(method, table));
        }
        Ok(())
    }

    /// Check that every needed component has its multipliers.
    pub fn start_output_pass(&self) -> Result<()> {
        for slot in &self.slots {
            if slot.needed && slot.table.is_none() {
                return Err(Error::NoQuantTable {
                    table: slot.quant_tbl_no as usize,
                });
            }
        }
        Ok(())
    }

    /// Dequantize and inverse-transform one block of component `ci`.
    ///
    /// Writes `n x n` samples (where `n` is the kind's output size) at the
    /// start of `output`, rows `stride` apart.
    pub fn inverse_dct(
        &self,
        ci: usize,
        coef: &DctBlock,
        output: &mut [u8],
        stride: usize,
    ) -> Result<()> {
        let slot = self.slots.get(ci).ok_or(Error::InvalidComponentIndex(ci))?;
        let n = slot.kind.output_size();
        if n > stride || output.len() < (n - 1) * stride + n {
            return Err(Error::BadState("output area smaller than IDCT block"));
        }
        match (slot.kind, slot.table.as_ref()) {
            (IdctKind::Islow, Some(MultiplierTable::Int(q))) => idct_islow(coef, q, output, stride),
            (IdctKind::Ifast, Some(MultiplierTable::Int(q))) => idct_ifast(coef, q, output, stride),
            (IdctKind::Float, Some(MultiplierTable::Float(q))) => idct_float(coef, q, output, stride),
            (IdctKind::Reduced4, Some(MultiplierTable::Int(q))) => idct_4x4(coef, q, output, stride),
            (IdctKind::Reduced2, Some(MultiplierTable::Int(q))) => idct_2x2(coef, q, output, stride),
            (IdctKind::Reduced1, Some(MultiplierTable::Int(q))) => idct_1x1(coef, q, output, stride),
            _ => return Err(Error::BadState("inverse_dct before start_input_pass")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::STD_LUMINANCE_QUANT_TBL;
    use crate::types::QuantTable;

    fn dqt(values: [u16; DCTSIZE2]) -> DqtTable {
        DqtTable::from(&QuantTable::new(values))
    }

    #[test]
    fn test_bad_dct_size() {
        let mut comps = ComponentInfo::ycbcr();
        comps[1].dct_scaled_size = 3;
        assert_eq!(
            InverseDct::new(&comps, DctMethod::IntSlow).unwrap_err(),
            Error::BadDctSize {
                component: 1,
                size: 3
            }
        );
    }

    #[test]
    fn test_kernel_selection() {
        let mut comps = ComponentInfo::ycbcr();
        comps[1].dct_scaled_size = 4;
        comps[2].dct_scaled_size = 1;
        let idct = InverseDct::new(&comps, DctMethod::Float).unwrap();
        assert_eq!(idct.kind(0), Some(IdctKind::Float));
        assert_eq!(idct.kind(1), Some(IdctKind::Reduced4));
        assert_eq!(idct.kind(2), Some(IdctKind::Reduced1));
        assert_eq!(IdctKind::Reduced4.table_method(), DctMethod::IntSlow);
    }

    #[test]
    fn test_multipliers_in_natural_order() {
        let table = dqt(STD_LUMINANCE_QUANT_TBL);
        match MultiplierTable::build(DctMethod::IntSlow, &table) {
            MultiplierTable::Int(q) => {
                for i in 0..DCTSIZE2 {
                    assert_eq!(q[i], STD_LUMINANCE_QUANT_TBL[i] as i32, "position {}", i);
                }
            }
            other => panic!("unexpected table {:?}", other),
        }
    }

    #[test]
    fn test_ifast_multipliers_scaled() {
        match MultiplierTable::build(DctMethod::IntFast, &dqt([16; DCTSIZE2])) {
            MultiplierTable::Int(q) => {
                // 16 * 16384 >> 12
                assert_eq!(q[0], 64);
                // (16 * 22725 + 2048) >> 12
                assert_eq!(q[1], 89);
            }
            other => panic!("unexpected table {:?}", other),
        }
    }

    #[test]
    fn test_float_multipliers_scaled() {
        match MultiplierTable::build(DctMethod::Float, &dqt([10; DCTSIZE2])) {
            MultiplierTable::Float(q) => {
                assert!((q[0] - 10.0).abs() < 1e-5);
                let expected = (10.0 * AAN_SCALE_FACTORS[1] * AAN_SCALE_FACTORS[2]) as f32;
                assert!((q[DCTSIZE + 2] - expected).abs() < 1e-5);
            }
            other => panic!("unexpected table {:?}", other),
        }
    }

    #[test]
    fn test_table_captured_at_first_scan() {
        let comps = [ComponentInfo::new(0, 0)];
        let mut idct = InverseDct::new(&comps, DctMethod::IntSlow).unwrap();
        let scan = ScanInfo::dc_scan(1);
        idct.start_input_pass(&scan, &[Some(dqt([4; DCTSIZE2]))]).unwrap();
        // A later scan with a different table keeps the original multipliers
        idct.start_input_pass(&scan, &[Some(dqt([9; DCTSIZE2]))]).unwrap();
        match idct.multipliers(0) {
            Some(MultiplierTable::Int(q)) => assert_eq!(q[5], 4),
            other => panic!("unexpected table {:?}", other),
        }
    }

    #[test]
    fn test_missing_table_in_scan() {
        let comps = ComponentInfo::ycbcr();
        let mut idct = InverseDct::new(&comps, DctMethod::IntSlow).unwrap();
        let scan = ScanInfo::dc_scan(3);
        let tables = [Some(dqt([4; DCTSIZE2])), None];
        assert_eq!(
            idct.start_input_pass(&scan, &tables).unwrap_err(),
            Error::NoQuantTable { table: 1 }
        );
    }

    #[test]
    fn test_output_pass_requires_needed_components() {
        let mut comps = ComponentInfo::ycbcr();
        comps[2].component_needed = false;
        let mut idct = InverseDct::new(&comps, DctMethod::IntSlow).unwrap();
        let tables = [Some(dqt([4; DCTSIZE2])), Some(dqt([5; DCTSIZE2]))];

        idct.start_input_pass(&ScanInfo::dc_scan_single(0), &tables)
            .unwrap();
        assert_eq!(
            idct.start_output_pass().unwrap_err(),
            Error::NoQuantTable { table: 1 }
        );

        // Cr is not needed, so Y and Cb suffice
        idct.start_input_pass(&ScanInfo::dc_scan_single(1), &tables)
            .unwrap();
        idct.start_output_pass().unwrap();
    }

    #[test]
    fn test_inverse_dct_dc_block() {
        let mut comps = [ComponentInfo::new(0, 0), ComponentInfo::new(1, 0)];
        comps[1].dct_scaled_size = 2;
        let mut idct = InverseDct::new(&comps, DctMethod::IntSlow).unwrap();
        let mut coef = [0i16; DCTSIZE2];
        coef[0] = 10;

        let mut out = [0u8; DCTSIZE2];
        assert!(idct.inverse_dct(0, &coef, &mut out, DCTSIZE).is_err());

        let scan = ScanInfo::dc_scan(2);
        idct.start_input_pass(&scan, &[Some(dqt([16; DCTSIZE2]))])
            .unwrap();
        idct.inverse_dct(0, &coef, &mut out, DCTSIZE).unwrap();
        // 10 * 16 / 8 = 20 above mid-gray
        assert!(out.iter().all(|&s| s == 148));

        let mut small = [0u8; 4];
        idct.inverse_dct(1, &coef, &mut small, 2).unwrap();
        assert_eq!(small, [148; 4]);
    }

    #[test]
    fn test_inverse_dct_checks_output_area() {
        let comps = [ComponentInfo::new(0, 0)];
        let mut idct = InverseDct::new(&comps, DctMethod::IntFast).unwrap();
        idct.start_input_pass(&ScanInfo::dc_scan(1), &[Some(dqt([1; DCTSIZE2]))])
            .unwrap();
        let coef = [0i16; DCTSIZE2];
        let mut out = [0u8; 32];
        assert!(idct.inverse_dct(0, &coef, &mut out, DCTSIZE).is_err());
        assert!(idct.inverse_dct(3, &coef, &mut out, DCTSIZE).is_err());
    }
}
