//! Data types shared across the crate.
//!
//! Tables are kept in row-major ("natural") order everywhere except
//! [`DqtTable`], which mirrors the zigzag layout of a DQT marker.

use crate::consts::{
    DCTSIZE, DCTSIZE2, DEFAULT_LAMBDA_LOG_SCALE1, DEFAULT_LAMBDA_LOG_SCALE2,
    DEFAULT_TRELLIS_FREQ_SPLIT, DEFAULT_TRELLIS_NUM_LOOPS, JPEG_NATURAL_ORDER, MAX_COMPS_IN_SCAN,
    ZIG,
};
use crate::error::Error;

/// Coefficients of one block after quantization, row-major.
pub type DctBlock = [i16; DCTSIZE2];

/// Coefficients of one block before quantization, row-major, on the
/// accurate-integer scale (eight times the orthonormal DCT).
pub type RawBlock = [i32; DCTSIZE2];

/// Float workspace or multiplier block, row-major.
pub type FloatBlock = [f32; DCTSIZE2];

// =============================================================================
// Transform selection
// =============================================================================

/// Which forward/inverse transform family to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DctMethod {
    /// LLM integer transform with 13-bit constants
    #[default]
    IntSlow = 0,
    /// AAN integer transform with 8-bit constants
    IntFast = 1,
    /// AAN transform in `f32`
    Float = 2,
}

impl DctMethod {
    /// Short name used in log output.
    pub const fn name(self) -> &'static str {
        match self {
            DctMethod::IntSlow => "islow",
            DctMethod::IntFast => "ifast",
            DctMethod::Float => "float",
        }
    }
}

impl TryFrom<u8> for DctMethod {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(DctMethod::IntSlow),
            1 => Ok(DctMethod::IntFast),
            2 => Ok(DctMethod::Float),
            _ => Err(Error::UnsupportedMethod("DCT method")),
        }
    }
}

// =============================================================================
// Scans
// =============================================================================

/// One entry of a scan script: which components, which zigzag band, and
/// which bit planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanInfo {
    /// Number of valid entries in `component_index`
    pub comps_in_scan: u8,
    /// Component indices, ascending
    pub component_index: [u8; MAX_COMPS_IN_SCAN],
    /// First zigzag position
    pub ss: u8,
    /// Last zigzag position
    pub se: u8,
    /// Bit position sent by the previous scan of this band (0 if none)
    pub ah: u8,
    /// Bit position this scan stops at
    pub al: u8,
}

impl ScanInfo {
    /// DC first scan interleaving components `0..num_components`.
    pub const fn dc_scan(num_components: u8) -> Self {
        Self {
            comps_in_scan: num_components,
            component_index: [0, 1, 2, 3],
            ss: 0,
            se: 0,
            ah: 0,
            al: 0,
        }
    }

    /// Single-component scan over zigzag band `ss..=se`.
    pub const fn ac_scan(component: u8, ss: u8, se: u8, ah: u8, al: u8) -> Self {
        Self {
            comps_in_scan: 1,
            component_index: [component, 0, 0, 0],
            ss,
            se,
            ah,
            al,
        }
    }

    /// DC first scan of one component.
    pub const fn dc_scan_single(component: u8) -> Self {
        Self::ac_scan(component, 0, 0, 0, 0)
    }

    /// DC first scan interleaving two components.
    pub const fn dc_scan_pair(first: u8, second: u8) -> Self {
        Self {
            comps_in_scan: 2,
            component_index: [first, second, 0, 0],
            ss: 0,
            se: 0,
            ah: 0,
            al: 0,
        }
    }

    /// Full-precision scan of all 64 coefficients. At most four components
    /// are kept.
    pub fn sequential(components: &[u8]) -> Self {
        let n = components.len().min(MAX_COMPS_IN_SCAN);
        let mut component_index = [0u8; MAX_COMPS_IN_SCAN];
        component_index[..n].copy_from_slice(&components[..n]);
        Self {
            comps_in_scan: n as u8,
            component_index,
            ss: 0,
            se: (DCTSIZE2 - 1) as u8,
            ah: 0,
            al: 0,
        }
    }

    /// The band is DC alone.
    pub const fn is_dc_scan(&self) -> bool {
        self.ss == 0 && self.se == 0
    }

    /// The scan refines bits an earlier scan already sent.
    pub const fn is_refinement(&self) -> bool {
        self.ah != 0
    }

    /// All 64 coefficients at full precision in one go.
    pub const fn is_sequential(&self) -> bool {
        self.ss == 0 && self.se as usize == DCTSIZE2 - 1 && self.ah == 0 && self.al == 0
    }

    /// The participating component indices.
    pub fn components(&self) -> &[u8] {
        let n = (self.comps_in_scan as usize).min(MAX_COMPS_IN_SCAN);
        &self.component_index[..n]
    }
}

impl Default for ScanInfo {
    fn default() -> Self {
        Self::dc_scan(3)
    }
}

// =============================================================================
// Components
// =============================================================================

/// Per-component settings the transform managers read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Position in the frame's component list
    pub component_index: u8,
    /// Quantization table slot
    pub quant_tbl_no: u8,
    /// Inverse-transform output edge: 8, 4, 2 or 1
    pub dct_scaled_size: u8,
    /// Whether the decoder wants samples for this component
    pub component_needed: bool,
}

impl ComponentInfo {
    /// Full-size component `component_index` quantized with slot `quant_tbl_no`.
    pub const fn new(component_index: u8, quant_tbl_no: u8) -> Self {
        Self {
            component_index,
            quant_tbl_no,
            dct_scaled_size: DCTSIZE as u8,
            component_needed: true,
        }
    }

    /// Y on slot 0, Cb and Cr sharing slot 1.
    pub const fn ycbcr() -> [Self; 3] {
        [Self::new(0, 0), Self::new(1, 1), Self::new(2, 1)]
    }
}

impl Default for ComponentInfo {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

// =============================================================================
// Quantization tables
// =============================================================================

/// Quantization divisors, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantTable {
    /// One divisor per coefficient
    pub values: [u16; DCTSIZE2],
}

impl QuantTable {
    /// Wrap row-major divisors.
    pub const fn new(values: [u16; DCTSIZE2]) -> Self {
        Self { values }
    }

    /// Scale `base` by `scale_factor` percent, rounding and clamping each
    /// entry to `1..=255` (baseline) or `1..=32767`.
    pub fn scaled(base: &[u16; DCTSIZE2], scale_factor: u32, force_baseline: bool) -> Self {
        let limit = if force_baseline { 255 } else { 32767 };
        let values = core::array::from_fn(|i| {
            let v = (base[i] as u32 * scale_factor + 50) / 100;
            v.clamp(1, limit) as u16
        });
        Self::new(values)
    }

    /// Read a table laid out in zigzag order.
    pub fn from_zigzag(zigzag: &[u16; DCTSIZE2]) -> Self {
        let mut values = [0u16; DCTSIZE2];
        for (k, &v) in zigzag.iter().enumerate() {
            values[JPEG_NATURAL_ORDER[k]] = v;
        }
        Self::new(values)
    }

    /// Lay the table out in zigzag order.
    pub fn to_zigzag(&self) -> [u16; DCTSIZE2] {
        let mut zigzag = [0u16; DCTSIZE2];
        for (i, &v) in self.values.iter().enumerate() {
            zigzag[ZIG[i]] = v;
        }
        zigzag
    }
}

impl Default for QuantTable {
    fn default() -> Self {
        Self::new([16; DCTSIZE2])
    }
}

/// A quantization table as a decoder receives it: zigzag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DqtTable {
    /// Divisors in zigzag order
    pub quantval: [u16; DCTSIZE2],
}

impl From<&QuantTable> for DqtTable {
    fn from(table: &QuantTable) -> Self {
        Self {
            quantval: table.to_zigzag(),
        }
    }
}

// =============================================================================
// Huffman tables
// =============================================================================

/// Huffman table in DHT form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HuffmanTable {
    /// `bits[l]` codes of length `l`; `bits[0]` is unused
    pub bits: [u8; 17],
    /// Symbols sorted by code length
    pub huffval: Vec<u8>,
}

impl HuffmanTable {
    /// Pair code counts with their symbols.
    pub fn new(bits: [u8; 17], huffval: Vec<u8>) -> Self {
        Self { bits, huffval }
    }
}

// =============================================================================
// Trellis settings
// =============================================================================

/// Trellis quantization settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrellisConfig {
    /// Use the trellis instead of plain rounding
    pub enabled: bool,
    /// Also choose DC levels, trading DC error against the cost of DC
    /// differences along the block row
    pub quant_dc: bool,
    /// Zero whole blocks when merging their EOBs into a run is cheaper
    pub eob_opt: bool,
    /// Weight each frequency's distortion by `1/q^2` and use a unit lambda
    /// base. When off, weights are flat and the base is `1/mean(q^2)` over
    /// AC. This replaces the perceptual luma weight table of mozjpeg, which
    /// is not carried here.
    pub use_lambda_weight_tbl: bool,
    /// Optimize the AC band as two progressive scans split after `freq_split`
    pub use_scans_in_trellis: bool,
    /// Last zigzag position of the low band when `use_scans_in_trellis` is set
    pub freq_split: u8,
    /// Trellis passes per row; passes after the first price symbols with
    /// Huffman tables built from the previous pass's output
    pub num_loops: u32,
    /// Collect statistics for suggesting new quantization tables
    pub q_opt: bool,
    /// Lambda log scale 1
    pub lambda_log_scale1: f32,
    /// Lambda log scale 2
    pub lambda_log_scale2: f32,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quant_dc: true,
            eob_opt: true,
            use_lambda_weight_tbl: true,
            use_scans_in_trellis: false,
            freq_split: DEFAULT_TRELLIS_FREQ_SPLIT,
            num_loops: DEFAULT_TRELLIS_NUM_LOOPS,
            q_opt: false,
            lambda_log_scale1: DEFAULT_LAMBDA_LOG_SCALE1,
            lambda_log_scale2: DEFAULT_LAMBDA_LOG_SCALE2,
        }
    }
}
