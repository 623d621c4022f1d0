//! # mozjpeg-core
//!
//! The DCT, quantization and scan-scheduling core of a mozjpeg-compatible
//! JPEG codec.
//!
//! - **Forward DCT** - accurate integer, fast integer and float kernels,
//!   each with a portable and an accelerated variant chosen at setup
//! - **Reciprocal quantization** - divide-free quantizers with cached divisor tables
//! - **Trellis quantization** - rate-distortion optimized coefficient selection,
//!   with EOB-run optimization across a block row
//! - **Inverse DCT** - full-size and reduced (4x4, 2x2, 1x1) kernels for decoding
//! - **Scan scheduling** - script validation, Huffman-optimization passes and
//!   progressive scan search
//!
//! Marker writing, entropy coding and color conversion are left to the
//! caller; this crate produces quantized coefficient blocks and decides
//! what each pass over them must do.
//!
//! ## Quick Start
//!
//! ```
//! use mozjpeg_core::{ComponentInfo, DctMethod, ForwardDct, KernelPreference};
//!
//! # fn main() -> Result<(), mozjpeg_core::Error> {
//! let (luma, chroma) = mozjpeg_core::create_quant_tables(85, true);
//! let qtables = [Some(luma), Some(chroma), None, None];
//! let components = ComponentInfo::ycbcr();
//!
//! let mut fdct = ForwardDct::new(DctMethod::IntSlow, KernelPreference::Auto);
//! fdct.start_pass(&components, &qtables)?;
//!
//! // One 8x8 block of flat gray quantizes to all zeros
//! let samples = [128u8; 64];
//! let mut blocks = [[0i16; 64]; 1];
//! fdct.forward_dct(&components[0], &samples, 8, 0, 0, &mut blocks, None)?;
//! assert!(blocks[0].iter().all(|&c| c == 0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Scheduling passes
//!
//! [`CompMaster`] walks the scan script and tells a [`PassHandler`] what
//! each pass is. With Huffman optimization every scan gets a statistics
//! pass before its output pass:
//!
//! ```
//! use std::io::Write;
//! use mozjpeg_core::{CompMaster, MasterConfig, PassHandler, PassInfo};
//!
//! struct Counter(usize);
//!
//! impl PassHandler for Counter {
//!     fn encode_pass(&mut self, _pass: &PassInfo, _out: &mut dyn Write) -> mozjpeg_core::Result<()> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), mozjpeg_core::Error> {
//! let config = MasterConfig::new(3).optimize_coding(true);
//! let mut master = CompMaster::new(config)?;
//! let mut counter = Counter(0);
//! master.run(&mut counter, &mut Vec::new())?;
//! assert_eq!(counter.0, 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod alloc;
pub mod consts;
pub mod error;
pub mod fdct;
pub mod fdctmgr;
pub mod huffman;
pub mod idct;
pub mod idctmgr;
pub mod master;
pub mod quant;
pub mod scan_optimize;
pub mod script;
pub mod simd;
pub mod trellis;
pub mod types;

pub use error::{Error, Result};
pub use fdctmgr::ForwardDct;
pub use huffman::{gen_optimal_table, DerivedTable, SymbolCounts};
pub use idctmgr::{IdctKind, InverseDct, MultiplierTable};
pub use master::{CompMaster, MasterConfig, PassHandler, PassInfo, PassType, RunSummary};
pub use quant::{
    compute_reciprocal, create_quant_tables, oversized_quant_value, quality_to_scale_factor,
    Reciprocal,
};
pub use scan_optimize::{ScanSearchConfig, ScanSearchResult, SearchLayout};
pub use script::{
    search_progression, sequential_script, simple_progression, validate_script, ScriptMode,
};
pub use simd::{CpuCapabilities, ForwardKernel, KernelPreference, KernelVariant};
pub use trellis::{
    quantize_trellis, trellis_quantize_block, BlockDecision, QOptAccumulator, TrellisRow,
};
pub use types::{
    ComponentInfo, DctBlock, DctMethod, DqtTable, HuffmanTable, QuantTable, RawBlock, ScanInfo,
    TrellisConfig,
};
