//! Block geometry, coefficient orders and the Annex K tables.
//!
//! Everything here is plain data. The quantization and Huffman tables are
//! the example tables of ITU-T T.81 Annex K; the AAN tables are the output
//! scalings of the Arai-Agui-Nakajima butterflies shared by the fast
//! integer and float transforms.

/// Samples per block edge.
pub const DCTSIZE: usize = 8;
/// Coefficients per block.
pub const DCTSIZE2: usize = 64;
/// Quantization table slots addressable by a component.
pub const NUM_QUANT_TBLS: usize = 4;
/// Components a single scan may interleave.
pub const MAX_COMPS_IN_SCAN: usize = 4;
/// Components an image may carry.
pub const MAX_COMPONENTS: usize = 10;

/// Largest 8-bit sample.
pub const MAXJSAMPLE: i32 = 255;
/// Level shift applied before the forward transform and undone after the inverse.
pub const CENTERJSAMPLE: i32 = 128;
/// Ten-bit window used by [`range_limit`](crate::idct::range_limit).
pub const RANGE_MASK: i32 = MAXJSAMPLE * 4 + 3;

/// Bits in a quantized AC magnitude for 8-bit samples; DC gets one more.
pub const MAX_COEF_BITS: u32 = 10;
/// Upper bound (exclusive) on Ah and Al.
pub const MAX_AH_AL: u8 = 10;

// =============================================================================
// Coefficient orders
// =============================================================================

/// Row-major index of each zigzag position.
pub const JPEG_NATURAL_ORDER: [usize; DCTSIZE2] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Zigzag position of each row-major index; the inverse of [`JPEG_NATURAL_ORDER`].
pub const ZIG: [usize; DCTSIZE2] = [
    0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9, 11,
    18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55, 60, 21, 34,
    37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
];

// =============================================================================
// Annex K quantization tables (row-major, quality 50)
// =============================================================================

/// Table K.1.
pub const STD_LUMINANCE_QUANT_TBL: [u16; DCTSIZE2] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104, 113,
    92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

/// Table K.2.
pub const STD_CHROMINANCE_QUANT_TBL: [u16; DCTSIZE2] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

// =============================================================================
// AAN output scaling
// =============================================================================

/// Row-major products `AAN_SCALE_FACTORS[row] * AAN_SCALE_FACTORS[col]` in Q14.
pub const AAN_SCALES: [i32; DCTSIZE2] = [
    16384, 22725, 21407, 19266, 16384, 12873, 8867, 4520, //
    22725, 31521, 29692, 26722, 22725, 17855, 12299, 6270, //
    21407, 29692, 27969, 25172, 21407, 16819, 11585, 5906, //
    19266, 26722, 25172, 22654, 19266, 15137, 10426, 5315, //
    16384, 22725, 21407, 19266, 16384, 12873, 8867, 4520, //
    12873, 17855, 16819, 15137, 12873, 10114, 6967, 3552, //
    8867, 12299, 11585, 10426, 8867, 6967, 4799, 2446, //
    4520, 6270, 5906, 5315, 4520, 3552, 2446, 1247,
];

/// Q format of [`AAN_SCALES`].
pub const AAN_SCALE_BITS: i32 = 14;

/// `sqrt(2) * cos(k * pi / 16)` for `k > 0`, and 1 for `k = 0`.
pub const AAN_SCALE_FACTORS: [f64; DCTSIZE] = [
    1.0,
    1.387039845,
    1.306562965,
    1.175875602,
    1.0,
    0.785694958,
    0.541196100,
    0.275899379,
];

/// Q format of the fast-integer IDCT multipliers.
pub const IFAST_SCALE_BITS: i32 = 2;

// =============================================================================
// Trellis defaults
// =============================================================================

/// log2 of the lambda numerator scale.
pub const DEFAULT_LAMBDA_LOG_SCALE1: f32 = 14.75;
/// log2 of the additive term in the lambda denominator.
pub const DEFAULT_LAMBDA_LOG_SCALE2: f32 = 16.5;
/// Last zigzag position of the low band when trellis models split AC scans.
pub const DEFAULT_TRELLIS_FREQ_SPLIT: u8 = 8;
/// Trellis passes per row.
pub const DEFAULT_TRELLIS_NUM_LOOPS: u32 = 1;
/// Upper bound on DC levels tried per block by the DC trellis.
pub const DC_TRELLIS_MAX_CANDIDATES: usize = 9;

// =============================================================================
// Annex K Huffman tables
// =============================================================================

/// Table K.3 code counts per length; index 0 unused.
pub const DC_LUMINANCE_BITS: [u8; 17] = [0, 0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];

/// Table K.3 symbols.
pub const DC_LUMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Table K.4 code counts per length.
pub const DC_CHROMINANCE_BITS: [u8; 17] = [0, 0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];

/// Table K.4 symbols.
pub const DC_CHROMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Table K.5 code counts per length.
pub const AC_LUMINANCE_BITS: [u8; 17] = [0, 0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];

/// Table K.5 symbols, `(run << 4) | size`.
pub const AC_LUMINANCE_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Table K.6 code counts per length.
pub const AC_CHROMINANCE_BITS: [u8; 17] = [0, 0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];

/// Table K.6 symbols.
pub const AC_CHROMINANCE_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];
