//! Forward DCT + quantization followed by dequantization + inverse DCT.
//!
//! With a unit quantizer the accurate kernels reproduce the input to
//! within rounding; with real tables the error stays inside the bound
//! implied by half a quantization step at every frequency.

use mozjpeg_core::consts::{DCTSIZE, DCTSIZE2, STD_LUMINANCE_QUANT_TBL};
use mozjpeg_core::{
    ComponentInfo, DctMethod, DqtTable, ForwardDct, IdctKind, InverseDct, KernelPreference,
    QuantTable, ScanInfo,
};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

fn encode_block(method: DctMethod, preference: KernelPreference, table: &QuantTable, samples: &[u8; DCTSIZE2]) -> [i16; DCTSIZE2] {
    let comp = ComponentInfo::new(0, 0);
    let mut fdct = ForwardDct::new(method, preference);
    fdct.start_pass(&[comp], &[Some(*table), None, None, None])
        .expect("start_pass");
    let mut blocks = [[0i16; DCTSIZE2]; 1];
    fdct.forward_dct(&comp, samples, DCTSIZE, 0, 0, &mut blocks, None)
        .expect("forward_dct");
    blocks[0]
}

fn decode_block(method: DctMethod, size: u8, table: &QuantTable, coef: &[i16; DCTSIZE2]) -> [u8; DCTSIZE2] {
    let mut comp = ComponentInfo::new(0, 0);
    comp.dct_scaled_size = size;
    let mut idct = InverseDct::new(&[comp], method).expect("kernel selection");
    idct.start_input_pass(&ScanInfo::dc_scan(1), &[Some(DqtTable::from(table)), None, None, None])
        .expect("start_input_pass");
    idct.start_output_pass().expect("start_output_pass");
    let mut out = [0u8; DCTSIZE2];
    idct.inverse_dct(0, coef, &mut out, DCTSIZE).expect("inverse_dct");
    out
}

fn random_block(rng: &mut XorShiftRng) -> [u8; DCTSIZE2] {
    // Mix smooth gradients with noise so every frequency gets energy
    let base: i32 = rng.random_range(0..256);
    let gx: i32 = rng.random_range(-12..=12);
    let gy: i32 = rng.random_range(-12..=12);
    let noise: i32 = rng.random_range(0..=64);
    let mut block = [0u8; DCTSIZE2];
    for (i, v) in block.iter_mut().enumerate() {
        let (y, x) = ((i / DCTSIZE) as i32, (i % DCTSIZE) as i32);
        let n = if noise > 0 { rng.random_range(-noise..=noise) } else { 0 };
        *v = (base + gx * x + gy * y + n).clamp(0, 255) as u8;
    }
    block
}

/// Worst-case spatial error from half-step coefficient errors.
fn error_bound(table: &QuantTable) -> f64 {
    let c = |u: usize| if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
    let mut bound = 0.0;
    for v in 0..DCTSIZE {
        for u in 0..DCTSIZE {
            let q = table.values[v * DCTSIZE + u] as f64;
            bound += c(u) * c(v) * (q / 2.0 + 1.0) / 4.0;
        }
    }
    bound + 1.5
}

fn max_error(a: &[u8; DCTSIZE2], b: &[u8; DCTSIZE2]) -> i32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as i32 - y as i32).abs())
        .max()
        .unwrap_or(0)
}

#[test]
fn test_islow_unit_quantizer_near_identity() {
    let mut rng = XorShiftRng::seed_from_u64(0xdc7_0001);
    let unit = QuantTable::new([1; DCTSIZE2]);
    let mut total_error = 0i64;
    let mut worst = 0;
    for _ in 0..500 {
        let samples = random_block(&mut rng);
        let coef = encode_block(DctMethod::IntSlow, KernelPreference::Auto, &unit, &samples);
        let out = decode_block(DctMethod::IntSlow, 8, &unit, &coef);
        worst = worst.max(max_error(&samples, &out));
        total_error += samples
            .iter()
            .zip(out.iter())
            .map(|(&x, &y)| (x as i64 - y as i64).abs())
            .sum::<i64>();
    }
    let mean = total_error as f64 / (500.0 * DCTSIZE2 as f64);
    println!("islow q=1: worst {} mean {:.4}", worst, mean);
    assert!(worst <= 2, "worst sample error {} at q=1", worst);
    assert!(mean < 0.5, "mean sample error {:.4} at q=1", mean);
}

#[test]
fn test_float_unit_quantizer_near_identity() {
    let mut rng = XorShiftRng::seed_from_u64(0xdc7_0002);
    let unit = QuantTable::new([1; DCTSIZE2]);
    for _ in 0..300 {
        let samples = random_block(&mut rng);
        let coef = encode_block(DctMethod::Float, KernelPreference::Auto, &unit, &samples);
        let out = decode_block(DctMethod::Float, 8, &unit, &coef);
        let err = max_error(&samples, &out);
        assert!(err <= 3, "float round trip error {}", err);
    }
}

#[test]
fn test_quantized_error_within_step_bound() {
    let mut rng = XorShiftRng::seed_from_u64(0xdc7_0003);
    for quality in [50u8, 75, 90] {
        let (table, _) = mozjpeg_core::create_quant_tables(quality, true);
        let bound = error_bound(&table);
        for _ in 0..200 {
            let samples = random_block(&mut rng);
            let coef = encode_block(DctMethod::IntSlow, KernelPreference::Auto, &table, &samples);
            let out = decode_block(DctMethod::IntSlow, 8, &table, &coef);
            let err = max_error(&samples, &out) as f64;
            assert!(
                err <= bound,
                "quality {}: error {} exceeds bound {:.1}",
                quality,
                err,
                bound
            );
        }
    }
}

#[test]
fn test_portable_and_accelerated_kernels_agree() {
    let mut rng = XorShiftRng::seed_from_u64(0xdc7_0004);
    let table = QuantTable::new(STD_LUMINANCE_QUANT_TBL);
    for method in [DctMethod::IntSlow, DctMethod::IntFast, DctMethod::Float] {
        for _ in 0..100 {
            let samples = random_block(&mut rng);
            let portable = encode_block(method, KernelPreference::Portable, &table, &samples);
            let accelerated = encode_block(method, KernelPreference::Accelerated, &table, &samples);
            assert_eq!(portable, accelerated, "{:?} variants disagree", method);
        }
    }
}

#[test]
fn test_flat_gray_is_all_zero() {
    let gray = [128u8; DCTSIZE2];
    let tables = [
        QuantTable::new([1; DCTSIZE2]),
        QuantTable::new(STD_LUMINANCE_QUANT_TBL),
        QuantTable::new([255; DCTSIZE2]),
    ];
    for method in [DctMethod::IntSlow, DctMethod::IntFast, DctMethod::Float] {
        for table in &tables {
            let coef = encode_block(method, KernelPreference::Auto, table, &gray);
            assert!(coef.iter().all(|&c| c == 0), "{:?}: flat gray not zero", method);
            let out = decode_block(DctMethod::IntSlow, 8, table, &coef);
            assert!(out.iter().all(|&s| s == 128));
        }
    }
}

#[test]
fn test_reduced_sizes_reproduce_flat_blocks() {
    let flat = [200u8; DCTSIZE2];
    let table = QuantTable::new([16; DCTSIZE2]);
    let coef = encode_block(DctMethod::IntSlow, KernelPreference::Auto, &table, &flat);
    // (200 - 128) * 64 / 16 / 8 = 36
    assert_eq!(coef[0], 36);

    for (size, kind) in [(4u8, IdctKind::Reduced4), (2, IdctKind::Reduced2), (1, IdctKind::Reduced1)] {
        let mut comp = ComponentInfo::new(0, 0);
        comp.dct_scaled_size = size;
        assert_eq!(
            InverseDct::new(&[comp], DctMethod::IntSlow).unwrap().kind(0),
            Some(kind)
        );
        let out = decode_block(DctMethod::IntSlow, size, &table, &coef);
        let n = size as usize;
        for y in 0..n {
            for x in 0..n {
                assert_eq!(out[y * DCTSIZE + x], 200, "size {} at ({}, {})", size, x, y);
            }
        }
    }
}
