//! Trellis quantization for optimal rate-distortion.
//!
//! Trellis quantization uses dynamic programming to choose, for each AC
//! coefficient of a block, the quantized level that minimizes
//!
//! ```text
//! Cost = Rate + Lambda * Distortion
//! ```
//!
//! where Rate is the Huffman encoding cost (code length plus magnitude bits)
//! and Distortion is the weighted squared error against the unquantized
//! coefficient.
//!
//! The per-block program runs in three phases: `fill` prices
//! every candidate level at every position, `select_terminal` picks the
//! last nonzero position, and `materialize` walks the predecessor table back
//! to write the chosen levels.
//!
//! With `eob_opt` and an AC-only band, a second program over the blocks of
//! a row decides which blocks to zero entirely so their end-of-block
//! symbols merge into cheaper EOB runs. DC levels get their own program
//! across the row, since each block's DC is coded as a difference from the
//! previous one.
//!
//! All raw coefficients are on the accurate-integer scale (eight times the
//! textbook DCT), as stashed by the forward-DCT manager.

use crate::alloc::try_alloc_vec;
use crate::consts::{DCTSIZE2, DC_TRELLIS_MAX_CANDIDATES, JPEG_NATURAL_ORDER, MAX_COEF_BITS};
use crate::error::{Error, Result};
use crate::huffman::{jpeg_nbits, DerivedTable, SymbolCounts, EOB, ZRL};
use crate::types::{DctBlock, QuantTable, RawBlock, TrellisConfig};

/// Largest magnitude a quantized AC coefficient may take.
const MAX_AC_LEVEL: i32 = (1 << MAX_COEF_BITS) - 1;

/// Largest EOBn category (EOB14 covers runs up to 32767).
const MAX_EOB_RUN_CATEGORY: u32 = 14;

/// Longest EOB run one symbol can code.
const MAX_EOB_RUN: usize = 0x7FFF;

const INF: f32 = f32::INFINITY;

// =============================================================================
// Rate-distortion model
// =============================================================================

/// Lambda and per-frequency weights for one block.
#[derive(Debug, Clone)]
pub struct RdModel {
    lambda: f32,
    weights: [f32; DCTSIZE2],
    divisors: [i32; DCTSIZE2],
}

impl RdModel {
    /// Build the model for `raw` quantized against `qtable`.
    ///
    /// With `use_lambda_weight_tbl` each frequency is weighted by `1/q^2`;
    /// otherwise weights are flat and lambda absorbs `1/mean(q^2)` over the
    /// AC band.
    pub fn new(config: &TrellisConfig, qtable: &QuantTable, raw: &RawBlock) -> Self {
        let mut weights = [1.0f32; DCTSIZE2];
        let lambda_base = if config.use_lambda_weight_tbl {
            for (w, &q) in weights.iter_mut().zip(qtable.values.iter()) {
                let q = q.max(1) as f32;
                *w = 1.0 / (q * q);
            }
            1.0
        } else {
            let sum_sq: f32 = qtable.values[1..]
                .iter()
                .map(|&q| {
                    let q = q.max(1) as f32;
                    q * q
                })
                .sum();
            1.0 / (sum_sq / 63.0)
        };

        let norm: f32 = raw[1..]
            .iter()
            .map(|&c| {
                let c = c as f32;
                c * c
            })
            .sum::<f32>()
            / 63.0;

        let lambda = calculate_lambda(config, norm, lambda_base);
        let divisors = core::array::from_fn(|i| qtable.values[i].max(1) as i32 * 8);
        Self {
            lambda,
            weights,
            divisors,
        }
    }

    /// The block's lambda.
    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    /// Weighted distortion of an error `delta` at natural position `z`.
    #[inline]
    pub fn distortion(&self, z: usize, delta: f32) -> f32 {
        delta * delta * self.lambda * self.weights[z]
    }

    /// Quantization step for natural position `z`, on the raw scale.
    #[inline]
    pub fn divisor(&self, z: usize) -> i32 {
        self.divisors[z]
    }
}

/// Lambda from the configured log scales.
///
/// `lambda = 2^scale1 * base / (2^scale2 + norm)`, or `2^(scale1 - 12) * base`
/// when `scale2` is not positive.
fn calculate_lambda(config: &TrellisConfig, block_norm: f32, lambda_base: f32) -> f32 {
    if config.lambda_log_scale2 > 0.0 {
        let scale1 = 2.0_f32.powf(config.lambda_log_scale1);
        let scale2 = 2.0_f32.powf(config.lambda_log_scale2);
        scale1 * lambda_base / (scale2 + block_norm)
    } else {
        2.0_f32.powf(config.lambda_log_scale1 - 12.0) * lambda_base
    }
}

/// Round `x / q` half away from zero.
#[inline]
fn round_quantize(x: i32, q: i32) -> i32 {
    let qval = (x.abs() + q / 2) / q;
    if x < 0 {
        -qval
    } else {
        qval
    }
}

/// Bits spent on an EOB run of `run` blocks, or `None` if the symbol is unassigned.
fn eob_run_cost(actbl: &DerivedTable, run: usize) -> Option<f32> {
    if run == 0 {
        return Some(0.0);
    }
    let category = (jpeg_nbits(run.min(i32::MAX as usize) as i32) - 1).min(MAX_EOB_RUN_CATEGORY);
    match actbl.code_length((category as usize) << 4) {
        0 => None,
        len => Some(len as f32 + category as f32),
    }
}

/// Lowest AC position of a band (DC is never trellis-optimized).
#[inline]
fn ac_start(ss: u8) -> usize {
    (ss as usize).max(1)
}

fn check_band(ss: u8, se: u8) -> Result<()> {
    if ss > se || se as usize >= DCTSIZE2 {
        return Err(Error::InvalidScanSpec {
            reason: "spectral band out of range",
        });
    }
    Ok(())
}

// =============================================================================
// Per-block trellis
// =============================================================================

/// How a block's coding ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EobClass {
    /// Last nonzero coefficient sits at the band end; no EOB symbol
    NotNeeded,
    /// Nonzero coefficients followed by an EOB
    Needed,
    /// Every coefficient in the band is zero
    AllZero,
}

impl EobClass {
    fn eob_count(self) -> usize {
        match self {
            EobClass::NotNeeded => 0,
            EobClass::Needed | EobClass::AllZero => 1,
        }
    }
}

/// Outcome of optimizing one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockDecision {
    /// Total rate + distortion of the chosen coding, including any EOB
    pub cost: f32,
    /// Same as `cost` without the EOB symbol's bits
    pub cost_without_eob: f32,
    /// Distortion of zeroing the entire band
    pub zero_cost: f32,
    /// Zigzag position of the last nonzero coefficient, or `Ss - 1`
    pub last: usize,
    /// Whether the coding ends with an EOB
    pub eob_class: EobClass,
}

/// Dynamic-programming table over the zigzag positions of one band.
///
/// Position `s - 1` (where `s` is the first AC position of the band) is the
/// virtual "no predecessor" state with zero cost.
struct CoefTrellis {
    /// Distortion of zeroing positions `s..=i`
    zero_dist: [f32; DCTSIZE2],
    /// Best cost of a path whose last nonzero coefficient is at `i`
    cost: [f32; DCTSIZE2],
    /// Previous nonzero position on that path
    run_start: [usize; DCTSIZE2],
    /// Level chosen at `i` on that path (0 if `i` cannot be nonzero)
    level: [i32; DCTSIZE2],
}

impl CoefTrellis {
    fn new() -> Self {
        Self {
            zero_dist: [0.0; DCTSIZE2],
            cost: [INF; DCTSIZE2],
            run_start: [0; DCTSIZE2],
            level: [0; DCTSIZE2],
        }
    }

    /// Price every candidate level at positions `s..=se`.
    fn fill(&mut self, model: &RdModel, raw: &RawBlock, actbl: &DerivedTable, s: usize, se: usize) {
        self.zero_dist[s - 1] = 0.0;
        self.cost[s - 1] = 0.0;

        let zrl_len = actbl.code_length(ZRL);

        for i in s..=se {
            let z = JPEG_NATURAL_ORDER[i];
            let x = raw[z].abs();
            let q = model.divisor(z);

            self.zero_dist[i] = self.zero_dist[i - 1] + model.distortion(z, x as f32);
            self.cost[i] = INF;
            self.level[i] = 0;
            self.run_start[i] = i - 1;

            let qval = ((x + q / 2) / q).min(MAX_AC_LEVEL);
            if qval == 0 {
                continue;
            }

            // Category ceilings 1, 3, 7, ... then the rounded value itself
            let num_candidates = jpeg_nbits(qval) as usize;
            let mut candidates = [(0i32, 0usize, 0.0f32); 10];
            for (k, slot) in candidates.iter_mut().enumerate().take(num_candidates) {
                let value = if k + 1 < num_candidates {
                    (2 << k) - 1
                } else {
                    qval
                };
                let dist = model.distortion(z, (value as i64 * q as i64 - x as i64) as f32);
                *slot = (value, k + 1, dist);
            }
            let sign = if raw[z] < 0 { -1 } else { 1 };

            for j in (s - 1)..i {
                if j != s - 1 && self.level[j] == 0 {
                    continue;
                }
                let run = i - 1 - j;
                let zrl_cost = if run >= 16 {
                    if zrl_len == 0 {
                        continue;
                    }
                    (run / 16) as f32 * zrl_len as f32
                } else {
                    0.0
                };
                let run_dist = self.zero_dist[i - 1] - self.zero_dist[j];
                let base = zrl_cost + run_dist + self.cost[j];

                for &(value, size, dist) in &candidates[..num_candidates] {
                    let code_len = actbl.code_length(((run & 15) << 4) | size);
                    if code_len == 0 {
                        continue;
                    }
                    let cost = base + code_len as f32 + size as f32 + dist;
                    if cost < self.cost[i] {
                        self.cost[i] = cost;
                        self.level[i] = value * sign;
                        self.run_start[i] = j;
                    }
                }
            }
        }
    }

    /// Choose the last nonzero position, including the all-zero option.
    fn select_terminal(&self, actbl: &DerivedTable, s: usize, se: usize) -> BlockDecision {
        let eob_bits = match actbl.code_length(EOB) {
            0 => None,
            len => Some(len as f32),
        };
        let zero_cost = self.zero_dist[se];

        let mut last = s - 1;
        let mut best = eob_bits.map_or(INF, |e| zero_cost + e);

        for i in s..=se {
            if self.level[i] == 0 {
                continue;
            }
            let mut cost = self.cost[i] + (zero_cost - self.zero_dist[i]);
            if i < se {
                match eob_bits {
                    Some(e) => cost += e,
                    None => continue,
                }
            }
            if cost < best {
                best = cost;
                last = i;
            }
        }

        if !best.is_finite() {
            // Nothing encodable; fall back to the all-zero band
            log::trace!("trellis: no encodable path, zeroing band");
            best = zero_cost;
        }

        let eob_class = if last == s - 1 {
            EobClass::AllZero
        } else if last < se {
            EobClass::Needed
        } else {
            EobClass::NotNeeded
        };
        let cost_without_eob = match (eob_class, eob_bits) {
            (EobClass::NotNeeded, _) | (_, None) => best,
            (_, Some(e)) => best - e,
        };

        BlockDecision {
            cost: best,
            cost_without_eob,
            zero_cost,
            last,
            eob_class,
        }
    }

    /// Write the levels on the path ending at `last`; zero the rest of the band.
    fn materialize(&self, block: &mut DctBlock, last: usize, s: usize, se: usize) {
        let mut on_path = [false; DCTSIZE2];
        let mut pos = last;
        while pos >= s {
            on_path[pos] = true;
            pos = self.run_start[pos];
        }
        for i in s..=se {
            block[JPEG_NATURAL_ORDER[i]] = if on_path[i] {
                self.level[i] as i16
            } else {
                0
            };
        }
    }
}

/// Trellis-quantize one block over the band `ss..=se`.
///
/// When the band includes DC it is rounded to nearest; only AC positions
/// are optimized. Positions outside the band are left untouched.
pub fn trellis_quantize_block(
    raw: &RawBlock,
    block: &mut DctBlock,
    qtable: &QuantTable,
    actbl: &DerivedTable,
    config: &TrellisConfig,
    ss: u8,
    se: u8,
) -> Result<BlockDecision> {
    check_band(ss, se)?;
    let model = RdModel::new(config, qtable, raw);
    Ok(optimize_block(&model, raw, block, actbl, ss, se))
}

fn optimize_block(
    model: &RdModel,
    raw: &RawBlock,
    block: &mut DctBlock,
    actbl: &DerivedTable,
    ss: u8,
    se: u8,
) -> BlockDecision {
    if ss == 0 {
        block[0] = round_quantize(raw[0], model.divisor(0)) as i16;
    }
    let s = ac_start(ss);
    let se = se as usize;
    if se < s {
        // DC-only band
        return BlockDecision {
            cost: 0.0,
            cost_without_eob: 0.0,
            zero_cost: 0.0,
            last: s - 1,
            eob_class: EobClass::NotNeeded,
        };
    }

    let mut trellis = CoefTrellis::new();
    trellis.fill(model, raw, actbl, s, se);
    let decision = trellis.select_terminal(actbl, s, se);
    trellis.materialize(block, decision.last, s, se);
    decision
}

/// Rate + lambda-weighted distortion of an already-quantized band.
///
/// Uses the same model as the optimizer, so the result is directly
/// comparable with [`BlockDecision::cost`]. Returns `None` if the block
/// needs a symbol the table does not assign.
pub fn block_rd_cost(
    raw: &RawBlock,
    block: &DctBlock,
    qtable: &QuantTable,
    actbl: &DerivedTable,
    config: &TrellisConfig,
    ss: u8,
    se: u8,
) -> Option<f32> {
    check_band(ss, se).ok()?;
    let model = RdModel::new(config, qtable, raw);
    let s = ac_start(ss);
    let se = se as usize;
    if se < s {
        return Some(0.0);
    }

    let mut cost = 0.0f32;
    let mut run = 0usize;
    for i in s..=se {
        let z = JPEG_NATURAL_ORDER[i];
        let level = block[z] as i32;
        let delta = level as i64 * model.divisor(z) as i64 - raw[z] as i64;
        cost += model.distortion(z, delta as f32);
        if level == 0 {
            run += 1;
            continue;
        }
        while run >= 16 {
            match actbl.code_length(ZRL) {
                0 => return None,
                len => cost += len as f32,
            }
            run -= 16;
        }
        let size = jpeg_nbits(level) as usize;
        match actbl.code_length((run << 4) | size) {
            0 => return None,
            len => cost += len as f32 + size as f32,
        }
        run = 0;
    }
    if run > 0 {
        match actbl.code_length(EOB) {
            0 => return None,
            len => cost += len as f32,
        }
    }
    Some(cost)
}

// =============================================================================
// Cross-block EOB run optimization
// =============================================================================

/// Decide which blocks of a row to zero so EOBs merge into runs.
///
/// Returns the blocks that keep their trellis coding; the others are
/// zeroed over the band by the caller. Returns `None` when no arrangement
/// is encodable with the table's EOB run symbols.
fn plan_eob_runs(decisions: &[BlockDecision], actbl: &DerivedTable) -> Result<Option<Vec<bool>>> {
    let n = decisions.len();
    // State i: block i-1 is the most recent kept block (0 = none yet)
    let mut acc_cost = try_alloc_vec(INF, n + 1)?;
    let mut acc_zero = try_alloc_vec(0.0f32, n + 1)?;
    let mut state_class = try_alloc_vec(EobClass::NotNeeded, n + 1)?;
    let mut run_start = try_alloc_vec(0usize, n)?;
    acc_cost[0] = 0.0;

    for (bi, decision) in decisions.iter().enumerate() {
        acc_zero[bi + 1] = acc_zero[bi] + decision.zero_cost;
        state_class[bi + 1] = decision.eob_class;
        if decision.eob_class == EobClass::AllZero {
            continue;
        }
        for i in 0..=bi {
            if state_class[i] == EobClass::AllZero || !acc_cost[i].is_finite() {
                continue;
            }
            let run = (bi - i) + state_class[i].eob_count();
            let Some(run_bits) = eob_run_cost(actbl, run) else {
                continue;
            };
            let cost = acc_cost[i]
                + (acc_zero[bi] - acc_zero[i])
                + run_bits
                + decision.cost_without_eob;
            if cost < acc_cost[bi + 1] {
                acc_cost[bi + 1] = cost;
                run_start[bi] = i;
            }
        }
    }

    let mut best = INF;
    let mut terminal = 0;
    for i in 0..=n {
        if state_class[i] == EobClass::AllZero || !acc_cost[i].is_finite() {
            continue;
        }
        let run = (n - i) + state_class[i].eob_count();
        let Some(run_bits) = eob_run_cost(actbl, run) else {
            continue;
        };
        let cost = acc_cost[i] + (acc_zero[n] - acc_zero[i]) + run_bits;
        if cost < best {
            best = cost;
            terminal = i;
        }
    }
    if !best.is_finite() {
        return Ok(None);
    }

    let mut keep = try_alloc_vec(false, n)?;
    let mut state = terminal;
    while state > 0 {
        keep[state - 1] = true;
        state = run_start[state - 1];
    }
    Ok(Some(keep))
}

// =============================================================================
// q_opt accumulators
// =============================================================================

/// Per-frequency statistics for re-deriving quantization divisors.
#[derive(Debug, Clone, PartialEq)]
pub struct QOptAccumulator {
    norm_src: [f64; DCTSIZE2],
    norm_coef: [f64; DCTSIZE2],
}

impl Default for QOptAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl QOptAccumulator {
    /// Empty accumulators.
    pub const fn new() -> Self {
        Self {
            norm_src: [0.0; DCTSIZE2],
            norm_coef: [0.0; DCTSIZE2],
        }
    }

    /// Add one block's band `ss..=se`.
    pub fn accumulate(&mut self, raw: &RawBlock, block: &DctBlock, ss: u8, se: u8) {
        if check_band(ss, se).is_err() {
            return;
        }
        for &z in &JPEG_NATURAL_ORDER[ss as usize..=se as usize] {
            let coef = block[z] as f64;
            self.norm_src[z] += raw[z] as f64 * coef;
            self.norm_coef[z] += 8.0 * coef * coef;
        }
    }

    /// Sum of `raw * level` at natural position `z`.
    pub fn source_sum(&self, z: usize) -> f64 {
        self.norm_src[z]
    }

    /// Sum of `8 * level^2` at natural position `z`.
    pub fn coef_sum(&self, z: usize) -> f64 {
        self.norm_coef[z]
    }

    /// Suggested divisors: `round(sum(raw * level) / sum(8 * level^2))`,
    /// clamped to 1..=255. Positions with no nonzero levels keep `current`.
    pub fn derive_quant_values(&self, current: &QuantTable) -> QuantTable {
        let mut values = current.values;
        for (z, v) in values.iter_mut().enumerate() {
            if self.norm_coef[z] > 0.0 {
                let q = (self.norm_src[z] / self.norm_coef[z]).round();
                *v = q.clamp(1.0, 255.0) as u16;
            }
        }
        QuantTable::new(values)
    }
}

// =============================================================================
// DC trellis
// =============================================================================

/// Largest magnitude a quantized DC coefficient may take.
const MAX_DC_LEVEL: i32 = (1 << (MAX_COEF_BITS + 1)) - 1;

/// DC levels tried per block: odd, and fewer for coarse steps.
fn dc_candidate_count(quantval: i32) -> usize {
    (((2 + 60 / quantval.max(1)) | 1) as usize).min(DC_TRELLIS_MAX_CANDIDATES)
}

/// Bits to code a DC difference, or `None` if its category has no code.
fn dc_diff_cost(dctbl: &DerivedTable, diff: i32) -> Option<f32> {
    let nbits = jpeg_nbits(diff);
    match dctbl.code_length(nbits as usize) {
        0 => None,
        len => Some(len as f32 + nbits as f32),
    }
}

/// Choose DC levels for a row, pricing each difference from the previous
/// block's level (the first from `last_dc`).
///
/// Returns `false` and leaves `blocks` alone when no chain is encodable.
fn dc_trellis_row(
    models: &[RdModel],
    raw: &[RawBlock],
    blocks: &mut [DctBlock],
    dctbl: &DerivedTable,
    last_dc: i16,
) -> Result<bool> {
    let Some(first) = models.first() else {
        return Ok(true);
    };
    let n = blocks.len();
    let q = first.divisor(0);
    let count = dc_candidate_count(q / 8);

    let mut levels = try_alloc_vec([0i32; DC_TRELLIS_MAX_CANDIDATES], n)?;
    let mut from = try_alloc_vec([0u8; DC_TRELLIS_MAX_CANDIDATES], n)?;
    let mut cost = [INF; DC_TRELLIS_MAX_CANDIDATES];

    for (bi, (model, raw_block)) in models.iter().zip(raw).enumerate() {
        let x = raw_block[0].abs();
        let qval = (x + q / 2) / q;
        let sign = if raw_block[0] < 0 { -1 } else { 1 };
        let mut next = [INF; DC_TRELLIS_MAX_CANDIDATES];

        for k in 0..count {
            let value = (qval - (count / 2) as i32 + k as i32).min(MAX_DC_LEVEL);
            let delta = value as i64 * q as i64 - x as i64;
            let dist = model.distortion(0, delta as f32);
            let level = value * sign;
            levels[bi][k] = level;

            if bi == 0 {
                if let Some(bits) = dc_diff_cost(dctbl, level - last_dc as i32) {
                    next[k] = dist + bits;
                }
                continue;
            }
            for l in 0..count {
                if !cost[l].is_finite() {
                    continue;
                }
                let Some(bits) = dc_diff_cost(dctbl, level - levels[bi - 1][l]) else {
                    continue;
                };
                let total = cost[l] + bits + dist;
                if total < next[k] {
                    next[k] = total;
                    from[bi][k] = l as u8;
                }
            }
        }
        cost = next;
    }

    let mut best = INF;
    let mut k = 0;
    for (i, &c) in cost[..count].iter().enumerate() {
        if c < best {
            best = c;
            k = i;
        }
    }
    if !best.is_finite() {
        return Ok(false);
    }
    for bi in (0..n).rev() {
        blocks[bi][0] = levels[bi][k] as i16;
        k = from[bi][k] as usize;
    }
    Ok(true)
}

// =============================================================================
// Row driver
// =============================================================================

/// Tables and spectral band for one row of blocks.
#[derive(Debug, Clone, Copy)]
pub struct TrellisRow<'a> {
    /// DC table; DC levels are only optimized when one is given
    pub dctbl: Option<&'a DerivedTable>,
    /// AC table
    pub actbl: &'a DerivedTable,
    /// First zigzag position
    pub ss: u8,
    /// Last zigzag position
    pub se: u8,
}

impl<'a> TrellisRow<'a> {
    /// Band `ss..=se` priced with `actbl`. DC, if in the band, is rounded.
    pub fn new(actbl: &'a DerivedTable, ss: u8, se: u8) -> Self {
        Self {
            dctbl: None,
            actbl,
            ss,
            se,
        }
    }

    /// Price DC differences with `dctbl` so DC levels can be optimized.
    pub fn with_dc_table(mut self, dctbl: &'a DerivedTable) -> Self {
        self.dctbl = Some(dctbl);
        self
    }
}

/// AC positions optimized as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AcBand {
    s: usize,
    se: usize,
    /// Coded as a progressive AC scan, so EOBs may merge across blocks
    eob_runs: bool,
}

fn ac_bands(config: &TrellisConfig, ss: u8, se: u8) -> Vec<AcBand> {
    let s = ac_start(ss);
    let se = se as usize;
    if se < s {
        return Vec::new();
    }
    let split = config.freq_split as usize;
    if config.use_scans_in_trellis && s <= split && split < se {
        return vec![
            AcBand {
                s,
                se: split,
                eob_runs: true,
            },
            AcBand {
                s: split + 1,
                se,
                eob_runs: true,
            },
        ];
    }
    vec![AcBand {
        s,
        se,
        eob_runs: ss > 0,
    }]
}

/// Trellis-quantize a row of blocks over `row.ss..=row.se`.
///
/// `raw[i]` holds the unquantized coefficients of `blocks[i]`, blocks in
/// raster order. `last_dc` is the quantized DC of the block coded just
/// before this row; when the band includes DC it is updated to the row's
/// final DC.
///
/// With `config.enabled` off every coefficient in the band is rounded.
/// Otherwise AC levels go through the trellis and DC levels through a
/// chained search across the row when `quant_dc` is set and `row` carries
/// a DC table. With `eob_opt`, AC-only bands (including the halves made by
/// `use_scans_in_trellis`) zero blocks whose coding is cheaper folded into
/// an EOB run. Passes after the first reprice against tables fit to the
/// previous pass. When `q_opt` is given, the final levels are accumulated
/// into it.
#[allow(clippy::too_many_arguments)]
pub fn quantize_trellis(
    raw: &[RawBlock],
    blocks: &mut [DctBlock],
    qtable: &QuantTable,
    row: &TrellisRow<'_>,
    config: &TrellisConfig,
    last_dc: &mut i16,
    q_opt: Option<&mut QOptAccumulator>,
) -> Result<()> {
    if raw.len() != blocks.len() {
        return Err(Error::BadState("raw and quantized block counts differ"));
    }
    check_band(row.ss, row.se)?;

    if config.enabled {
        let mut models = Vec::new();
        models.try_reserve_exact(raw.len())?;
        models.extend(raw.iter().map(|r| RdModel::new(config, qtable, r)));

        let bands = ac_bands(config, row.ss, row.se);
        let mut dctbl = match (row.ss, config.quant_dc) {
            (0, true) => row.dctbl.cloned(),
            _ => None,
        };
        let mut actbls = vec![row.actbl.clone(); bands.len()];
        let loops = config.num_loops.max(1);

        for pass in 0..loops {
            let tables = PassTables {
                dctbl: dctbl.as_ref(),
                actbls: &actbls,
            };
            trellis_pass(raw, blocks, &models, &bands, &tables, config, row.ss, *last_dc)?;
            if pass + 1 == loops {
                break;
            }
            if let Some(table) = dctbl.as_mut() {
                let mut counts = SymbolCounts::default();
                count_dc_symbols(blocks, *last_dc, &mut counts);
                *table = refit_table(&mut counts, table, true)?;
            }
            for (band, table) in bands.iter().zip(actbls.iter_mut()) {
                let mut counts = SymbolCounts::default();
                count_ac_symbols(blocks, band, &mut counts);
                *table = refit_table(&mut counts, table, false)?;
            }
            log::trace!("trellis: refit tables after pass {} of {}", pass + 1, loops);
        }
    } else {
        for (raw_block, block) in raw.iter().zip(blocks.iter_mut()) {
            round_band(raw_block, block, qtable, row.ss, row.se);
        }
    }

    if row.ss == 0 {
        if let Some(block) = blocks.last() {
            *last_dc = block[0];
        }
    }

    if let Some(acc) = q_opt {
        for (raw_block, block) in raw.iter().zip(blocks.iter()) {
            acc.accumulate(raw_block, block, row.ss, row.se);
        }
    }
    Ok(())
}

/// Tables one pass prices against.
struct PassTables<'a> {
    dctbl: Option<&'a DerivedTable>,
    /// One per AC band
    actbls: &'a [DerivedTable],
}

#[allow(clippy::too_many_arguments)]
fn trellis_pass(
    raw: &[RawBlock],
    blocks: &mut [DctBlock],
    models: &[RdModel],
    bands: &[AcBand],
    tables: &PassTables<'_>,
    config: &TrellisConfig,
    ss: u8,
    last_dc: i16,
) -> Result<()> {
    if ss == 0 {
        let chained = match tables.dctbl {
            Some(dctbl) => dc_trellis_row(models, raw, blocks, dctbl, last_dc)?,
            None => false,
        };
        if !chained {
            if tables.dctbl.is_some() {
                log::trace!("dc trellis: no encodable chain, rounding");
            }
            for ((model, raw_block), block) in models.iter().zip(raw).zip(blocks.iter_mut()) {
                block[0] = round_quantize(raw_block[0], model.divisor(0)) as i16;
            }
        }
    }

    for (band, actbl) in bands.iter().zip(tables.actbls) {
        let eob_opt = config.eob_opt && band.eob_runs;
        let mut decisions = Vec::new();
        if eob_opt {
            decisions.try_reserve_exact(blocks.len())?;
        }
        for ((model, raw_block), block) in models.iter().zip(raw).zip(blocks.iter_mut()) {
            let decision = optimize_block(model, raw_block, block, actbl, band.s as u8, band.se as u8);
            if eob_opt {
                decisions.push(decision);
            }
        }
        if eob_opt {
            apply_eob_plan(blocks, &decisions, actbl, band)?;
        }
    }
    Ok(())
}

fn apply_eob_plan(
    blocks: &mut [DctBlock],
    decisions: &[BlockDecision],
    actbl: &DerivedTable,
    band: &AcBand,
) -> Result<()> {
    let Some(keep) = plan_eob_runs(decisions, actbl)? else {
        log::trace!("eob_opt: no encodable run plan; keeping per-block choices");
        return Ok(());
    };
    let positions = &JPEG_NATURAL_ORDER[band.s..=band.se];
    let mut zeroed = 0usize;
    for (block, (&kept, decision)) in blocks.iter_mut().zip(keep.iter().zip(decisions)) {
        if kept || decision.eob_class == EobClass::AllZero {
            continue;
        }
        for &z in positions {
            block[z] = 0;
        }
        zeroed += 1;
    }
    log::trace!(
        "eob_opt: zeroed {} of {} blocks in {}..={}",
        zeroed,
        blocks.len(),
        band.s,
        band.se
    );
    Ok(())
}

// =============================================================================
// Table refitting between passes
// =============================================================================

/// Count the DC difference categories of a row.
fn count_dc_symbols(blocks: &[DctBlock], last_dc: i16, counts: &mut SymbolCounts) {
    let mut prev = last_dc as i32;
    for block in blocks {
        let dc = block[0] as i32;
        counts.count(jpeg_nbits(dc - prev) as usize);
        prev = dc;
    }
}

/// Count the AC symbols of a row's band, with EOB runs when the band is
/// coded progressively.
fn count_ac_symbols(blocks: &[DctBlock], band: &AcBand, counts: &mut SymbolCounts) {
    let mut eobrun = 0usize;
    let flush = |eobrun: &mut usize, counts: &mut SymbolCounts| {
        if *eobrun > 0 {
            counts.count(((jpeg_nbits(*eobrun as i32) - 1) as usize) << 4);
            *eobrun = 0;
        }
    };

    for block in blocks {
        let last = (band.s..=band.se)
            .rev()
            .find(|&i| block[JPEG_NATURAL_ORDER[i]] != 0);
        if let Some(last) = last {
            if band.eob_runs {
                flush(&mut eobrun, counts);
            }
            let mut run = 0usize;
            for i in band.s..=last {
                let level = block[JPEG_NATURAL_ORDER[i]] as i32;
                if level == 0 {
                    run += 1;
                    continue;
                }
                while run >= 16 {
                    counts.count(ZRL);
                    run -= 16;
                }
                counts.count((run << 4) | jpeg_nbits(level) as usize);
                run = 0;
            }
            if last == band.se {
                continue;
            }
        }
        if band.eob_runs {
            eobrun += 1;
            if eobrun == MAX_EOB_RUN {
                flush(&mut eobrun, counts);
            }
        } else {
            counts.count(EOB);
        }
    }
    flush(&mut eobrun, counts);
}

/// Table fit to `counts`. Symbols `current` codes keep a code so later
/// passes can still choose them.
fn refit_table(counts: &mut SymbolCounts, current: &DerivedTable, is_dc: bool) -> Result<DerivedTable> {
    let symbols = if is_dc { 16 } else { 256 };
    for symbol in 0..symbols {
        if current.code_length(symbol) != 0 {
            counts.count(symbol);
        }
    }
    counts.derive(is_dc)
}

/// Round every coefficient of the band `ss..=se` to nearest.
fn round_band(raw: &RawBlock, block: &mut DctBlock, qtable: &QuantTable, ss: u8, se: u8) {
    for &z in &JPEG_NATURAL_ORDER[ss as usize..=se as usize] {
        let q = qtable.values[z].max(1) as i32 * 8;
        block[z] = round_quantize(raw[z], q) as i16;
    }
}

/// Quantize a block with plain rounding (no trellis optimization).
///
/// Matches the reciprocal quantizer for accurate-integer raw coefficients.
pub fn simple_quantize_block(raw: &RawBlock, block: &mut DctBlock, qtable: &QuantTable) {
    round_band(raw, block, qtable, 0, (DCTSIZE2 - 1) as u8);
}
