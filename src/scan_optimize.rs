//! Scan optimization for progressive JPEG.
//!
//! The search script encodes a fixed family of candidate scans. After each
//! candidate is written to its own buffer, [`ScanSelector::after_scan`]
//! makes the local decisions that become possible at that point:
//!
//! - luma successive-approximation depth (`Al`),
//! - luma frequency split,
//! - chroma DC interleaving,
//! - chroma `Al` and frequency split.
//!
//! Decisions may skip candidates that can no longer win. Once the last
//! candidate is done, the winning buffers are spliced into the output in
//! script order and the rest are released.
//!
//! Every decision point is derived from [`SearchLayout`], which is computed
//! from the [`ScanSearchConfig`] and the component count.
//!
//! Layout for YCbCr with the default configuration (64 scans):
//!
//! ```text
//! LUMA (23 scans):
//!   0      DC (all components, or luma only when dc_scan_opt_mode = 1)
//!   1, 2   Y 1-8, 9-63 at Al=0
//!   3+3k   Y refinement 1-63 (Ah=k+1, Al=k)      k in 0..al_max_luma
//!   4+3k   Y 1-8 at Al=k+1
//!   5+3k   Y 9-63 at Al=k+1
//!   12     Y full 1-63                             (luma split start)
//!   13..   Y split pairs 1-s, s+1-63
//! CHROMA (41 scans):
//!   23     Cb+Cr DC                                (dc_scan_opt_mode = 1 only)
//!   24, 25 Cb DC, Cr DC                            (dc_scan_opt_mode = 1 only)
//!   26..29 Cb 1-8, Cb 9-63, Cr 1-8, Cr 9-63 at Al=0
//!   30+6k  Cb, Cr refinement 1-63 (Ah=k+1, Al=k)  k in 0..al_max_chroma
//!   32+6k  Cb 1-8, Cb 9-63, Cr 1-8, Cr 9-63 at Al=k+1
//!   42, 43 Cb, Cr full 1-63                        (chroma split start)
//!   44..   Cb and Cr split pairs
//! ```

use std::io::Write;

use crate::consts::{DCTSIZE2, MAX_AH_AL};
use crate::error::{Error, Result};
use crate::types::ScanInfo;

/// Configuration for scan optimization search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSearchConfig {
    /// Maximum successive approximation level for luma (default: 3)
    pub al_max_luma: u8,
    /// Maximum successive approximation level for chroma (default: 2)
    pub al_max_chroma: u8,
    /// Frequency split points to test (default: [2, 8, 5, 12, 18])
    pub frequency_splits: Vec<u8>,
    /// DC scan mode (0 = one interleaved DC scan, 1 = luma DC alone, chroma DC searched)
    pub dc_scan_opt_mode: u8,
}

impl Default for ScanSearchConfig {
    fn default() -> Self {
        Self {
            al_max_luma: 3,
            al_max_chroma: 2,
            frequency_splits: vec![2, 8, 5, 12, 18],
            dc_scan_opt_mode: 0,
        }
    }
}

// =============================================================================
// Layout
// =============================================================================

/// Scan indices of the search script, derived from its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLayout {
    config: ScanSearchConfig,
    num_components: usize,
    /// Number of luma DC scans (always 1)
    pub num_scans_luma_dc: usize,
    /// Number of chroma DC candidates (3 for YCbCr, 0 for grayscale)
    pub num_scans_chroma_dc: usize,
    /// Index of the full luma 1-63 scan; split pairs follow it
    pub luma_freq_split_start: usize,
    /// Number of luma scans (index of the first chroma scan)
    pub num_scans_luma: usize,
    /// Index of the first chroma AC scan
    pub chroma_ac_start: usize,
    /// Index of the full Cb 1-63 scan; Cr full and the split quads follow
    pub chroma_freq_split_start: usize,
    /// Total number of scans
    pub num_scans: usize,
}

impl SearchLayout {
    /// Compute the layout for `num_components` (1 or 3).
    pub fn new(num_components: usize, config: &ScanSearchConfig) -> Result<Self> {
        if num_components != 1 && num_components != 3 {
            return Err(Error::InvalidScanSpec {
                reason: "scan search needs 1 or 3 components",
            });
        }
        if config.dc_scan_opt_mode > 1 {
            return Err(Error::InvalidScanSpec {
                reason: "dc_scan_opt_mode must be 0 or 1",
            });
        }
        if config.al_max_luma >= MAX_AH_AL || config.al_max_chroma >= MAX_AH_AL {
            return Err(Error::InvalidScanSpec {
                reason: "successive approximation limit out of range",
            });
        }
        if config
            .frequency_splits
            .iter()
            .any(|&s| s == 0 || s as usize >= DCTSIZE2 - 1)
        {
            return Err(Error::InvalidScanSpec {
                reason: "frequency split must lie in 1..=61",
            });
        }

        let al_luma = config.al_max_luma as usize;
        let al_chroma = config.al_max_chroma as usize;
        let splits = config.frequency_splits.len();

        let num_scans_luma_dc = 1;
        let luma_freq_split_start = num_scans_luma_dc + 3 * al_luma + 2;
        let num_scans_luma = luma_freq_split_start + 2 * splits + 1;

        let (num_scans_chroma_dc, chroma_ac_start, chroma_freq_split_start, num_scans) =
            if num_components == 3 {
                let chroma_ac_start = num_scans_luma + 3;
                let chroma_freq_split_start = chroma_ac_start + 6 * al_chroma + 4;
                let num_scans = chroma_freq_split_start + 2 + 4 * splits;
                (3, chroma_ac_start, chroma_freq_split_start, num_scans)
            } else {
                (0, num_scans_luma, num_scans_luma, num_scans_luma)
            };

        Ok(Self {
            config: config.clone(),
            num_components,
            num_scans_luma_dc,
            num_scans_chroma_dc,
            luma_freq_split_start,
            num_scans_luma,
            chroma_ac_start,
            chroma_freq_split_start,
            num_scans,
        })
    }

    /// The configuration this layout was built from.
    pub fn config(&self) -> &ScanSearchConfig {
        &self.config
    }

    /// Number of image components.
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// First chroma candidate the search encodes.
    ///
    /// With `dc_scan_opt_mode` 0 chroma DC rides in scan 0, so the chroma DC
    /// candidates are never encoded and the search resumes at the first
    /// chroma AC scan.
    pub fn chroma_search_start(&self) -> usize {
        if self.num_components == 3 && self.config.dc_scan_opt_mode == 0 {
            self.chroma_ac_start
        } else {
            self.num_scans_luma
        }
    }

    /// Generate the candidate scans in layout order.
    pub fn scans(&self) -> Vec<ScanInfo> {
        let cfg = &self.config;
        let mut scans = Vec::with_capacity(self.num_scans);

        if cfg.dc_scan_opt_mode == 0 {
            scans.push(ScanInfo::dc_scan(self.num_components as u8));
        } else {
            scans.push(ScanInfo::dc_scan_single(0));
        }

        scans.push(ScanInfo::ac_scan(0, 1, 8, 0, 0));
        scans.push(ScanInfo::ac_scan(0, 9, 63, 0, 0));
        for al in 0..cfg.al_max_luma {
            scans.push(ScanInfo::ac_scan(0, 1, 63, al + 1, al));
            scans.push(ScanInfo::ac_scan(0, 1, 8, 0, al + 1));
            scans.push(ScanInfo::ac_scan(0, 9, 63, 0, al + 1));
        }
        scans.push(ScanInfo::ac_scan(0, 1, 63, 0, 0));
        for &split in &cfg.frequency_splits {
            scans.push(ScanInfo::ac_scan(0, 1, split, 0, 0));
            scans.push(ScanInfo::ac_scan(0, split + 1, 63, 0, 0));
        }

        if self.num_components == 3 {
            scans.push(ScanInfo::dc_scan_pair(1, 2));
            scans.push(ScanInfo::dc_scan_single(1));
            scans.push(ScanInfo::dc_scan_single(2));

            scans.push(ScanInfo::ac_scan(1, 1, 8, 0, 0));
            scans.push(ScanInfo::ac_scan(1, 9, 63, 0, 0));
            scans.push(ScanInfo::ac_scan(2, 1, 8, 0, 0));
            scans.push(ScanInfo::ac_scan(2, 9, 63, 0, 0));
            for al in 0..cfg.al_max_chroma {
                scans.push(ScanInfo::ac_scan(1, 1, 63, al + 1, al));
                scans.push(ScanInfo::ac_scan(2, 1, 63, al + 1, al));
                scans.push(ScanInfo::ac_scan(1, 1, 8, 0, al + 1));
                scans.push(ScanInfo::ac_scan(1, 9, 63, 0, al + 1));
                scans.push(ScanInfo::ac_scan(2, 1, 8, 0, al + 1));
                scans.push(ScanInfo::ac_scan(2, 9, 63, 0, al + 1));
            }
            scans.push(ScanInfo::ac_scan(1, 1, 63, 0, 0));
            scans.push(ScanInfo::ac_scan(2, 1, 63, 0, 0));
            for &split in &cfg.frequency_splits {
                scans.push(ScanInfo::ac_scan(1, 1, split, 0, 0));
                scans.push(ScanInfo::ac_scan(1, split + 1, 63, 0, 0));
                scans.push(ScanInfo::ac_scan(2, 1, split, 0, 0));
                scans.push(ScanInfo::ac_scan(2, split + 1, 63, 0, 0));
            }
        }

        scans
    }

    /// Check that a caller-supplied script is exactly this layout.
    pub fn check_script(&self, script: &[ScanInfo]) -> Result<()> {
        let expected = self.scans();
        if let Some(scan) = expected
            .iter()
            .zip(script.iter())
            .position(|(want, got)| want != got)
        {
            return Err(Error::BadScanScript { scan });
        }
        if script.len() != expected.len() {
            return Err(Error::BadScanScript {
                scan: script.len().min(expected.len()),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Results from scan optimization search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSearchResult {
    /// Best successive approximation level for luma
    pub best_al_luma: u8,
    /// Best successive approximation level for chroma
    pub best_al_chroma: u8,
    /// Best frequency split index for luma (0 = full 1-63, else 1-based into `frequency_splits`)
    pub best_freq_split_luma: usize,
    /// Best frequency split index for chroma
    pub best_freq_split_chroma: usize,
    /// Whether to interleave chroma DC scans
    pub interleave_chroma_dc: bool,
    /// Candidate scan indices making up the output, in order
    pub order: Vec<usize>,
}

impl ScanSearchResult {
    /// The chosen scans, with `Al` as they were encoded.
    pub fn final_scans(&self, layout: &SearchLayout) -> Vec<ScanInfo> {
        let candidates = layout.scans();
        self.order
            .iter()
            .filter_map(|&i| {
                let mut scan = *candidates.get(i)?;
                if let Some(al) = al_override(layout, self.best_al_luma, self.best_al_chroma, i) {
                    scan.al = al;
                }
                Some(scan)
            })
            .collect()
    }
}

fn al_override(layout: &SearchLayout, al_luma: u8, al_chroma: u8, scan: usize) -> Option<u8> {
    if scan >= layout.luma_freq_split_start && scan < layout.num_scans_luma {
        Some(al_luma)
    } else if layout.num_components == 3
        && scan >= layout.chroma_freq_split_start
        && scan < layout.num_scans
    {
        Some(al_chroma)
    } else {
        None
    }
}

/// Incremental scan selector.
///
/// Feed it the sizes of encoded candidates through [`after_scan`](Self::after_scan);
/// read the outcome with [`result`](Self::result) once every remaining
/// candidate has been encoded or skipped.
#[derive(Debug, Clone)]
pub struct ScanSelector {
    layout: SearchLayout,
    best_cost: usize,
    best_al_luma: u8,
    best_al_chroma: u8,
    best_freq_split_luma: usize,
    best_freq_split_chroma: usize,
    interleave_chroma_dc: bool,
}

impl ScanSelector {
    /// Create a selector for `layout`.
    pub fn new(layout: SearchLayout) -> Self {
        Self {
            layout,
            best_cost: 0,
            best_al_luma: 0,
            best_al_chroma: 0,
            best_freq_split_luma: 0,
            best_freq_split_chroma: 0,
            interleave_chroma_dc: true,
        }
    }

    /// The layout being searched.
    pub fn layout(&self) -> &SearchLayout {
        &self.layout
    }

    /// `Al` to encode candidate `scan` with, if it differs from the script.
    ///
    /// Frequency-split candidates are encoded at the successive
    /// approximation depth already chosen for their component.
    pub fn al_for_scan(&self, scan: usize) -> Option<u8> {
        al_override(&self.layout, self.best_al_luma, self.best_al_chroma, scan)
    }

    /// Record that every scan before `next_scan` is done, with `sizes[i]`
    /// bytes for scan `i`.
    ///
    /// Returns `Some(target)` when candidates before `target` can no longer
    /// win and should be skipped; the next scan to encode is then `target`.
    pub fn after_scan(&mut self, next_scan: usize, sizes: &[usize]) -> Option<usize> {
        let l = &self.layout;
        let size = |i: usize| sizes.get(i).copied().unwrap_or(0);
        let lfs = l.luma_freq_split_start;

        if next_scan > 1 && next_scan <= lfs {
            if (next_scan - 1) % 3 == 2 {
                let al = (next_scan - 1) / 3;
                let mut cost = size(next_scan - 2) + size(next_scan - 1);
                for i in 0..al {
                    cost += size(3 + 3 * i);
                }
                log::debug!("scan search: luma Al={} cost={}", al, cost);
                if al == 0 || cost < self.best_cost {
                    self.best_cost = cost;
                    self.best_al_luma = al as u8;
                } else {
                    return Some(lfs);
                }
            }
        } else if next_scan > lfs && next_scan <= l.num_scans_luma {
            if next_scan == lfs + 1 {
                self.best_freq_split_luma = 0;
                self.best_cost = size(next_scan - 1);
            } else if (next_scan - lfs) % 2 == 1 {
                let idx = (next_scan - lfs) >> 1;
                let cost = size(next_scan - 2) + size(next_scan - 1);
                log::debug!("scan search: luma split {} cost={}", idx, cost);
                if cost < self.best_cost {
                    self.best_cost = cost;
                    self.best_freq_split_luma = idx;
                }
                if split_search_exhausted(idx, self.best_freq_split_luma) {
                    return Some(l.chroma_search_start());
                }
            }
            if next_scan == l.num_scans_luma && l.chroma_search_start() > next_scan {
                return Some(l.chroma_search_start());
            }
        } else if l.num_components > 1 {
            let base = l.num_scans_luma;
            let ac_start = l.chroma_ac_start;
            let cfs = l.chroma_freq_split_start;

            if next_scan == ac_start {
                self.interleave_chroma_dc = size(base) <= size(base + 1) + size(base + 2);
                log::debug!(
                    "scan search: chroma DC interleaved={}",
                    self.interleave_chroma_dc
                );
            } else if next_scan > ac_start && next_scan <= cfs {
                if (next_scan - ac_start) % 6 == 4 {
                    let al = (next_scan - ac_start - 4) / 6;
                    let mut cost: usize = (next_scan - 4..next_scan).map(size).sum();
                    for i in 0..al {
                        cost += size(ac_start + 4 + 6 * i) + size(ac_start + 5 + 6 * i);
                    }
                    log::debug!("scan search: chroma Al={} cost={}", al, cost);
                    if al == 0 || cost < self.best_cost {
                        self.best_cost = cost;
                        self.best_al_chroma = al as u8;
                    } else {
                        return Some(cfs);
                    }
                }
            } else if next_scan > cfs && next_scan <= l.num_scans {
                if next_scan == cfs + 2 {
                    self.best_freq_split_chroma = 0;
                    self.best_cost = size(next_scan - 2) + size(next_scan - 1);
                } else if (next_scan - cfs) % 4 == 2 {
                    let idx = (next_scan - cfs) >> 2;
                    let cost: usize = (next_scan - 4..next_scan).map(size).sum();
                    log::debug!("scan search: chroma split {} cost={}", idx, cost);
                    if cost < self.best_cost {
                        self.best_cost = cost;
                        self.best_freq_split_chroma = idx;
                    }
                    if split_search_exhausted(idx, self.best_freq_split_chroma) {
                        return Some(l.num_scans);
                    }
                }
            }
        }
        None
    }

    /// Final selection and the candidate order to emit.
    pub fn result(&self) -> ScanSearchResult {
        let l = &self.layout;
        let mut order = vec![0];

        let lfs = l.luma_freq_split_start;
        if self.best_freq_split_luma == 0 {
            order.push(lfs);
        } else {
            let first = lfs + 2 * (self.best_freq_split_luma - 1) + 1;
            order.extend([first, first + 1]);
        }
        for al in (0..self.best_al_luma as usize).rev() {
            order.push(3 + 3 * al);
        }

        if l.num_components == 3 {
            let base = l.num_scans_luma;
            if l.config.dc_scan_opt_mode == 1 {
                if self.interleave_chroma_dc {
                    order.push(base);
                } else {
                    order.extend([base + 1, base + 2]);
                }
            }

            let cfs = l.chroma_freq_split_start;
            if self.best_freq_split_chroma == 0 {
                order.extend([cfs, cfs + 1]);
            } else {
                let first = cfs + 4 * (self.best_freq_split_chroma - 1) + 2;
                order.extend(first..first + 4);
            }
            for al in (0..self.best_al_chroma as usize).rev() {
                order.extend([l.chroma_ac_start + 4 + 6 * al, l.chroma_ac_start + 5 + 6 * al]);
            }
        }

        ScanSearchResult {
            best_al_luma: self.best_al_luma,
            best_al_chroma: self.best_al_chroma,
            best_freq_split_luma: self.best_freq_split_luma,
            best_freq_split_chroma: self.best_freq_split_chroma,
            interleave_chroma_dc: self.interleave_chroma_dc,
            order,
        }
    }

    /// Run the whole selection over a complete size table.
    ///
    /// Skipped candidates are simply not consulted.
    pub fn select_best(mut self, sizes: &[usize]) -> ScanSearchResult {
        let mut next = 1;
        while next <= self.layout.num_scans {
            next = match self.after_scan(next, sizes) {
                Some(target) => target + 1,
                None => next + 1,
            };
        }
        self.result()
    }
}

/// After testing the first splits, stop if the trend says later ones cannot win.
fn split_search_exhausted(idx: usize, best: usize) -> bool {
    (idx == 2 && best == 0) || (idx == 3 && best != 2) || (idx == 4 && best != 4)
}

// =============================================================================
// Candidate buffers
// =============================================================================

/// One in-memory destination per candidate scan.
///
/// Buffers are created when a candidate is encoded and released when the
/// selection is committed.
#[derive(Debug, Default)]
pub struct CandidateArena {
    buffers: Vec<Option<Vec<u8>>>,
}

impl CandidateArena {
    /// Arena with room for `num_scans` candidates.
    pub fn new(num_scans: usize) -> Result<Self> {
        let mut buffers = Vec::new();
        buffers.try_reserve_exact(num_scans)?;
        buffers.resize_with(num_scans, || None);
        Ok(Self { buffers })
    }

    /// Fresh destination for candidate `scan`, replacing any earlier content.
    pub fn begin(&mut self, scan: usize) -> Result<&mut Vec<u8>> {
        let slot = self
            .buffers
            .get_mut(scan)
            .ok_or(Error::BadState("candidate scan out of range"))?;
        Ok(slot.insert(Vec::new()))
    }

    /// Size of candidate `scan`, or 0 if it was never encoded.
    pub fn size(&self, scan: usize) -> usize {
        self.buffers
            .get(scan)
            .and_then(|b| b.as_ref())
            .map_or(0, Vec::len)
    }

    /// Number of candidates currently holding data.
    pub fn live_buffers(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_some()).count()
    }

    /// Write the chosen candidates to `out` in `order`, then release every buffer.
    ///
    /// Returns the number of bytes written.
    pub fn commit(&mut self, order: &[usize], out: &mut dyn Write) -> Result<usize> {
        let mut written = 0;
        for &scan in order {
            let data = self
                .buffers
                .get(scan)
                .and_then(|b| b.as_deref())
                .ok_or(Error::BadState("selected candidate was never encoded"))?;
            out.write_all(data)?;
            written += data.len();
        }
        let released = self.live_buffers();
        for slot in &mut self.buffers {
            *slot = None;
        }
        log::debug!(
            "scan search: committed {} scans ({} bytes), released {} buffers",
            order.len(),
            written,
            released
        );
        Ok(written)
    }
}
