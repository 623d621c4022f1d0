//! Scan scripts: construction and validation.
//!
//! A script is an ordered list of [`ScanInfo`]. The first scan decides the
//! mode: a scan covering 0..63 at full precision makes the script
//! sequential, anything else makes it progressive.

use crate::consts::{DCTSIZE2, MAX_AH_AL, MAX_COMPONENTS, MAX_COMPS_IN_SCAN};
use crate::error::{Error, Result};
use crate::scan_optimize::{ScanSearchConfig, SearchLayout};
use crate::types::ScanInfo;

/// How a validated script transmits coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Each component sent once with all 64 coefficients
    Sequential,
    /// Spectral selection and/or successive approximation
    Progressive,
}

fn check_num_components(num_components: usize) -> Result<()> {
    if num_components == 0 || num_components > MAX_COMPONENTS {
        return Err(Error::ComponentCount {
            count: num_components,
            max: MAX_COMPONENTS,
        });
    }
    Ok(())
}

/// Component count and ordering checks shared by every script form.
fn check_scan_components(scan: &ScanInfo, scan_no: usize, num_components: usize) -> Result<()> {
    let ncomps = scan.comps_in_scan as usize;
    if ncomps == 0 || ncomps > MAX_COMPS_IN_SCAN {
        return Err(Error::ComponentCount {
            count: ncomps,
            max: MAX_COMPS_IN_SCAN,
        });
    }
    let comps = scan.components();
    for (i, &c) in comps.iter().enumerate() {
        if c as usize >= num_components || (i > 0 && c <= comps[i - 1]) {
            return Err(Error::BadScanScript { scan: scan_no });
        }
    }
    Ok(())
}

fn bad_progression(scan: &ScanInfo, scan_no: usize) -> Error {
    Error::BadProgression {
        scan: scan_no,
        ss: scan.ss,
        se: scan.se,
        ah: scan.ah,
        al: scan.al,
    }
}

fn check_progression_bounds(scan: &ScanInfo, scan_no: usize) -> Result<()> {
    let last = (DCTSIZE2 - 1) as u8;
    if scan.ss > last || scan.se < scan.ss || scan.se > last {
        return Err(bad_progression(scan, scan_no));
    }
    if scan.ah > MAX_AH_AL || scan.al > MAX_AH_AL {
        return Err(bad_progression(scan, scan_no));
    }
    // DC and AC cannot share a scan; AC scans carry a single component
    if scan.ss == 0 && scan.se != 0 {
        return Err(bad_progression(scan, scan_no));
    }
    if scan.ss != 0 && scan.comps_in_scan != 1 {
        return Err(bad_progression(scan, scan_no));
    }
    Ok(())
}

/// Validate `scans` for an image with `num_components` components.
///
/// Runs once before any pass. Progressive scripts are checked coefficient
/// by coefficient: the first scan of a coefficient must have `Ah = 0`, each
/// later one must refine by exactly one bit (`Ah` = previous `Al`,
/// `Al = Ah - 1`), and no AC scan may precede the component's DC scan.
/// Sequential scripts must send every component exactly once.
pub fn validate_script(scans: &[ScanInfo], num_components: usize) -> Result<ScriptMode> {
    check_num_components(num_components)?;
    let first = scans.first().ok_or(Error::BadScanScript { scan: 0 })?;

    if first.ss != 0 || first.se as usize != DCTSIZE2 - 1 {
        validate_progressive(scans, num_components)?;
        Ok(ScriptMode::Progressive)
    } else {
        validate_sequential(scans, num_components)?;
        Ok(ScriptMode::Sequential)
    }
}

fn validate_progressive(scans: &[ScanInfo], num_components: usize) -> Result<()> {
    // Last Al sent per component and coefficient; None = never sent
    let mut last_bitpos = vec![[None::<u8>; DCTSIZE2]; num_components];

    for (scan_no, scan) in scans.iter().enumerate() {
        check_scan_components(scan, scan_no, num_components)?;
        check_progression_bounds(scan, scan_no)?;

        for &c in scan.components() {
            let bitpos = &mut last_bitpos[c as usize];
            if scan.ss != 0 && bitpos[0].is_none() {
                log::debug!("scan {} sends AC for component {} before its DC", scan_no, c);
                return Err(bad_progression(scan, scan_no));
            }
            for coef in &mut bitpos[scan.ss as usize..=scan.se as usize] {
                match *coef {
                    None if scan.is_refinement() => return Err(bad_progression(scan, scan_no)),
                    Some(prev) if scan.ah != prev || scan.al + 1 != scan.ah => {
                        return Err(bad_progression(scan, scan_no));
                    }
                    _ => {}
                }
                *coef = Some(scan.al);
            }
        }
    }

    if let Some(component) = last_bitpos.iter().position(|b| b[0].is_none()) {
        return Err(Error::MissingData { component });
    }
    Ok(())
}

fn validate_sequential(scans: &[ScanInfo], num_components: usize) -> Result<()> {
    let mut sent = vec![false; num_components];

    for (scan_no, scan) in scans.iter().enumerate() {
        check_scan_components(scan, scan_no, num_components)?;
        if !scan.is_sequential() {
            return Err(bad_progression(scan, scan_no));
        }
        for &c in scan.components() {
            if std::mem::replace(&mut sent[c as usize], true) {
                return Err(Error::BadScanScript { scan: scan_no });
            }
        }
    }

    if let Some(component) = sent.iter().position(|&s| !s) {
        return Err(Error::MissingData { component });
    }
    Ok(())
}

/// Validate a scan-search candidate script.
///
/// Candidates deliberately overlap (the same coefficients are encoded at
/// several depths), so only per-scan bounds and component references are
/// checked here, plus a DC scan for every component.
pub fn validate_search_script(scans: &[ScanInfo], num_components: usize) -> Result<()> {
    check_num_components(num_components)?;
    if scans.is_empty() {
        return Err(Error::BadScanScript { scan: 0 });
    }
    let mut dc_sent = vec![false; num_components];
    for (scan_no, scan) in scans.iter().enumerate() {
        check_scan_components(scan, scan_no, num_components)?;
        check_progression_bounds(scan, scan_no)?;
        if scan.ss == 0 {
            for &c in scan.components() {
                dc_sent[c as usize] = true;
            }
        }
    }
    if let Some(component) = dc_sent.iter().position(|&s| !s) {
        return Err(Error::MissingData { component });
    }
    Ok(())
}

// =============================================================================
// Builders
// =============================================================================

/// Baseline script: all components interleaved, in groups of at most four.
pub fn sequential_script(num_components: usize) -> Result<Vec<ScanInfo>> {
    check_num_components(num_components)?;
    let comps: Vec<u8> = (0..num_components as u8).collect();
    Ok(comps
        .chunks(MAX_COMPS_IN_SCAN)
        .map(ScanInfo::sequential)
        .collect())
}

fn push_dc_scans(scans: &mut Vec<ScanInfo>, num_components: usize, ah: u8, al: u8) {
    if num_components <= MAX_COMPS_IN_SCAN {
        let mut scan = ScanInfo::dc_scan(num_components as u8);
        scan.ah = ah;
        scan.al = al;
        scans.push(scan);
    } else {
        for c in 0..num_components as u8 {
            scans.push(ScanInfo::ac_scan(c, 0, 0, ah, al));
        }
    }
}

fn push_ac_scans(scans: &mut Vec<ScanInfo>, num_components: usize, ss: u8, se: u8, ah: u8, al: u8) {
    for c in 0..num_components as u8 {
        scans.push(ScanInfo::ac_scan(c, ss, se, ah, al));
    }
}

/// The standard progressive script.
///
/// Three components are treated as YCbCr and get the 10-scan script that
/// sends early luma detail first; any other count uses the generic
/// two-stage successive approximation.
pub fn simple_progression(num_components: usize) -> Result<Vec<ScanInfo>> {
    check_num_components(num_components)?;

    let mut scans = Vec::new();
    if num_components == 3 {
        push_dc_scans(&mut scans, 3, 0, 1);
        scans.push(ScanInfo::ac_scan(0, 1, 5, 0, 2));
        scans.push(ScanInfo::ac_scan(2, 1, 63, 0, 1));
        scans.push(ScanInfo::ac_scan(1, 1, 63, 0, 1));
        scans.push(ScanInfo::ac_scan(0, 6, 63, 0, 2));
        scans.push(ScanInfo::ac_scan(0, 1, 63, 2, 1));
        push_dc_scans(&mut scans, 3, 1, 0);
        scans.push(ScanInfo::ac_scan(2, 1, 63, 1, 0));
        scans.push(ScanInfo::ac_scan(1, 1, 63, 1, 0));
        // Luma bottom bit last: usually the largest scan
        scans.push(ScanInfo::ac_scan(0, 1, 63, 1, 0));
    } else {
        push_dc_scans(&mut scans, num_components, 0, 1);
        push_ac_scans(&mut scans, num_components, 1, 5, 0, 2);
        push_ac_scans(&mut scans, num_components, 6, 63, 0, 2);
        push_ac_scans(&mut scans, num_components, 1, 63, 2, 1);
        push_dc_scans(&mut scans, num_components, 1, 0);
        push_ac_scans(&mut scans, num_components, 1, 63, 1, 0);
    }
    Ok(scans)
}

/// The candidate script searched by scan optimization.
///
/// Only grayscale and YCbCr can be searched; other component counts get
/// [`simple_progression`].
pub fn search_progression(num_components: usize, config: &ScanSearchConfig) -> Result<Vec<ScanInfo>> {
    check_num_components(num_components)?;
    if num_components != 1 && num_components != 3 {
        log::debug!(
            "no scan search for {} components; using the simple progression",
            num_components
        );
        return simple_progression(num_components);
    }
    Ok(SearchLayout::new(num_components, config)?.scans())
}
