//! Compression master: the pass and scan scheduler.
//!
//! A compression run is a sequence of passes over the coefficient data:
//!
//! - `Main` reads the image and either gathers Huffman statistics for scan 0
//!   (when optimizing) or writes scan 0 directly.
//! - `HuffOpt` gathers statistics for a later scan from buffered coefficients.
//! - `Output` writes one scan.
//!
//! With Huffman optimization each scan costs two passes, otherwise one.
//! The entropy coding itself is done by a [`PassHandler`]; the master only
//! decides what each pass is and where its bytes go.
//!
//! With `optimize_scans`, every output pass writes into a per-scan candidate
//! buffer. After each one the [`ScanSelector`] may skip candidates, and
//! after the last the winners are spliced into the real destination.

use std::io::{self, Write};

use crate::error::{Error, Result};
use crate::scan_optimize::{
    CandidateArena, ScanSearchConfig, ScanSearchResult, ScanSelector, SearchLayout,
};
use crate::script::{sequential_script, validate_script, validate_search_script, ScriptMode};
use crate::types::ScanInfo;

/// Kind of pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    /// First pass over the image data
    Main,
    /// Statistics gathering for a scan after the first
    HuffOpt,
    /// Writes one scan
    Output,
}

/// Master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Number of image components
    pub num_components: usize,
    /// Scan script; `None` means a single sequential scan
    /// (or the search script when `optimize_scans` is set)
    pub scans: Option<Vec<ScanInfo>>,
    /// Gather statistics before writing each scan
    pub optimize_coding: bool,
    /// Search the candidate script and keep the smallest scans
    pub optimize_scans: bool,
    /// Search parameters used with `optimize_scans`
    pub scan_search: ScanSearchConfig,
}

impl MasterConfig {
    /// Sequential, unoptimized configuration for `num_components`.
    pub fn new(num_components: usize) -> Self {
        Self {
            num_components,
            scans: None,
            optimize_coding: false,
            optimize_scans: false,
            scan_search: ScanSearchConfig::default(),
        }
    }

    /// Use an explicit scan script.
    pub fn with_scans(mut self, scans: Vec<ScanInfo>) -> Self {
        self.scans = Some(scans);
        self
    }

    /// Enable or disable Huffman optimization.
    pub fn optimize_coding(mut self, enable: bool) -> Self {
        self.optimize_coding = enable;
        self
    }

    /// Enable or disable scan optimization.
    pub fn optimize_scans(mut self, enable: bool) -> Self {
        self.optimize_scans = enable;
        self
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// What the current pass must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfo {
    /// Kind of pass
    pub pass_type: PassType,
    /// Pass counter, `0..total_passes`
    pub pass_number: usize,
    /// Index of the scan in the script
    pub scan_number: usize,
    /// Scan parameters to use (`Al` may differ from the script under scan search)
    pub scan: ScanInfo,
    /// Gather Huffman statistics instead of emitting
    pub gather_statistics: bool,
    /// Emit entropy-coded data to the destination
    pub writes_output: bool,
    /// Last pass of the run
    pub is_last_pass: bool,
    /// First scan written: the frame header precedes it
    pub first_scan: bool,
}

/// Performs the work of one pass.
pub trait PassHandler {
    /// Run `pass`, writing any output to `out`.
    fn encode_pass(&mut self, pass: &PassInfo, out: &mut dyn Write) -> Result<()>;
}

/// Outcome of [`CompMaster::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes actually handed to the handler
    pub passes_run: usize,
    /// Nominal pass count for the script
    pub total_passes: usize,
    /// Bytes written to the destination
    pub bytes_written: usize,
    /// Scan search outcome, when scan optimization ran
    pub selection: Option<ScanSearchResult>,
}

struct ScanSearch {
    selector: ScanSelector,
    arena: CandidateArena,
    sizes: Vec<usize>,
    result: Option<ScanSearchResult>,
}

/// Scheduler state for one compression run.
pub struct CompMaster {
    scans: Vec<ScanInfo>,
    mode: ScriptMode,
    optimize_coding: bool,
    pass_type: PassType,
    pass_number: usize,
    scan_number: usize,
    total_passes: usize,
    search: Option<ScanSearch>,
}

impl std::fmt::Debug for CompMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompMaster")
            .field("num_scans", &self.scans.len())
            .field("mode", &self.mode)
            .field("pass_type", &self.pass_type)
            .field("pass_number", &self.pass_number)
            .field("scan_number", &self.scan_number)
            .field("total_passes", &self.total_passes)
            .field("optimize_scans", &self.search.is_some())
            .finish()
    }
}

impl CompMaster {
    /// Validate the configuration and prepare the first pass.
    ///
    /// All script errors surface here, before any pass runs.
    pub fn new(config: MasterConfig) -> Result<Self> {
        let MasterConfig {
            num_components,
            scans,
            optimize_coding,
            optimize_scans,
            scan_search,
        } = config;

        let (scans, mode, search) = if optimize_scans {
            let layout = SearchLayout::new(num_components, &scan_search)?;
            let scans = match scans {
                Some(scans) => {
                    validate_search_script(&scans, num_components)?;
                    layout.check_script(&scans)?;
                    scans
                }
                None => layout.scans(),
            };
            let search = ScanSearch {
                arena: CandidateArena::new(scans.len())?,
                sizes: crate::alloc::try_alloc_vec(0usize, scans.len())?,
                selector: ScanSelector::new(layout),
                result: None,
            };
            (scans, ScriptMode::Progressive, Some(search))
        } else {
            let scans = match scans {
                Some(scans) => scans,
                None => sequential_script(num_components)?,
            };
            let mode = validate_script(&scans, num_components)?;
            (scans, mode, None)
        };

        let passes_per_scan = if optimize_coding { 2 } else { 1 };
        let total_passes = passes_per_scan * scans.len();
        log::debug!(
            "master: {:?} script, {} scans, {} passes, optimize_scans={}",
            mode,
            scans.len(),
            total_passes,
            search.is_some()
        );

        Ok(Self {
            scans,
            mode,
            optimize_coding,
            pass_type: PassType::Main,
            pass_number: 0,
            scan_number: 0,
            total_passes,
            search,
        })
    }

    /// The scan script being run.
    pub fn scans(&self) -> &[ScanInfo] {
        &self.scans
    }

    /// Sequential or progressive.
    pub fn mode(&self) -> ScriptMode {
        self.mode
    }

    /// Nominal number of passes.
    pub fn total_passes(&self) -> usize {
        self.total_passes
    }

    /// Current pass counter.
    pub fn pass_number(&self) -> usize {
        self.pass_number
    }

    /// Current scan index.
    pub fn scan_number(&self) -> usize {
        self.scan_number
    }

    /// Kind of the next pass.
    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    /// Whether every pass has been run.
    pub fn is_done(&self) -> bool {
        self.pass_number >= self.total_passes
    }

    /// Scan search outcome, once committed.
    pub fn selection(&self) -> Option<&ScanSearchResult> {
        self.search.as_ref().and_then(|s| s.result.as_ref())
    }

    fn passes_per_scan(&self) -> usize {
        if self.optimize_coding {
            2
        } else {
            1
        }
    }

    fn current_scan(&self) -> Result<ScanInfo> {
        let mut scan = *self
            .scans
            .get(self.scan_number)
            .ok_or(Error::BadState("scan number past end of script"))?;
        if let Some(al) = self
            .search
            .as_ref()
            .and_then(|s| s.selector.al_for_scan(self.scan_number))
        {
            scan.al = al;
        }
        Ok(scan)
    }

    /// Describe the next pass.
    ///
    /// A statistics pass for a DC refinement scan is skipped: such scans
    /// use no Huffman table, so the pass is reclassified as output.
    pub fn prepare_for_pass(&mut self) -> Result<PassInfo> {
        if self.is_done() {
            return Err(Error::BadState("no passes remain"));
        }
        let scan = self.current_scan()?;

        let (gather_statistics, writes_output) = match self.pass_type {
            PassType::Main => (self.optimize_coding, !self.optimize_coding),
            PassType::HuffOpt if !(scan.is_dc_scan() && scan.is_refinement()) => (true, false),
            PassType::HuffOpt => {
                log::debug!("master: DC refinement scan {} needs no statistics", self.scan_number);
                self.pass_type = PassType::Output;
                self.pass_number += 1;
                (false, true)
            }
            PassType::Output => (false, true),
        };

        let info = PassInfo {
            pass_type: self.pass_type,
            pass_number: self.pass_number,
            scan_number: self.scan_number,
            scan,
            gather_statistics,
            writes_output,
            is_last_pass: self.pass_number + 1 == self.total_passes,
            first_scan: writes_output && self.scan_number == 0,
        };
        log::debug!(
            "master: pass {} {:?} scan {} (Ss={} Se={} Ah={} Al={})",
            info.pass_number,
            info.pass_type,
            info.scan_number,
            scan.ss,
            scan.se,
            scan.ah,
            scan.al
        );
        Ok(info)
    }

    /// Advance past the pass described by the last [`prepare_for_pass`](Self::prepare_for_pass).
    ///
    /// Under scan search this records the scan's size, applies any skip
    /// the selector decides on, and after the final scan writes the
    /// winning candidates to `out`.
    pub fn finish_pass(&mut self, out: &mut dyn Write) -> Result<()> {
        match self.pass_type {
            PassType::Main => {
                self.pass_type = PassType::Output;
                if !self.optimize_coding {
                    self.after_output(out)?;
                    self.scan_number += 1;
                }
            }
            PassType::HuffOpt => self.pass_type = PassType::Output,
            PassType::Output => {
                if self.optimize_coding {
                    self.pass_type = PassType::HuffOpt;
                }
                self.after_output(out)?;
                self.scan_number += 1;
            }
        }
        self.pass_number += 1;
        Ok(())
    }

    fn after_output(&mut self, out: &mut dyn Write) -> Result<()> {
        let passes_per_scan = self.passes_per_scan();
        let num_scans = self.scans.len();
        let Some(search) = self.search.as_mut() else {
            return Ok(());
        };

        let scan = self.scan_number;
        search.sizes[scan] = search.arena.size(scan);
        if let Some(target) = search.selector.after_scan(scan + 1, &search.sizes) {
            log::debug!("master: skipping candidate scans {}..{}", scan + 1, target);
            self.scan_number = target - 1;
            self.pass_number = passes_per_scan * target - 1;
        }

        if self.scan_number + 1 >= num_scans {
            let result = search.selector.result();
            search.arena.commit(&result.order, out)?;
            search.result = Some(result);
        }
        Ok(())
    }

    /// Run every remaining pass through `handler`.
    pub fn run<H: PassHandler + ?Sized>(
        &mut self,
        handler: &mut H,
        out: &mut dyn Write,
    ) -> Result<RunSummary> {
        let mut out = CountingWriter { inner: out, count: 0 };
        let mut passes_run = 0;

        while !self.is_done() {
            let info = self.prepare_for_pass()?;
            match (self.search.as_mut(), info.writes_output) {
                (Some(search), true) => {
                    let buf = search.arena.begin(info.scan_number)?;
                    handler.encode_pass(&info, buf)?;
                }
                (None, true) => handler.encode_pass(&info, &mut out)?,
                (_, false) => handler.encode_pass(&info, &mut io::sink())?,
            }
            passes_run += 1;
            self.finish_pass(&mut out)?;
        }

        Ok(RunSummary {
            passes_run,
            total_passes: self.total_passes,
            bytes_written: out.count,
            selection: self.selection().cloned(),
        })
    }
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    count: usize,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::simple_progression;

    /// Records each pass and writes one byte per output pass.
    #[derive(Default)]
    struct Recorder {
        passes: Vec<(PassType, usize)>,
    }

    impl PassHandler for Recorder {
        fn encode_pass(&mut self, pass: &PassInfo, out: &mut dyn Write) -> Result<()> {
            self.passes.push((pass.pass_type, pass.scan_number));
            if pass.writes_output {
                out.write_all(&[pass.scan_number as u8])?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_single_sequential_scan() {
        let mut master = CompMaster::new(MasterConfig::new(3)).unwrap();
        assert_eq!(master.total_passes(), 1);
        let mut rec = Recorder::default();
        let mut out = Vec::new();
        let summary = master.run(&mut rec, &mut out).unwrap();
        assert_eq!(rec.passes, vec![(PassType::Main, 0)]);
        assert_eq!(summary.passes_run, 1);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_optimized_sequential_passes() {
        let config = MasterConfig::new(1).optimize_coding(true);
        let mut master = CompMaster::new(config).unwrap();
        assert_eq!(master.total_passes(), 2);
        let mut rec = Recorder::default();
        master.run(&mut rec, &mut Vec::new()).unwrap();
        assert_eq!(rec.passes, vec![(PassType::Main, 0), (PassType::Output, 0)]);
    }

    #[test]
    fn test_unoptimized_progressive_passes() {
        let config = MasterConfig::new(3).with_scans(simple_progression(3).unwrap());
        let mut master = CompMaster::new(config).unwrap();
        assert_eq!(master.total_passes(), 10);
        let mut rec = Recorder::default();
        let mut out = Vec::new();
        let summary = master.run(&mut rec, &mut out).unwrap();
        assert_eq!(summary.passes_run, 10);
        assert_eq!(rec.passes[0], (PassType::Main, 0));
        assert!(rec.passes[1..].iter().all(|&(t, _)| t == PassType::Output));
        assert_eq!(out, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_dc_refinement_skips_statistics() {
        let config = MasterConfig::new(3)
            .with_scans(simple_progression(3).unwrap())
            .optimize_coding(true);
        let mut master = CompMaster::new(config).unwrap();
        assert_eq!(master.total_passes(), 20);
        let mut rec = Recorder::default();
        let summary = master.run(&mut rec, &mut Vec::new()).unwrap();
        // Scan 6 is the DC refinement: output only
        assert_eq!(summary.passes_run, 19);
        assert!(!rec.passes.contains(&(PassType::HuffOpt, 6)));
        assert!(rec.passes.contains(&(PassType::Output, 6)));
        assert!(master.is_done());
    }

    #[test]
    fn test_last_pass_flag() {
        let config = MasterConfig::new(1).optimize_coding(true);
        let mut master = CompMaster::new(config).unwrap();
        let mut sink = Vec::new();
        let first = master.prepare_for_pass().unwrap();
        assert!(first.gather_statistics && !first.writes_output && !first.is_last_pass);
        master.finish_pass(&mut sink).unwrap();
        let second = master.prepare_for_pass().unwrap();
        assert!(second.writes_output && second.first_scan && second.is_last_pass);
        master.finish_pass(&mut sink).unwrap();
        assert_eq!(
            master.prepare_for_pass().unwrap_err(),
            Error::BadState("no passes remain")
        );
    }

    #[test]
    fn test_script_errors_are_eager() {
        let bad = vec![ScanInfo::ac_scan(0, 1, 63, 1, 0)];
        let config = MasterConfig::new(1).with_scans(bad);
        assert!(matches!(
            CompMaster::new(config).unwrap_err(),
            Error::BadProgression { scan: 0, .. }
        ));
        assert!(matches!(
            CompMaster::new(MasterConfig::new(0)).unwrap_err(),
            Error::ComponentCount { .. }
        ));
    }

    #[test]
    fn test_scan_search_rejects_unsearchable() {
        let config = MasterConfig::new(2).optimize_scans(true);
        assert!(matches!(
            CompMaster::new(config).unwrap_err(),
            Error::InvalidScanSpec { .. }
        ));

        let mut scans = SearchLayout::new(1, &ScanSearchConfig::default())
            .unwrap()
            .scans();
        scans.swap(1, 2);
        let config = MasterConfig::new(1).with_scans(scans).optimize_scans(true);
        assert_eq!(
            CompMaster::new(config).unwrap_err(),
            Error::BadScanScript { scan: 1 }
        );
    }

    #[test]
    fn test_handler_error_propagates() {
        struct Failing;
        impl PassHandler for Failing {
            fn encode_pass(&mut self, _: &PassInfo, _: &mut dyn Write) -> Result<()> {
                Err(Error::BadState("entropy coder failed"))
            }
        }
        let mut master = CompMaster::new(MasterConfig::new(1)).unwrap();
        assert_eq!(
            master.run(&mut Failing, &mut Vec::new()).unwrap_err(),
            Error::BadState("entropy coder failed")
        );
    }
}
