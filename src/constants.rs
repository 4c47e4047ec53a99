//! NTSC-M composite signal layout constants derived from the scanline timing.
//!
//! Every sample position is computed from the nanosecond timeline rather than
//! hard-coded, so the sampled grid stays exact when the chroma pattern or the
//! samples-per-chroma-period configuration changes.

// --- System Configuration ---

/// 0 = vertical chroma (228 chroma clocks per line),
/// 1 = checkered chroma (227.5 clocks per line).
pub const CHROMA_PATTERN: u32 = 1;

/// Chroma clocks (subcarrier cycles) per line, times ten.
pub const CC_LINE: i32 = if CHROMA_PATTERN == 1 { 2275 } else { 2280 };

/// Samples per chroma period (one full 360 degrees of subcarrier).
///
/// 4 or 5; the demodulator's quadrature tap spacing assumes 4.
pub const CC_SAMPLES: i32 = 4;

/// Vertical period, in lines, in which the chroma artifacts repeat.
pub const CC_VPER: i32 = 1;

/// Carrier frequency relative to the sample rate.
pub const CB_FREQ: i32 = CC_SAMPLES;

/// Emulate bloom (bright lines widen; side effect: black borders).
pub const DO_BLOOM: bool = false;
/// Search for vertical sync instead of assuming a fixed field position.
pub const DO_VSYNC: bool = true;
/// Search for horizontal sync instead of assuming a fixed line position.
pub const DO_HSYNC: bool = true;

// --- Sampled Geometry ---

/// Horizontal resolution of the sampled line.
pub const HRES: i32 = CC_LINE * CB_FREQ / 10;
/// Vertical resolution (total lines per field).
pub const VRES: i32 = 262;
/// Size of the analog sample buffers.
pub const INPUT_SIZE: usize = (HRES * VRES) as usize;

/// First line with active video.
pub const TOP: i32 = 21;
/// Final line with active video.
pub const BOT: i32 = 261;
/// Number of active video lines.
pub const LINES: i32 = BOT - TOP;

// --- Sync Search ---

/// Horizontal sync search window, in samples around the current position.
pub const HSYNC_WINDOW: i32 = 8;
/// Vertical sync search window, in lines around the current position.
pub const VSYNC_WINDOW: i32 = 8;

/// Accumulated-signal threshold multipliers for sync detection. Larger means
/// more stable, until the threshold is never reached and sync is lost.
pub const HSYNC_THRESH: i32 = 4;
pub const VSYNC_THRESH: i32 = 94;

// --- Horizontal Timeline (nanoseconds) ---
//
//                  FULL HORIZONTAL LINE SIGNAL (~63500 ns)
// |--------------------------------------------------------------------|
//   HBLANK (~10900 ns)            ACTIVE VIDEO (~52600 ns)
// |--------------------||----------------------------------------------|
//
//   WITHIN HBLANK:
//   FP (~1500)  SYNC (~4700)  BW (~600)  CB (~2500)  BP (~1600)
// |-----------||------------||---------||----------||-----------|
//     BLANK        SYNC         BLANK      BURST       BLANK

pub const FP_NS: i32 = 1500; // front porch
pub const SYNC_NS: i32 = 4700; // sync tip
pub const BW_NS: i32 = 600; // breezeway
pub const CB_NS: i32 = 2500; // color burst
pub const BP_NS: i32 = 1600; // back porch
pub const AV_NS: i32 = 52600; // active video

/// Horizontal blanking period.
pub const HB_NS: i32 = FP_NS + SYNC_NS + BW_NS + CB_NS + BP_NS;
/// Full line duration, ~63500 ns.
pub const LINE_NS: i32 = HB_NS + AV_NS;

/// Convert a nanosecond offset to its point on the sampled line.
pub const fn ns2pos(ns: i32) -> i32 {
    ns * HRES / LINE_NS
}

// Starting points for the different pulses.
pub const FP_BEG: i32 = ns2pos(0);
pub const SYNC_BEG: i32 = ns2pos(FP_NS);
pub const BW_BEG: i32 = ns2pos(FP_NS + SYNC_NS);
pub const CB_BEG: i32 = ns2pos(FP_NS + SYNC_NS + BW_NS);
pub const BP_BEG: i32 = ns2pos(FP_NS + SYNC_NS + BW_NS + CB_NS);
pub const AV_BEG: i32 = ns2pos(HB_NS);
pub const AV_LEN: i32 = ns2pos(AV_NS);

/// Color burst length, in subcarrier cycles (somewhere between 7 and 12).
pub const CB_CYCLES: i32 = 10;

// --- Band Frequencies (Hz) ---

pub const L_FREQ: i32 = 1_431_818; // full line
pub const Y_FREQ: i32 = 420_000; // luma   (Y) 4.2  MHz of the 14.31818 MHz
pub const I_FREQ: i32 = 150_000; // chroma (I) 1.5  MHz of the 14.31818 MHz
pub const Q_FREQ: i32 = 55_000; // chroma (Q) 0.55 MHz of the 14.31818 MHz

// --- IRE Levels (100 = 1.0V) ---

pub const WHITE_LEVEL: i32 = 100;
pub const BURST_LEVEL: i32 = 20;
pub const BLACK_LEVEL: i32 = 7;
pub const BLANK_LEVEL: i32 = 0;
pub const SYNC_LEVEL: i32 = -40;

/// Positive modulo: result is always in `[0, n)` for `n > 0`.
pub const fn posmod(x: i32, n: i32) -> i32 {
    ((x % n) + n) % n
}
