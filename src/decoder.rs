//! NTSC composite demodulator: analog signal buffer -> RGB raster.
//!
//! The receiver side of the pipeline: add noise to the transported signal,
//! lock onto vertical and horizontal sync by integration, converge the color
//! carrier reference from the burst, split YIQ with the band equalizers, and
//! resample each scanline into the output raster.

use crate::constants::*;
use crate::crt::Crt;
use crate::fixed::sincos14;

#[derive(Clone, Copy, Default)]
struct Yiq {
    y: i32,
    i: i32,
    q: i32,
}

impl Crt {
    /// Demodulate the signal produced by [`Crt::modulate`] into `out`.
    ///
    /// `noise` is the amount of noise added to the signal (0 and up). The
    /// output buffer is caller-owned; nothing is written unless it covers
    /// the full `outw * outh` raster in the configured format.
    pub fn demodulate(&mut self, noise: i32, out: &mut [u8]) {
        let bpp = self.out_format.bpp();
        let (ro, go, bo) = self.out_format.offsets();
        let pitch = self.outw * bpp;
        if self.outw == 0 || self.outh == 0 || out.len() < self.outh * pitch {
            return;
        }
        let outw = self.outw as i32;
        let outh = self.outh as i32;

        let bright = self.brightness - (BLACK_LEVEL + self.black_point);

        let (huesn, huecs) = sincos14(((self.hue % 360) + 33) * 8192 / 180);
        let huesn = huesn >> 11; // make 4-bit
        let huecs = huecs >> 11;

        // Signal + noise, clamped to the receivable range.
        let mut rn = self.rn;
        for (dst, &src) in self.inp.iter_mut().zip(self.analog.iter()) {
            rn = rn.wrapping_mul(214019).wrapping_add(140327895);
            let s = src as i32 + ((((rn >> 16) & 0xff) as i32 - 0x7f) * noise >> 8);
            *dst = s.clamp(-127, 127) as i8;
        }
        self.rn = rn;

        // The vertical sync pulse is much longer than hsync, so its
        // integration threshold is much higher; integrating also keeps the
        // search noise-immune.
        let (vline, vj) = self.search_vsync();
        self.vsync = if DO_VSYNC { vline } else { -3 };
        // A crossing in the second half of the line means the odd field.
        let field = (vj > HRES / 2) as i32;

        let max_e = (128 + noise / 2) * AV_LEN;
        let mut prev_e = 16384 / 8;

        // Ratio of output height to active video lines in the signal.
        let ratio = (((outh << 16) / LINES) + 32768) >> 16;
        let field_offset = field * (ratio / 2);

        let mut row = [Yiq::default(); (AV_LEN + 1) as usize];

        for line in TOP..BOT {
            let beg = (line - TOP) * outh / LINES + field_offset;
            let end = ((line - TOP + 1) * outh / LINES + field_offset).min(outh);
            if beg >= outh {
                continue;
            }

            // Horizontal sync search, integrating around the sync tip.
            let ln = posmod(line + self.vsync, VRES) * HRES;
            let mut hs = 0;
            let mut i = -HSYNC_WINDOW;
            while i < HSYNC_WINDOW {
                hs += self.inp_at(ln + self.hsync + SYNC_BEG + i);
                if hs <= HSYNC_THRESH * SYNC_LEVEL {
                    break;
                }
                i += 1;
            }
            if DO_HSYNC {
                self.hsync = posmod(i + self.hsync, HRES);
            } else {
                self.hsync = 0;
            }

            let xpos = posmod(AV_BEG + self.hsync - 3, HRES);
            let ypos = posmod(line + self.vsync + 3, VRES);
            let pos = xpos + ypos * HRES;

            // Converge the color carrier reference for this row bucket:
            // mostly the previous reference, mixed with the new burst.
            let cc_base = ln + (self.hsync - self.hsync % CC_SAMPLES);
            let bucket = (ypos % CC_VPER) as usize;
            let mut ccr = self.ccf[bucket];
            for t in CB_BEG..CB_BEG + CB_CYCLES * CC_SAMPLES {
                let k = (t % CC_SAMPLES) as usize;
                ccr[k] = ccr[k] * 127 / 128 + self.inp_at(cc_base + t);
            }
            self.ccf[bucket] = ccr;

            // DC-I and DC-Q from the burst quadrature taps, rotated by the
            // user hue. The burst leads by 33 degrees.
            let align = posmod(self.hsync, CC_SAMPLES);
            let dci = ccr[((align + 1) % CC_SAMPLES) as usize]
                - ccr[((align + 3) % CC_SAMPLES) as usize];
            let dcq = ccr[((align + 2) % CC_SAMPLES) as usize]
                - ccr[(align % CC_SAMPLES) as usize];

            let mut wave = [0i32; CC_SAMPLES as usize];
            wave[0] = ((dci * huecs - dcq * huesn) >> 4) * self.saturation;
            wave[1] = ((dcq * huecs + dci * huesn) >> 4) * self.saturation;
            wave[2] = -wave[0];
            wave[3] = -wave[1];

            let (dx, scan_l, scan_r, l0, r0);
            if DO_BLOOM {
                let mut e = 0;
                for k in 0..AV_LEN {
                    e += self.inp_at(pos + k);
                }
                // High beam energy widens bright lines; the filtered error
                // shrinks the effective scan width as energy rises.
                prev_e = prev_e * 123 / 128 + ((((max_e >> 1) - e) << 10) / max_e);
                let line_w = AV_LEN * 112 / 128 + (prev_e >> 9);
                dx = ((line_w << 12) / outw).max(1);
                scan_l = ((AV_LEN / 2) - (line_w >> 1) + 8) << 12;
                scan_r = (AV_LEN - 1) << 12;
                l0 = scan_l >> 12;
                // Fill through the end of the row: the interpolation below
                // reads one sample past the scan position.
                r0 = AV_LEN;
            } else {
                dx = (((AV_LEN - 1) << 12) / outw).max(1);
                scan_l = 0;
                scan_r = (AV_LEN - 1) << 12;
                l0 = 0;
                r0 = AV_LEN;
            }

            self.eq_y.reset();
            self.eq_i.reset();
            self.eq_q.reset();

            for k in l0..r0 {
                let sv = self.inp_at(pos + k);
                let e = &mut row[k as usize];
                e.y = self.eq_y.filter(sv + bright) << 4;
                e.i = self.eq_i.filter(sv * wave[(k % CC_SAMPLES) as usize] >> 9) >> 3;
                e.q = self.eq_q.filter(sv * wave[((k + 3) % CC_SAMPLES) as usize] >> 9) >> 3;
            }

            let row_beg = beg as usize * pitch;
            let row_end = row_beg + pitch;
            let mut col = row_beg;

            let mut p = scan_l;
            while p < scan_r && col + bpp <= row_end {
                let rfrac = p & 0xfff;
                let lfrac = 0xfff - rfrac;
                let s0 = row[(p >> 12) as usize];
                let s1 = row[(p >> 12) as usize + 1];

                // Interpolate between samples if needed.
                let y = ((s0.y * lfrac) >> 2) + ((s1.y * rfrac) >> 2);
                let iv = ((s0.i * lfrac) >> 14) + ((s1.i * rfrac) >> 14);
                let qv = ((s0.q * lfrac) >> 14) + ((s1.q * rfrac) >> 14);

                // YIQ to RGB.
                let r = (((y + 3879 * iv + 2556 * qv) >> 12) * self.contrast) >> 8;
                let g = (((y - 1126 * iv - 2605 * qv) >> 12) * self.contrast) >> 8;
                let b = (((y - 4530 * iv + 7021 * qv) >> 12) * self.contrast) >> 8;

                let mut packed =
                    (r.clamp(0, 255) << 16) | (g.clamp(0, 255) << 8) | b.clamp(0, 255);

                let px = &mut out[col..col + bpp];
                if self.blend {
                    let old = (px[ro] as i32) << 16 | (px[go] as i32) << 8 | px[bo] as i32;
                    // Per-channel half sum without letting low bits bleed
                    // across channels.
                    packed = (((packed as u32 & 0x00fe_feff) >> 1)
                        + ((old as u32 & 0x00fe_feff) >> 1)) as i32;
                }
                px[ro] = (packed >> 16) as u8;
                px[go] = (packed >> 8) as u8;
                px[bo] = packed as u8;

                col += bpp;
                p += dx;
            }

            // Duplicate the line into the remaining output rows of its band;
            // with scanlines on, the last row of the band is left dark.
            let gap = self.scanlines as i32;
            for dup in beg + 1..end - gap {
                let src = (dup - 1) as usize * pitch;
                let dst = dup as usize * pitch;
                out.copy_within(src..src + pitch, dst);
            }
        }
    }

    /// Integrate each candidate line until the running sum falls below the
    /// vsync threshold. Returns the winning line and the sample at which the
    /// threshold was crossed (line end if it never was).
    fn search_vsync(&self) -> (i32, i32) {
        let mut line = 0;
        let mut j = 0;
        for i in -VSYNC_WINDOW..VSYNC_WINDOW {
            line = posmod(self.vsync + i, VRES);
            let base = line * HRES;
            let mut s = 0;
            j = 0;
            while j < HRES {
                s += self.inp[(base + j) as usize] as i32;
                if s <= VSYNC_THRESH * SYNC_LEVEL {
                    return (line, j);
                }
                j += 1;
            }
        }
        (line, j)
    }

    /// Read a noisy input sample with the index wrapped into the buffer, so
    /// a sync offset drifting near the buffer edge stays in bounds.
    #[inline]
    fn inp_at(&self, idx: i32) -> i32 {
        self.inp[posmod(idx, INPUT_SIZE as i32) as usize] as i32
    }
}
