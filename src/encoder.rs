//! NTSC composite modulator: RGB image -> analog IRE scanline buffer.

use crate::constants::*;
use crate::crt::{Crt, PixelFormat};
use crate::filters::IirLowpass;
use crate::fixed::sincos14;

/// Per-channel bandlimiting filters, created on the first modulate call and
/// reused for the lifetime of the settings value.
#[derive(Clone, Debug)]
struct ModFilters {
    y: IirLowpass,
    i: IirLowpass,
    q: IirLowpass,
}

/// Settings for modulating one field.
#[derive(Clone, Debug)]
pub struct NtscSettings<'a> {
    /// Source image data, tightly packed in `format`.
    pub data: &'a [u8],
    pub format: PixelFormat,
    /// Width and height of the source image.
    pub w: usize,
    pub h: usize,
    /// false = scale the image to fit the monitor, true = don't scale.
    /// Raw mode is needed for images that rely on artifact colors.
    pub raw: bool,
    /// false = monochrome, true = full color.
    pub as_color: bool,
    /// 0 = even field, 1 = odd field.
    pub field: i32,
    /// 0 = even frame, 1 = odd frame.
    pub frame: i32,
    /// Hue offset in degrees, 0-359.
    pub hue: i32,
    /// x offset in sample space; 0 is the minimum value.
    pub xoffset: i32,
    /// y offset in lines; 0 is the minimum value.
    pub yoffset: i32,
    iirs: Option<ModFilters>,
}

impl<'a> NtscSettings<'a> {
    pub fn new(data: &'a [u8], format: PixelFormat, w: usize, h: usize) -> Self {
        Self {
            data,
            format,
            w,
            h,
            raw: false,
            as_color: true,
            field: 0,
            frame: 0,
            hue: 0,
            xoffset: 0,
            yoffset: 0,
            iirs: None,
        }
    }
}

impl Crt {
    /// Modulate an RGB image into the analog NTSC signal for one field.
    ///
    /// Lays out the horizontal blanking of every line (equalizing and
    /// vertical sync pulses on the first lines, then front porch, sync tip,
    /// breezeway, color burst and back porch), then resamples the source
    /// image into the active area with the chroma channels remodulated onto
    /// the subcarrier.
    pub fn modulate(&mut self, s: &mut NtscSettings<'_>) {
        let iirs = s.iirs.get_or_insert_with(|| ModFilters {
            y: IirLowpass::new(L_FREQ, Y_FREQ),
            i: IirLowpass::new(L_FREQ, I_FREQ),
            q: IirLowpass::new(L_FREQ, Q_FREQ),
        });

        let bpp = s.format.bpp();
        let (ro, go, bo) = s.format.offsets();
        if s.w == 0 || s.h == 0 || s.data.len() < s.w * s.h * bpp {
            return;
        }

        let (destw, desth) = if s.raw {
            ((s.w as i32).min(AV_LEN), (s.h as i32).min(LINES))
        } else {
            ((AV_LEN * 55500) >> 16, (LINES * 63500) >> 16)
        };

        let field = s.field & 1;
        let frame = s.frame & 1;

        // Chroma carriers for this frame, sampled on the chroma grid. The
        // burst leads the modulation axes by 33 degrees; Q trails I by 90.
        let mut ccburst = [0i32; CC_SAMPLES as usize];
        let mut ccmod_i = [0i32; CC_SAMPLES as usize];
        let mut ccmod_q = [0i32; CC_SAMPLES as usize];
        if s.as_color {
            for (x, ((cb, ci), cq)) in ccburst
                .iter_mut()
                .zip(ccmod_i.iter_mut())
                .zip(ccmod_q.iter_mut())
                .enumerate()
            {
                let ang = s.hue + x as i32 * (360 / CC_SAMPLES);
                let (sn, _) = sincos14((ang + 33) * 8192 / 180);
                *cb = sn >> 10;
                let (sn, _) = sincos14(ang * 8192 / 180);
                *ci = sn >> 11;
                let (sn, _) = sincos14((ang - 90) * 8192 / 180);
                *cq = sn >> 11;
            }
        }

        // With 227.5 chroma cycles per line every other line has reversed
        // subcarrier phase, selected by the field/frame parity.
        let inv_phase = (CHROMA_PATTERN == 1 && field == frame) as i32;
        let ph = if inv_phase != 0 { -1 } else { 1 };

        let mut xo = AV_BEG + s.xoffset + (AV_LEN - destw) / 2;
        let mut yo = TOP + s.yoffset + (LINES - desth) / 2;
        xo = xo.clamp(AV_BEG, HRES - destw);
        yo = yo.clamp(TOP, VRES - desth);
        // Align so chroma phase is consistent with sample position.
        xo -= xo % CC_SAMPLES;

        let mut iccf = [0i32; CC_SAMPLES as usize];

        for y in 0..VRES {
            let base = (y * HRES) as usize;
            let line = &mut self.analog[base..base + HRES as usize];
            let mut t = 0usize;

            if y <= 3 || (7..=9).contains(&y) {
                // Equalizing pulses: small blips of sync, mostly blank.
                while t < (4 * HRES / 100) as usize {
                    line[t] = SYNC_LEVEL as i8;
                    t += 1;
                }
                while t < (50 * HRES / 100) as usize {
                    line[t] = BLANK_LEVEL as i8;
                    t += 1;
                }
                while t < (54 * HRES / 100) as usize {
                    line[t] = SYNC_LEVEL as i8;
                    t += 1;
                }
                while t < HRES as usize {
                    line[t] = BLANK_LEVEL as i8;
                    t += 1;
                }
            } else if (4..=6).contains(&y) {
                // Vertical sync pulse: small blips of blank, mostly sync.
                let offs: [i32; 4] = if field == 1 {
                    [4, 50, 96, 100]
                } else {
                    [46, 50, 96, 100]
                };
                while t < (offs[0] * HRES / 100) as usize {
                    line[t] = SYNC_LEVEL as i8;
                    t += 1;
                }
                while t < (offs[1] * HRES / 100) as usize {
                    line[t] = BLANK_LEVEL as i8;
                    t += 1;
                }
                while t < (offs[2] * HRES / 100) as usize {
                    line[t] = SYNC_LEVEL as i8;
                    t += 1;
                }
                while t < (offs[3] * HRES / 100) as usize {
                    line[t] = BLANK_LEVEL as i8;
                    t += 1;
                }
            } else {
                // Video line.
                while t < SYNC_BEG as usize {
                    line[t] = BLANK_LEVEL as i8; // FP
                    t += 1;
                }
                while t < BW_BEG as usize {
                    line[t] = SYNC_LEVEL as i8; // SYNC
                    t += 1;
                }
                while t < AV_BEG as usize {
                    line[t] = BLANK_LEVEL as i8; // BW + CB + BP
                    t += 1;
                }
                if y < TOP {
                    while t < HRES as usize {
                        line[t] = BLANK_LEVEL as i8;
                        t += 1;
                    }
                }
                // CB_CYCLES of color burst at the subcarrier frequency.
                for t in CB_BEG..CB_BEG + CB_CYCLES * CC_SAMPLES {
                    let cb = ccburst[((t + inv_phase * (CC_SAMPLES / 2)) % CC_SAMPLES) as usize];
                    line[t as usize] = ((BLANK_LEVEL + cb * BURST_LEVEL) >> 5) as i8;
                    iccf[(t % CC_SAMPLES) as usize] = line[t as usize] as i32;
                }
            }
        }

        for y in 0..desth {
            // The odd field starts half a scanline lower in the source.
            let field_offset = (field * s.h as i32 + desth) / desth / 2;
            let mut sy = (y * s.h as i32) / desth + field_offset;
            sy = sy.clamp(0, s.h as i32 - 1);
            let row = sy as usize * s.w;

            iirs.y.reset();
            iirs.i.reset();
            iirs.q.reset();

            for x in 0..destw {
                let sx = (x as usize * s.w) / destw as usize;
                let pix = &s.data[(row + sx) * bpp..(row + sx) * bpp + bpp];
                let r = pix[ro] as i32;
                let g = pix[go] as i32;
                let b = pix[bo] as i32;

                // RGB to YIQ, 14-bit fixed point.
                let fy = (19595 * r + 38470 * g + 7471 * b) >> 14;
                let fi = (39059 * r - 18022 * g - 21103 * b) >> 14;
                let fq = (13894 * r - 34275 * g + 20382 * b) >> 14;

                // Bandlimit Y, remodulate bandlimited I/Q onto the carrier.
                let cc = ((x + xo) % CC_SAMPLES) as usize;
                let fy = iirs.y.filter(fy);
                let fi = iirs.i.filter(fi) * ph * ccmod_i[cc] >> 4;
                let fq = iirs.q.filter(fq) * ph * ccmod_q[cc] >> 4;

                let mut ire = BLACK_LEVEL + self.black_point;
                ire += (fy + fi + fq) * (WHITE_LEVEL * self.white_point / 100) >> 10;
                ire = ire.clamp(0, 110);

                self.analog[((x + xo) + (y + yo) * HRES) as usize] = ire as i8;
            }
        }

        // Seed the carrier filter from the last burst so the demodulator
        // starts near the right phase.
        for ccrow in self.ccf.iter_mut() {
            for (c, &seed) in ccrow.iter_mut().zip(iccf.iter()) {
                *c = seed << 7;
            }
        }
    }
}
